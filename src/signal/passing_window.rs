// src/signal/passing_window.rs
//
// Time window, relative to now, in which the vehicle's approach is green.
//
//   Red    → wait out the current phase, then every non-green phase;
//            the window spans the following run of green phases.
//   Yellow → passable until the switch, unless the approach never turns red.
//   Green  → passable until the next red (yellow still counts as passable).
//
// Every forward walk wraps around the cycle and is capped at two cycles.

use super::program::SignalProgram;
use crate::config::SignalConfig;
use crate::error::SignalError;
use crate::types::{Color, PassingWindow, SignalObservation};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassingWindowPredictor {
    /// Added to the time left in the current phase so the window never
    /// starts or ends exactly on a switch instant.
    switch_bias_s: f64,
    /// Returned as the window end when the approach has no red phase.
    sentinel_horizon_s: f64,
}

impl Default for PassingWindowPredictor {
    fn default() -> Self {
        Self::new(&SignalConfig::default())
    }
}

impl PassingWindowPredictor {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            switch_bias_s: config.switch_bias_s,
            sentinel_horizon_s: config.sentinel_horizon_s,
        }
    }

    pub fn sentinel_window(&self) -> PassingWindow {
        PassingWindow::sentinel(self.sentinel_horizon_s)
    }

    pub fn predict(
        &self,
        observation: &SignalObservation,
        program: &SignalProgram,
    ) -> Result<PassingWindow, SignalError> {
        program.check_phase_index(observation.current_phase_index)?;

        let remaining = observation.time_to_next_switch_s + self.switch_bias_s;
        let window = match observation.color {
            Color::Red => self.next_green(observation.current_phase_index, remaining, program)?,
            Color::Yellow => {
                if program.contains_color(Color::Red) {
                    PassingWindow::new(0.0, remaining)
                } else {
                    self.sentinel_window()
                }
            }
            Color::Green => {
                if !program.contains_color(Color::Red) {
                    self.sentinel_window()
                } else {
                    let cap = walk_cap(program);
                    match accumulate_while(
                        program,
                        program.next_index(observation.current_phase_index),
                        cap,
                        |c| c != Color::Red,
                    ) {
                        Some(walk) => PassingWindow::new(0.0, remaining + walk.elapsed_s),
                        // A red phase exists, so the walk always ends inside one cycle.
                        None => self.sentinel_window(),
                    }
                }
            }
        };

        debug!(
            "Signal {} ({:?}, phase {}): window [{:.1}s, {:.1}s]",
            observation.id,
            observation.color,
            observation.current_phase_index,
            window.start_offset_s,
            window.end_offset_s
        );

        Ok(window)
    }

    fn next_green(
        &self,
        current_phase_index: usize,
        remaining: f64,
        program: &SignalProgram,
    ) -> Result<PassingWindow, SignalError> {
        let cap = walk_cap(program);

        let waiting = accumulate_while(
            program,
            program.next_index(current_phase_index),
            cap,
            |c| c != Color::Green,
        )
        .ok_or(SignalError::NoGreenPhase { steps: cap })?;

        let start = remaining + waiting.elapsed_s;
        let end = match accumulate_while(program, waiting.stopped_at, cap, |c| c == Color::Green) {
            Some(green) => start + green.elapsed_s,
            // Green never ends within the cap: the approach is effectively
            // always passable once it turns green.
            None => start + self.sentinel_horizon_s,
        };

        Ok(PassingWindow::new(start, end))
    }
}

/// Elapsed time since the cycle started, measured at this observation.
pub fn cycle_offset(
    observation: &SignalObservation,
    program: &SignalProgram,
) -> Result<f64, SignalError> {
    let current = observation.current_phase_index;
    program.check_phase_index(current)?;

    let before: f64 = program.phases()[..current]
        .iter()
        .map(|p| p.duration_s)
        .sum();
    let offset = before + program.duration_at(current) - observation.time_to_next_switch_s;

    let total = program.cycle_duration();
    if total > 0.0 {
        Ok(offset.rem_euclid(total))
    } else {
        Ok(offset)
    }
}

fn walk_cap(program: &SignalProgram) -> usize {
    2 * program.phase_count()
}

struct Walk {
    elapsed_s: f64,
    stopped_at: usize,
}

/// Sum phase durations from `from` onward while `keep_going` holds for the
/// phase colour. `None` when the cap is reached first.
fn accumulate_while(
    program: &SignalProgram,
    from: usize,
    cap: usize,
    keep_going: impl Fn(Color) -> bool,
) -> Option<Walk> {
    let mut index = from;
    let mut elapsed_s = 0.0;

    for _ in 0..cap {
        if !keep_going(program.color_at(index)) {
            return Some(Walk {
                elapsed_s,
                stopped_at: index,
            });
        }
        elapsed_s += program.duration_at(index);
        index = program.next_index(index);
    }

    None
}
