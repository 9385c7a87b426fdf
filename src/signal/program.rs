// src/signal/program.rs

use crate::error::SignalError;
use crate::types::{Color, TlsInfo};
use serde::{Deserialize, Serialize};

/// One phase as the engine reports it: a state character per controlled link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPhase {
    pub state: String,
    pub duration_s: f64,
}

impl RawPhase {
    pub fn new(state: &str, duration_s: f64) -> Self {
        Self {
            state: state.to_string(),
            duration_s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub approach_color: Color,
    pub duration_s: f64,
}

/// Cyclic phase sequence for a single approach. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalProgram {
    phases: Vec<Phase>,
}

impl SignalProgram {
    /// Project every phase's state string onto the character at `link_index`.
    pub fn from_raw(raw: &[RawPhase], link_index: usize) -> Result<Self, SignalError> {
        if raw.is_empty() {
            return Err(SignalError::EmptyProgram);
        }

        let phases = raw
            .iter()
            .enumerate()
            .map(|(phase_index, phase)| {
                let state_char = phase.state.chars().nth(link_index).ok_or(
                    SignalError::InvalidLinkIndex {
                        link_index,
                        phase_index,
                        state_len: phase.state.chars().count(),
                    },
                )?;
                let approach_color = Color::from_state_char(state_char).ok_or(
                    SignalError::UnknownStateChar {
                        phase_index,
                        state_char,
                    },
                )?;
                Ok(Phase {
                    approach_color,
                    duration_s: phase.duration_s,
                })
            })
            .collect::<Result<Vec<_>, SignalError>>()?;

        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Index after `index`, wrapping past the last phase.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.phases.len()
    }

    pub fn color_at(&self, index: usize) -> Color {
        self.phases[index % self.phases.len()].approach_color
    }

    pub fn duration_at(&self, index: usize) -> f64 {
        self.phases[index % self.phases.len()].duration_s
    }

    pub fn cycle_duration(&self) -> f64 {
        self.phases.iter().map(|p| p.duration_s).sum()
    }

    pub fn contains_color(&self, color: Color) -> bool {
        self.phases.iter().any(|p| p.approach_color == color)
    }

    pub fn check_phase_index(&self, index: usize) -> Result<(), SignalError> {
        if index < self.phases.len() {
            Ok(())
        } else {
            Err(SignalError::PhaseIndexOutOfRange {
                index,
                phase_count: self.phases.len(),
            })
        }
    }

    pub fn to_info(&self, distance_m: f64, cycle_offset_s: f64) -> TlsInfo {
        TlsInfo {
            phase_colors: self.phases.iter().map(|p| p.approach_color).collect(),
            phase_durations: self.phases.iter().map(|p| p.duration_s).collect(),
            distance_m,
            cycle_offset_s,
        }
    }
}
