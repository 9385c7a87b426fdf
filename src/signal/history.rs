// src/signal/history.rs
//
// Archive of signals the vehicle has driven past.
//
// A crossing is detected on the tick where the distance to the "next"
// signal jumps up: the signal that was close last tick fell behind and a
// farther one took its place. Only real programs are archived, never the
// synthetic stand-in used when no signal is ahead.

use crate::error::SignalError;
use crate::types::{HistoryEntry, TlsInfo};
use tracing::{info, warn};

/// What was seen ahead on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSignal {
    pub signal_id: Option<String>,
    pub distance_m: f64,
    pub info: TlsInfo,
    /// False for the synthetic "no signal ahead" observation.
    pub has_program: bool,
}

impl TrackedSignal {
    pub fn real(signal_id: &str, distance_m: f64, info: TlsInfo) -> Self {
        Self {
            signal_id: Some(signal_id.to_string()),
            distance_m,
            info,
            has_program: true,
        }
    }

    pub fn synthetic(distance_m: f64, info: TlsInfo) -> Self {
        Self {
            signal_id: None,
            distance_m,
            info,
            has_program: false,
        }
    }
}

pub struct SignalHistoryRecorder {
    entries: Vec<HistoryEntry>,
    previous: Option<TrackedSignal>,
    proximity_threshold_m: f64,
}

impl SignalHistoryRecorder {
    pub fn new(proximity_threshold_m: f64) -> Self {
        Self {
            entries: Vec::new(),
            previous: None,
            proximity_threshold_m,
        }
    }

    /// Feed this tick's observation. Returns the entry archived on this
    /// tick, if any.
    ///
    /// # Arguments
    /// * `tick` - tick counter since reset, used to backdate the cycle offset
    /// * `distance_travelled_m` - position along the route, stored as the
    ///   archived entry's distance
    /// * `current` - the signal seen ahead on this tick
    ///
    /// The current observation always replaces the tracked one, even when
    /// archiving fails with `DegenerateCycle`.
    pub fn observe(
        &mut self,
        tick: u64,
        distance_travelled_m: f64,
        current: TrackedSignal,
    ) -> Result<Option<&HistoryEntry>, SignalError> {
        let current_distance = current.distance_m;
        let Some(previous) = self.previous.replace(current) else {
            return Ok(None);
        };

        let passed = current_distance > previous.distance_m
            && tick != 0
            && previous.distance_m < self.proximity_threshold_m
            && previous.has_program;
        if !passed {
            return Ok(None);
        }

        let total = previous.info.cycle_duration();
        if total <= 0.0 {
            warn!(
                "Signal {:?} passed with a zero-length cycle, not archived",
                previous.signal_id
            );
            return Err(SignalError::DegenerateCycle {
                signal_id: previous.signal_id,
            });
        }

        let entry = HistoryEntry {
            signal_id: previous.signal_id,
            archived_at_tick: tick,
            info: TlsInfo {
                cycle_offset_s: (previous.info.cycle_offset_s - tick as f64).rem_euclid(total),
                distance_m: distance_travelled_m,
                ..previous.info
            },
        };

        info!(
            "🚦 Passed signal {:?} at {:.1}m (tick {}, cycle offset {:.1}s)",
            entry.signal_id, entry.info.distance_m, tick, entry.info.cycle_offset_s
        );

        self.entries.push(entry);
        Ok(self.entries.last())
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand the archive to the caller, leaving the recorder empty.
    pub fn export(&mut self) -> Vec<HistoryEntry> {
        self.previous = None;
        std::mem::take(&mut self.entries)
    }
}
