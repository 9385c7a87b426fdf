// src/types.rs

use serde::{Deserialize, Serialize};

/// Colour of one approach at a signal, as seen by the tracked vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Red,
    Yellow,
    Green,
}

impl Color {
    /// Map one character of a multi-approach signal state string.
    ///
    /// Minor green (`g`), priority green (`G`), turn-on-red (`s`) and a
    /// switched-off signal (`o`/`O`) all let the vehicle through, so they
    /// collapse to Green. Red-yellow (`u`) still holds traffic, so it is Red.
    pub fn from_state_char(c: char) -> Option<Self> {
        match c {
            'r' | 'R' | 'u' => Some(Self::Red),
            'y' | 'Y' => Some(Self::Yellow),
            'g' | 'G' | 's' | 'o' | 'O' => Some(Self::Green),
            _ => None,
        }
    }
}

/// Raw reading of the next signal ahead, taken once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalObservation {
    pub id: String,
    pub distance_m: f64,
    pub color: Color,
    pub link_index: usize,
    pub current_phase_index: usize,
    /// Seconds left in the current phase, never negative.
    pub time_to_next_switch_s: f64,
}

/// Interval, relative to the current tick, during which the approach is green.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassingWindow {
    pub start_offset_s: f64,
    pub end_offset_s: f64,
}

impl PassingWindow {
    pub fn new(start_offset_s: f64, end_offset_s: f64) -> Self {
        Self {
            start_offset_s,
            end_offset_s,
        }
    }

    /// Window handed out when no bound can be computed.
    pub fn sentinel(horizon_s: f64) -> Self {
        Self::new(0.0, horizon_s)
    }
}

/// One signal cycle as experienced by the vehicle, projected to its approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsInfo {
    pub phase_colors: Vec<Color>,
    pub phase_durations: Vec<f64>,
    pub distance_m: f64,
    pub cycle_offset_s: f64,
}

impl TlsInfo {
    /// Stand-in used when there is no signal ahead: a single green phase
    /// lasting the sentinel horizon.
    pub fn synthetic(horizon_s: f64, distance_m: f64) -> Self {
        Self {
            phase_colors: vec![Color::Green],
            phase_durations: vec![horizon_s],
            distance_m,
            cycle_offset_s: 0.0,
        }
    }

    pub fn cycle_duration(&self) -> f64 {
        self.phase_durations.iter().sum()
    }
}

/// A signal the vehicle has driven past, archived once and never touched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub signal_id: Option<String>,
    pub archived_at_tick: u64,
    pub info: TlsInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedState {
    pub velocity_m_s: f64,
    pub current_speed_limit: f64,
    pub next_speed_limit: f64,
    pub next_speed_limit_distance_m: f64,
}

/// Everything the consumer gets for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub elapsed_s: f64,
    pub distance_covered_m: f64,
    pub next_signal_distance_m: f64,
    pub next_signal_color: Color,
    pub passing_window: PassingWindow,
    pub next_signal: TlsInfo,
    pub longitude: f64,
    pub latitude: f64,
    pub signal_history: Vec<HistoryEntry>,
    pub done: bool,
}
