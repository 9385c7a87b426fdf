// src/signal/mod.rs
//
// Signal-side state extraction:
//   raw program + link index → program::SignalProgram
//   observation + program    → passing_window (window, cycle offset)
//   per-tick tracked signal  → history::SignalHistoryRecorder

pub mod history;
pub mod passing_window;
pub mod program;

pub use history::{SignalHistoryRecorder, TrackedSignal};
pub use passing_window::{cycle_offset, PassingWindowPredictor};
pub use program::{Phase, RawPhase, SignalProgram};
