// src/lib.rs
//
// Per-tick state extraction for one vehicle in a stepped traffic simulation:
// passing windows at the next signal, speed-limit lookahead along the route,
// and an archive of the signals already passed.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod route;
pub mod signal;
pub mod types;

pub use config::Config;
pub use engine::{NetworkMetadata, SimulationEngine};
pub use error::{EngineError, EpisodeAborted, RouteError, SignalError};
pub use pipeline::{EpisodeEvent, EpisodePhase, StepController};
pub use types::{Color, HistoryEntry, PassingWindow, Snapshot, SpeedState, TlsInfo};
