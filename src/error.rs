// src/error.rs
//
// Signal and route faults are local to one tick and never end the episode.
// Anything that stops the episode is an EpisodeAborted.

use thiserror::Error;

/// Malformed upstream signal data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("signal program has no phases")]
    EmptyProgram,

    #[error("link index {link_index} out of range for phase {phase_index} (state has {state_len} links)")]
    InvalidLinkIndex {
        link_index: usize,
        phase_index: usize,
        state_len: usize,
    },

    #[error("phase {phase_index} has unrecognised state character {state_char:?}")]
    UnknownStateChar { phase_index: usize, state_char: char },

    #[error("phase index {index} out of range for a {phase_count}-phase program")]
    PhaseIndexOutOfRange { index: usize, phase_count: usize },

    #[error("no green phase reached after {steps} steps")]
    NoGreenPhase { steps: usize },

    #[error("signal {signal_id:?} cycle has zero total duration")]
    DegenerateCycle { signal_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("route has no edges")]
    EmptyRoute,

    #[error("route metadata misaligned: {edges} edges, {lengths} lengths, {limits} speed limits")]
    MisalignedRoute {
        edges: usize,
        lengths: usize,
        limits: usize,
    },
}

/// Failures reported by the simulation engine or network metadata.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("simulation engine disconnected: {0}")]
    Disconnected(String),

    #[error("unknown vehicle {0}")]
    UnknownVehicle(String),

    #[error("unknown edge {0}")]
    UnknownEdge(String),

    #[error("unknown signal {0}")]
    UnknownSignal(String),
}

/// Terminal for the episode. Never retried here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EpisodeAborted {
    #[error("episode aborted: {0}")]
    Engine(#[from] EngineError),

    #[error("episode aborted: {0}")]
    Route(#[from] RouteError),

    #[error("episode aborted: vehicle {vehicle_id} did not spawn within {ticks} ticks")]
    SpawnTimeout { vehicle_id: String, ticks: u64 },
}
