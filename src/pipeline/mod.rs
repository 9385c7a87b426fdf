// src/pipeline/mod.rs

pub mod event_bus;
pub mod metrics;
pub mod step_controller;

pub use event_bus::{EpisodeEvent, EventBus};
pub use metrics::{EpisodeMetrics, MetricsSummary};
pub use step_controller::{EpisodePhase, StepController};
