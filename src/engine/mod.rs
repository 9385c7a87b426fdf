// src/engine/mod.rs
//
// Contract surface of the external simulator and map. Everything that is
// not deterministic lives behind these two traits; the step controller is
// the only caller.

pub mod replay;

use crate::error::EngineError;
use crate::signal::RawPhase;
use std::collections::HashSet;

pub use replay::{EdgeTable, ReplayEngine, Scenario};

/// The next signal on the vehicle's route, as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NextSignal {
    pub signal_id: String,
    pub link_index: usize,
    pub distance_m: f64,
    pub state: char,
}

pub trait SimulationEngine {
    /// Blocking; bounded only by the engine's own step cost.
    fn advance_one_tick(&mut self) -> Result<(), EngineError>;

    fn active_vehicle_ids(&self) -> Result<HashSet<String>, EngineError>;

    fn vehicle_speed(&self, vehicle_id: &str) -> Result<f64, EngineError>;

    fn vehicle_position(&self, vehicle_id: &str) -> Result<(f64, f64), EngineError>;

    /// Distance driven since departure, as the engine measures it.
    fn vehicle_odometer(&self, vehicle_id: &str) -> Result<f64, EngineError>;

    /// Network coordinates to `(longitude, latitude)`.
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), EngineError>;

    fn vehicle_route(&self, vehicle_id: &str) -> Result<Vec<String>, EngineError>;

    fn vehicle_current_edge(&self, vehicle_id: &str) -> Result<String, EngineError>;

    /// Driving distance from the vehicle to `target_offset` metres into
    /// `target_edge`. Engines may answer with a negative marker when the
    /// target is unreachable.
    fn routing_distance(
        &self,
        vehicle_id: &str,
        target_edge: &str,
        target_offset: f64,
    ) -> Result<f64, EngineError>;

    fn next_signal_for(&self, vehicle_id: &str) -> Result<Option<NextSignal>, EngineError>;

    fn signal_program(&self, signal_id: &str) -> Result<Vec<RawPhase>, EngineError>;

    fn signal_current_phase(&self, signal_id: &str) -> Result<usize, EngineError>;

    fn signal_time_to_next_switch(&self, signal_id: &str) -> Result<f64, EngineError>;
}

pub trait NetworkMetadata {
    fn edge_length(&self, edge_id: &str) -> Result<f64, EngineError>;

    fn edge_speed_limit(&self, edge_id: &str) -> Result<f64, EngineError>;
}
