// src/engine/replay.rs
//
// Deterministic engine that replays a recorded trace, one frame per tick.
// Used by the CLI driver and by the end-to-end tests.

use super::{NetworkMetadata, NextSignal, SimulationEngine};
use crate::error::EngineError;
use crate::signal::RawPhase;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// What an engine answers for a routing query it cannot resolve.
pub const INVALID_DISTANCE: f64 = -1_073_741_824.0;

const METERS_PER_DEGREE_LAT: f64 = 110_574.0;
const METERS_PER_DEGREE_LON_AT_EQUATOR: f64 = 111_320.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub vehicle_id: String,
    #[serde(default)]
    pub geo_origin: GeoOrigin,
    pub edges: Vec<EdgeMeta>,
    #[serde(default)]
    pub signals: Vec<SignalDef>,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoOrigin {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMeta {
    pub id: String,
    pub length_m: f64,
    pub speed_limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDef {
    pub id: String,
    pub phases: Vec<RawPhase>,
}

/// World state after one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// `None` while the tracked vehicle is not in the simulation.
    #[serde(default)]
    pub vehicle: Option<VehicleFrame>,
    #[serde(default)]
    pub signals: HashMap<String, SignalFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleFrame {
    pub speed: f64,
    pub x: f64,
    pub y: f64,
    pub odometer: f64,
    pub edge: String,
    pub lane_position: f64,
    pub route: Vec<String>,
    #[serde(default)]
    pub next_signal: Option<NextSignalFrame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextSignalFrame {
    pub id: String,
    pub link_index: usize,
    pub distance_m: f64,
    pub state: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalFrame {
    pub phase: usize,
    pub time_to_next_switch_s: f64,
}

impl Scenario {
    pub fn new(vehicle_id: &str) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            geo_origin: GeoOrigin::default(),
            edges: Vec::new(),
            signals: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// YAML unless the file ends in `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let scenario: Scenario = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)?
        } else {
            serde_yaml::from_str(&contents)?
        };
        Ok(scenario)
    }

    pub fn with_edge(mut self, id: &str, length_m: f64, speed_limit: f64) -> Self {
        self.edges.push(EdgeMeta {
            id: id.to_string(),
            length_m,
            speed_limit,
        });
        self
    }

    pub fn with_signal(mut self, id: &str, phases: Vec<RawPhase>) -> Self {
        self.signals.push(SignalDef {
            id: id.to_string(),
            phases,
        });
        self
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn edge_table(&self) -> EdgeTable {
        EdgeTable {
            edges: self
                .edges
                .iter()
                .map(|e| (e.id.clone(), e.clone()))
                .collect(),
        }
    }
}

/// Per-edge map metadata.
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    edges: HashMap<String, EdgeMeta>,
}

impl EdgeTable {
    fn get(&self, edge_id: &str) -> Result<&EdgeMeta, EngineError> {
        self.edges
            .get(edge_id)
            .ok_or_else(|| EngineError::UnknownEdge(edge_id.to_string()))
    }
}

impl NetworkMetadata for EdgeTable {
    fn edge_length(&self, edge_id: &str) -> Result<f64, EngineError> {
        Ok(self.get(edge_id)?.length_m)
    }

    fn edge_speed_limit(&self, edge_id: &str) -> Result<f64, EngineError> {
        Ok(self.get(edge_id)?.speed_limit)
    }
}

pub struct ReplayEngine {
    vehicle_id: String,
    geo_origin: GeoOrigin,
    frames: Vec<Frame>,
    programs: HashMap<String, Vec<RawPhase>>,
    edges: EdgeTable,
    /// Number of ticks advanced; frame `cursor - 1` is live.
    cursor: usize,
}

impl ReplayEngine {
    pub fn new(scenario: Scenario) -> Self {
        let edges = scenario.edge_table();
        let programs = scenario
            .signals
            .into_iter()
            .map(|s| (s.id, s.phases))
            .collect();
        Self {
            vehicle_id: scenario.vehicle_id,
            geo_origin: scenario.geo_origin,
            frames: scenario.frames,
            programs,
            edges,
            cursor: 0,
        }
    }

    pub fn ticks_advanced(&self) -> usize {
        self.cursor
    }

    fn frame(&self) -> Result<&Frame, EngineError> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.frames.get(i))
            .ok_or_else(|| EngineError::Disconnected("no tick has been advanced".to_string()))
    }

    fn vehicle(&self, vehicle_id: &str) -> Result<&VehicleFrame, EngineError> {
        let frame = self.frame()?;
        match &frame.vehicle {
            Some(v) if vehicle_id == self.vehicle_id => Ok(v),
            _ => Err(EngineError::UnknownVehicle(vehicle_id.to_string())),
        }
    }

    fn signal_frame(&self, signal_id: &str) -> Result<SignalFrame, EngineError> {
        self.frame()?
            .signals
            .get(signal_id)
            .copied()
            .ok_or_else(|| EngineError::UnknownSignal(signal_id.to_string()))
    }
}

impl SimulationEngine for ReplayEngine {
    fn advance_one_tick(&mut self) -> Result<(), EngineError> {
        if self.cursor >= self.frames.len() {
            return Err(EngineError::Disconnected(format!(
                "trace exhausted after {} ticks",
                self.frames.len()
            )));
        }
        self.cursor += 1;
        Ok(())
    }

    fn active_vehicle_ids(&self) -> Result<HashSet<String>, EngineError> {
        let frame = self.frame()?;
        Ok(frame
            .vehicle
            .as_ref()
            .map(|_| self.vehicle_id.clone())
            .into_iter()
            .collect())
    }

    fn vehicle_speed(&self, vehicle_id: &str) -> Result<f64, EngineError> {
        Ok(self.vehicle(vehicle_id)?.speed)
    }

    fn vehicle_position(&self, vehicle_id: &str) -> Result<(f64, f64), EngineError> {
        let v = self.vehicle(vehicle_id)?;
        Ok((v.x, v.y))
    }

    fn vehicle_odometer(&self, vehicle_id: &str) -> Result<f64, EngineError> {
        Ok(self.vehicle(vehicle_id)?.odometer)
    }

    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), EngineError> {
        let lat = self.geo_origin.latitude + y / METERS_PER_DEGREE_LAT;
        let lon_scale = METERS_PER_DEGREE_LON_AT_EQUATOR * self.geo_origin.latitude.to_radians().cos();
        let lon = self.geo_origin.longitude + x / lon_scale;
        Ok((lon, lat))
    }

    fn vehicle_route(&self, vehicle_id: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.vehicle(vehicle_id)?.route.clone())
    }

    fn vehicle_current_edge(&self, vehicle_id: &str) -> Result<String, EngineError> {
        Ok(self.vehicle(vehicle_id)?.edge.clone())
    }

    fn routing_distance(
        &self,
        vehicle_id: &str,
        target_edge: &str,
        target_offset: f64,
    ) -> Result<f64, EngineError> {
        let v = self.vehicle(vehicle_id)?;

        let Some(current) = v.route.iter().position(|e| *e == v.edge) else {
            return Ok(INVALID_DISTANCE);
        };
        let Some(ahead) = v.route[current..].iter().position(|e| e == target_edge) else {
            return Ok(INVALID_DISTANCE);
        };
        let target = current + ahead;

        if target == current {
            let d = target_offset - v.lane_position;
            return Ok(if d < 0.0 { INVALID_DISTANCE } else { d });
        }

        let mut distance = self.edges.edge_length(&v.edge)? - v.lane_position;
        for edge in &v.route[current + 1..target] {
            distance += self.edges.edge_length(edge)?;
        }
        Ok(distance + target_offset)
    }

    fn next_signal_for(&self, vehicle_id: &str) -> Result<Option<NextSignal>, EngineError> {
        Ok(self.vehicle(vehicle_id)?.next_signal.as_ref().map(|s| NextSignal {
            signal_id: s.id.clone(),
            link_index: s.link_index,
            distance_m: s.distance_m,
            state: s.state,
        }))
    }

    fn signal_program(&self, signal_id: &str) -> Result<Vec<RawPhase>, EngineError> {
        self.programs
            .get(signal_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownSignal(signal_id.to_string()))
    }

    fn signal_current_phase(&self, signal_id: &str) -> Result<usize, EngineError> {
        Ok(self.signal_frame(signal_id)?.phase)
    }

    fn signal_time_to_next_switch(&self, signal_id: &str) -> Result<f64, EngineError> {
        Ok(self.signal_frame(signal_id)?.time_to_next_switch_s)
    }
}
