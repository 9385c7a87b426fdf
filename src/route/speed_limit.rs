// src/route/speed_limit.rs

use crate::error::{EngineError, RouteError};
use crate::types::SpeedState;
use tracing::{debug, warn};

/// The vehicle's assigned route with per-edge metadata, index-aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteState {
    pub edges: Vec<String>,
    pub edge_lengths: Vec<f64>,
    pub speed_limits: Vec<f64>,
    /// Never moves backwards while the route is unchanged.
    pub current_edge_index: usize,
    pub total_distance_m: f64,
    /// Sum of per-tick speeds (one-second Euler steps).
    pub distance_travelled_m: f64,
}

/// Result of matching the engine's current edge against the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLookup {
    Found(usize),
    /// Edge not on the route (junction-internal edge, stale route); the
    /// vehicle is assumed to be one edge past the cached index.
    Assumed(usize),
}

impl RouteState {
    pub fn new(
        edges: Vec<String>,
        edge_lengths: Vec<f64>,
        speed_limits: Vec<f64>,
        total_distance_m: f64,
    ) -> Result<Self, RouteError> {
        if edges.is_empty() {
            return Err(RouteError::EmptyRoute);
        }
        if edges.len() != edge_lengths.len() || edges.len() != speed_limits.len() {
            return Err(RouteError::MisalignedRoute {
                edges: edges.len(),
                lengths: edge_lengths.len(),
                limits: speed_limits.len(),
            });
        }

        Ok(Self {
            edges,
            edge_lengths,
            speed_limits,
            current_edge_index: 0,
            total_distance_m,
            distance_travelled_m: 0.0,
        })
    }

    pub fn last_edge(&self) -> (&str, f64) {
        let last = self.edges.len() - 1;
        (&self.edges[last], self.edge_lengths[last])
    }

    pub fn matches(&self, edges: &[String]) -> bool {
        self.edges == edges
    }

    /// Distance left to the route end, one tick of travel ahead.
    pub fn remaining_after(&self, velocity_m_s: f64) -> f64 {
        self.total_distance_m - self.distance_travelled_m - velocity_m_s
    }

    /// Find `edge_id` at or after the cached index and cache it. When the
    /// edge is not on the route, the following edge is used for this tick
    /// only and the cache stays put.
    pub fn locate(&mut self, edge_id: &str) -> EdgeLookup {
        match self.edges[self.current_edge_index..]
            .iter()
            .position(|e| e == edge_id)
        {
            Some(offset) => {
                self.current_edge_index += offset;
                EdgeLookup::Found(self.current_edge_index)
            }
            None => {
                let assumed = (self.current_edge_index + 1).min(self.edges.len() - 1);
                debug!(
                    "Edge {} not on route, assuming index {} (cached {})",
                    edge_id, assumed, self.current_edge_index
                );
                EdgeLookup::Assumed(assumed)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookaheadResult {
    pub speed: SpeedState,
    /// Raw routing distance when it had to be clamped to zero.
    pub clamped_from: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimitLookahead {
    transition_offset_m: f64,
}

impl Default for SpeedLimitLookahead {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl SpeedLimitLookahead {
    pub fn new(transition_offset_m: f64) -> Self {
        Self {
            transition_offset_m,
        }
    }

    /// Scan forward from `edge_index` for the first edge with a different
    /// speed limit.
    ///
    /// `routing_distance(edge, offset)` measures the driving distance from the
    /// vehicle to `offset` metres into `edge`. The transition point is taken
    /// as the end of the last edge that still carries the current limit.
    pub fn scan<F>(
        &self,
        route: &RouteState,
        edge_index: usize,
        velocity_m_s: f64,
        mut routing_distance: F,
    ) -> Result<LookaheadResult, EngineError>
    where
        F: FnMut(&str, f64) -> Result<f64, EngineError>,
    {
        let edge_index = edge_index.min(route.edges.len() - 1);
        let current_limit = route.speed_limits[edge_index];

        let change = route.speed_limits[edge_index..]
            .iter()
            .position(|&limit| limit != current_limit)
            .map(|offset| edge_index + offset);

        let mut clamped_from = None;
        let (next_limit, distance) = match change {
            Some(next_index) => {
                // next_index > edge_index, so the previous edge is on the route.
                let before = next_index - 1;
                let raw = routing_distance(
                    &route.edges[before],
                    route.edge_lengths[before] - self.transition_offset_m,
                )?;
                let distance = if raw < 0.0 || raw > route.total_distance_m {
                    warn!(
                        "Routing anomaly: distance {:.1}m to speed limit change at {} outside [0, {:.1}], clamped to 0",
                        raw, route.edges[next_index], route.total_distance_m
                    );
                    clamped_from = Some(raw);
                    0.0
                } else {
                    raw
                };
                (route.speed_limits[next_index], distance)
            }
            None => (current_limit, route.remaining_after(velocity_m_s)),
        };

        Ok(LookaheadResult {
            speed: SpeedState {
                velocity_m_s,
                current_speed_limit: current_limit,
                next_speed_limit: next_limit,
                next_speed_limit_distance_m: distance.clamp(0.0, route.total_distance_m.max(0.0)),
            },
            clamped_from,
        })
    }
}
