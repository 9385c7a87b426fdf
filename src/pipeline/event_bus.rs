// src/pipeline/event_bus.rs
//
// Episode events the caller can drain after each step, so consumers do not
// have to diff snapshots to notice a spawn, a crossing or a reroute.

use crate::types::HistoryEntry;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EpisodeEvent {
    VehicleSpawned {
        tick: u64,
        edge_count: usize,
        total_distance_m: f64,
    },

    SignalPassed {
        tick: u64,
        entry: HistoryEntry,
    },

    RouteChanged {
        tick: u64,
        edge_count: usize,
        total_distance_m: f64,
    },

    /// Routing distance outside the route, replaced by zero.
    RoutingAnomaly {
        tick: u64,
        raw_distance_m: f64,
    },

    /// Signal data was unusable; the tick ran as if no signal were ahead.
    SignalFault {
        tick: u64,
        signal_id: String,
        reason: String,
    },

    VehicleDeparted {
        tick: u64,
        distance_travelled_m: f64,
    },
}

pub struct EventBus {
    events: VecDeque<EpisodeEvent>,
    max_pending: usize,
}

impl EventBus {
    pub fn new(max_pending: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_pending),
            max_pending: max_pending.max(1),
        }
    }

    pub fn publish(&mut self, event: EpisodeEvent) {
        if self.events.len() >= self.max_pending {
            warn!(
                "Event bus full ({} events), dropping oldest",
                self.max_pending
            );
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<EpisodeEvent> {
        self.events.drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let mut bus = EventBus::new(2);
        for tick in 0..3 {
            bus.publish(EpisodeEvent::VehicleDeparted {
                tick,
                distance_travelled_m: 0.0,
            });
        }
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EpisodeEvent::VehicleDeparted { tick: 1, .. }));
        assert_eq!(bus.pending_count(), 0);
    }
}
