// src/pipeline/metrics.rs
//
// Per-episode counters. Reset together with the episode.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct EpisodeMetrics {
    pub total_ticks: u64,
    pub spawn_wait_ticks: u64,
    pub tracked_ticks: u64,
    pub signals_archived: u64,
    pub routing_anomalies: u64,
    pub signal_faults: u64,
    pub degenerate_cycles: u64,
    pub edge_fallbacks: u64,
    pub reroutes: u64,
    pub started_at: Instant,
}

impl Default for EpisodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EpisodeMetrics {
    pub fn new() -> Self {
        Self {
            total_ticks: 0,
            spawn_wait_ticks: 0,
            tracked_ticks: 0,
            signals_archived: 0,
            routing_anomalies: 0,
            signal_faults: 0,
            degenerate_cycles: 0,
            edge_fallbacks: 0,
            reroutes: 0,
            started_at: Instant::now(),
        }
    }

    pub fn ticks_per_second(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.total_ticks as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_ticks: self.total_ticks,
            spawn_wait_ticks: self.spawn_wait_ticks,
            tracked_ticks: self.tracked_ticks,
            signals_archived: self.signals_archived,
            routing_anomalies: self.routing_anomalies,
            signal_faults: self.signal_faults,
            degenerate_cycles: self.degenerate_cycles,
            edge_fallbacks: self.edge_fallbacks,
            reroutes: self.reroutes,
            ticks_per_second: self.ticks_per_second(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_ticks: u64,
    pub spawn_wait_ticks: u64,
    pub tracked_ticks: u64,
    pub signals_archived: u64,
    pub routing_anomalies: u64,
    pub signal_faults: u64,
    pub degenerate_cycles: u64,
    pub edge_fallbacks: u64,
    pub reroutes: u64,
    pub ticks_per_second: f64,
    pub elapsed_secs: f64,
}
