// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vehicle_id: String,
    /// Nominal tick length. Only used to report elapsed time; distance
    /// accumulation assumes one-second ticks regardless.
    pub tick_seconds: f64,
    pub signal: SignalConfig,
    pub route: RouteConfig,
    pub episode: EpisodeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Previous signal must have been closer than this for a crossing to count.
    pub proximity_threshold_m: f64,
    /// "No computable bound" horizon for passing windows.
    pub sentinel_horizon_s: f64,
    /// Added to the time left in the current phase.
    pub switch_bias_s: f64,
    /// Distance recorded in the synthetic info when no signal is ahead.
    pub synthetic_distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Route end is measured this far before the end of the last edge.
    pub end_offset_m: f64,
    /// Speed-limit transitions are measured this far before the edge end.
    pub transition_offset_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    pub max_spawn_wait_ticks: u64,
    pub event_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vehicle_id: "host0".to_string(),
            tick_seconds: 1.0,
            signal: SignalConfig::default(),
            route: RouteConfig::default(),
            episode: EpisodeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_m: 30.0,
            sentinel_horizon_s: 100.0,
            switch_bias_s: 1.0,
            synthetic_distance_m: 1000.0,
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            end_offset_m: 0.5,
            transition_offset_m: 0.5,
        }
    }
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            max_spawn_wait_ticks: 3600,
            event_capacity: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }
}
