// src/main.rs

use anyhow::{bail, Context, Result};
use signal_lookahead::config::Config;
use signal_lookahead::engine::{ReplayEngine, Scenario};
use signal_lookahead::pipeline::{EpisodeEvent, StepController};
use std::env;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        bail!("usage: signal-lookahead <scenario.yaml|scenario.json> [config.yaml]");
    }

    let config = match args.get(2) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("signal_lookahead={}", config.logging.level)))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚦 Signal lookahead starting");
    info!(
        "Vehicle {}, proximity threshold {:.1}m, sentinel horizon {:.0}s",
        config.vehicle_id, config.signal.proximity_threshold_m, config.signal.sentinel_horizon_s
    );

    let scenario = Scenario::load(&args[1])?;
    info!(
        "✓ Scenario loaded: {} frames, {} edges, {} signals",
        scenario.frames.len(),
        scenario.edges.len(),
        scenario.signals.len()
    );

    let network = scenario.edge_table();
    let mut controller = StepController::new(ReplayEngine::new(scenario), network, config);

    loop {
        let snapshot = controller.step()?;
        println!("{}", serde_json::to_string(&snapshot)?);

        for event in controller.drain_events() {
            match &event {
                EpisodeEvent::SignalPassed { .. } | EpisodeEvent::RouteChanged { .. } => {
                    info!("{}", serde_json::to_string(&event)?)
                }
                _ => debug!("{:?}", event),
            }
        }

        if snapshot.done {
            break;
        }
    }

    let summary = controller.metrics().summary();
    info!("📊 Episode summary:");
    info!(
        "  Ticks: {} ({} waiting for spawn, {} tracked)",
        summary.total_ticks, summary.spawn_wait_ticks, summary.tracked_ticks
    );
    info!("  Signals passed: {}", summary.signals_archived);
    info!(
        "  Faults: {} signal, {} routing, {} edge fallbacks, {} degenerate cycles",
        summary.signal_faults,
        summary.routing_anomalies,
        summary.edge_fallbacks,
        summary.degenerate_cycles
    );
    info!("  Reroutes: {}", summary.reroutes);
    info!("  Speed: {:.0} ticks/s", summary.ticks_per_second);

    Ok(())
}
