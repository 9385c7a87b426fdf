// src/pipeline/step_controller.rs
//
// Drives one simulator tick per call and turns it into a Snapshot.
//
//   AwaitingSpawn ──vehicle appears──▶ Tracking ──vehicle gone──▶ Done
//        │                                │
//        └── advance until spawn          └── advance once, observe, emit
//
// All engine calls happen here; the predictors below are pure.

use super::event_bus::{EpisodeEvent, EventBus};
use super::metrics::EpisodeMetrics;
use crate::config::Config;
use crate::engine::{NetworkMetadata, NextSignal, SimulationEngine};
use crate::error::{EpisodeAborted, SignalError};
use crate::route::{EdgeLookup, RouteState, SpeedLimitLookahead};
use crate::signal::{
    cycle_offset, PassingWindowPredictor, RawPhase, SignalHistoryRecorder, SignalProgram,
    TrackedSignal,
};
use crate::types::{
    Color, HistoryEntry, PassingWindow, SignalObservation, Snapshot, SpeedState, TlsInfo,
};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodePhase {
    AwaitingSpawn,
    Tracking,
    Done,
}

enum EpisodeState {
    AwaitingSpawn,
    /// Route metadata is only valid while the vehicle is in the simulation.
    Tracking { route: RouteState },
    Done,
}

/// The signal ahead on one tick, after evaluation.
struct SignalReading {
    distance_m: f64,
    color: Color,
    window: PassingWindow,
    tracked: TrackedSignal,
}

pub struct StepController<E, N> {
    engine: E,
    network: N,
    config: Config,
    predictor: PassingWindowPredictor,
    lookahead: SpeedLimitLookahead,
    state: EpisodeState,
    history: SignalHistoryRecorder,
    /// Simulator advances since the last reset, spawn wait included.
    tick: u64,
    speed: SpeedState,
    last_snapshot: Option<Snapshot>,
    aborted: Option<EpisodeAborted>,
    events: EventBus,
    metrics: EpisodeMetrics,
}

impl<E: SimulationEngine, N: NetworkMetadata> StepController<E, N> {
    pub fn new(engine: E, network: N, config: Config) -> Self {
        Self {
            engine,
            network,
            predictor: PassingWindowPredictor::new(&config.signal),
            lookahead: SpeedLimitLookahead::new(config.route.transition_offset_m),
            state: EpisodeState::AwaitingSpawn,
            history: SignalHistoryRecorder::new(config.signal.proximity_threshold_m),
            tick: 0,
            speed: SpeedState::default(),
            last_snapshot: None,
            aborted: None,
            events: EventBus::new(config.episode.event_capacity),
            metrics: EpisodeMetrics::new(),
            config,
        }
    }

    /// Discard everything tracked for the current episode. The next `step`
    /// waits for the vehicle to spawn again.
    pub fn reset(&mut self) {
        self.state = EpisodeState::AwaitingSpawn;
        self.history = SignalHistoryRecorder::new(self.config.signal.proximity_threshold_m);
        self.tick = 0;
        self.speed = SpeedState::default();
        self.last_snapshot = None;
        self.aborted = None;
        self.events.clear();
        self.metrics = EpisodeMetrics::new();
    }

    pub fn step(&mut self) -> Result<Snapshot, EpisodeAborted> {
        if let Some(err) = &self.aborted {
            return Err(err.clone());
        }

        let result = self.step_inner();
        if let Err(err) = &result {
            error!("❌ {}", err);
            self.state = EpisodeState::Done;
            self.aborted = Some(err.clone());
        }
        result
    }

    pub fn current_speed_state(&self) -> SpeedState {
        self.speed
    }

    pub fn phase(&self) -> EpisodePhase {
        match self.state {
            EpisodeState::AwaitingSpawn => EpisodePhase::AwaitingSpawn,
            EpisodeState::Tracking { .. } => EpisodePhase::Tracking,
            EpisodeState::Done => EpisodePhase::Done,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn route(&self) -> Option<&RouteState> {
        match &self.state {
            EpisodeState::Tracking { route } => Some(route),
            _ => None,
        }
    }

    pub fn signal_history(&self) -> &[HistoryEntry] {
        self.history.entries()
    }

    /// Move the archived signals out; they survive the episode only this way.
    pub fn export_history(&mut self) -> Vec<HistoryEntry> {
        self.history.export()
    }

    pub fn drain_events(&mut self) -> Vec<EpisodeEvent> {
        self.events.drain()
    }

    pub fn metrics(&self) -> &EpisodeMetrics {
        &self.metrics
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn step_inner(&mut self) -> Result<Snapshot, EpisodeAborted> {
        match self.state {
            EpisodeState::Done => {
                debug!("Step after episode end, tick {}", self.tick);
                return Ok(self.departed_snapshot());
            }
            EpisodeState::AwaitingSpawn => self.await_spawn()?,
            EpisodeState::Tracking { .. } => {
                self.advance()?;
                if !self.vehicle_present()? {
                    return Ok(self.finish());
                }
                self.refresh_route()?;
            }
        }

        self.observe()
    }

    fn advance(&mut self) -> Result<(), EpisodeAborted> {
        self.engine.advance_one_tick()?;
        self.tick += 1;
        self.metrics.total_ticks += 1;
        Ok(())
    }

    fn vehicle_present(&self) -> Result<bool, EpisodeAborted> {
        Ok(self
            .engine
            .active_vehicle_ids()?
            .contains(&self.config.vehicle_id))
    }

    fn await_spawn(&mut self) -> Result<(), EpisodeAborted> {
        let mut waited = 0;
        loop {
            if waited >= self.config.episode.max_spawn_wait_ticks {
                return Err(EpisodeAborted::SpawnTimeout {
                    vehicle_id: self.config.vehicle_id.clone(),
                    ticks: waited,
                });
            }
            self.advance()?;
            if self.vehicle_present()? {
                break;
            }
            waited += 1;
            self.metrics.spawn_wait_ticks += 1;
        }

        let edges = self.engine.vehicle_route(&self.config.vehicle_id)?;
        let route = self.build_route(edges, 0.0)?;

        info!(
            "🚗 Vehicle {} spawned at tick {} ({} edges, {:.1}m route)",
            self.config.vehicle_id,
            self.tick,
            route.edges.len(),
            route.total_distance_m
        );
        self.events.publish(EpisodeEvent::VehicleSpawned {
            tick: self.tick,
            edge_count: route.edges.len(),
            total_distance_m: route.total_distance_m,
        });

        self.state = EpisodeState::Tracking { route };
        Ok(())
    }

    fn build_route(
        &self,
        edges: Vec<String>,
        distance_travelled_m: f64,
    ) -> Result<RouteState, EpisodeAborted> {
        let lengths = edges
            .iter()
            .map(|e| self.network.edge_length(e))
            .collect::<Result<Vec<_>, _>>()?;
        let limits = edges
            .iter()
            .map(|e| self.network.edge_speed_limit(e))
            .collect::<Result<Vec<_>, _>>()?;

        let mut route = RouteState::new(edges, lengths, limits, 0.0)?;
        let (last_edge, last_length) = route.last_edge();
        let total = self.engine.routing_distance(
            &self.config.vehicle_id,
            last_edge,
            last_length - self.config.route.end_offset_m,
        )?;
        if total <= 0.0 {
            warn!("Route end reported at {:.1}m, distances will clamp to 0", total);
        }

        // Measured from the vehicle, so add what is already behind it to keep
        // the total anchored at the route start.
        route.total_distance_m = distance_travelled_m + total;
        route.distance_travelled_m = distance_travelled_m;
        Ok(route)
    }

    /// Rebuild the route when the engine has rerouted the vehicle.
    fn refresh_route(&mut self) -> Result<(), EpisodeAborted> {
        let edges = self.engine.vehicle_route(&self.config.vehicle_id)?;
        let travelled = match &self.state {
            EpisodeState::Tracking { route } if !route.matches(&edges) => route.distance_travelled_m,
            _ => return Ok(()),
        };

        let route = self.build_route(edges, travelled)?;
        info!(
            "🔀 Vehicle rerouted at tick {}: {} edges, {:.1}m total",
            self.tick,
            route.edges.len(),
            route.total_distance_m
        );
        self.metrics.reroutes += 1;
        self.events.publish(EpisodeEvent::RouteChanged {
            tick: self.tick,
            edge_count: route.edges.len(),
            total_distance_m: route.total_distance_m,
        });
        self.state = EpisodeState::Tracking { route };
        Ok(())
    }

    fn finish(&mut self) -> Snapshot {
        let travelled = match &self.state {
            EpisodeState::Tracking { route } => route.distance_travelled_m,
            _ => 0.0,
        };
        info!(
            "🏁 Vehicle {} left the simulation at tick {} after {:.1}m, {} signals passed",
            self.config.vehicle_id,
            self.tick,
            travelled,
            self.history.len()
        );
        self.events.publish(EpisodeEvent::VehicleDeparted {
            tick: self.tick,
            distance_travelled_m: travelled,
        });

        self.state = EpisodeState::Done;
        let snapshot = Snapshot {
            tick: self.tick,
            elapsed_s: self.elapsed_s(),
            ..self.departed_snapshot()
        };
        self.last_snapshot = Some(snapshot.clone());
        snapshot
    }

    fn departed_snapshot(&self) -> Snapshot {
        match &self.last_snapshot {
            Some(last) => Snapshot {
                done: true,
                ..last.clone()
            },
            None => Snapshot {
                tick: self.tick,
                elapsed_s: self.elapsed_s(),
                distance_covered_m: 0.0,
                next_signal_distance_m: 0.0,
                next_signal_color: Color::Green,
                passing_window: self.predictor.sentinel_window(),
                next_signal: TlsInfo::synthetic(
                    self.config.signal.sentinel_horizon_s,
                    self.config.signal.synthetic_distance_m,
                ),
                longitude: 0.0,
                latitude: 0.0,
                signal_history: self.history.entries().to_vec(),
                done: true,
            },
        }
    }

    fn elapsed_s(&self) -> f64 {
        self.tick as f64 * self.config.tick_seconds
    }

    fn observe(&mut self) -> Result<Snapshot, EpisodeAborted> {
        let vehicle_id = self.config.vehicle_id.clone();

        let velocity = self.engine.vehicle_speed(&vehicle_id)?;
        let current_edge = self.engine.vehicle_current_edge(&vehicle_id)?;
        let odometer = self.engine.vehicle_odometer(&vehicle_id)?;
        let (x, y) = self.engine.vehicle_position(&vehicle_id)?;
        let (longitude, latitude) = self.engine.to_geo(x, y)?;
        let next_signal = match self.engine.next_signal_for(&vehicle_id)? {
            Some(next) => {
                let raw = self.engine.signal_program(&next.signal_id)?;
                let phase = self.engine.signal_current_phase(&next.signal_id)?;
                let time_to_switch = self.engine.signal_time_to_next_switch(&next.signal_id)?;
                Some((next, raw, phase, time_to_switch))
            }
            None => None,
        };

        let tick = self.tick;
        let EpisodeState::Tracking { route } = &mut self.state else {
            return Ok(self.departed_snapshot());
        };

        // Speed limits

        let edge_index = match route.locate(&current_edge) {
            EdgeLookup::Found(i) => i,
            EdgeLookup::Assumed(i) => {
                warn!(
                    "Edge {} not on route at tick {}, assuming route index {}",
                    current_edge, tick, i
                );
                self.metrics.edge_fallbacks += 1;
                i
            }
        };
        let engine = &self.engine;
        let lookahead = self
            .lookahead
            .scan(route, edge_index, velocity, |edge, offset| {
                engine.routing_distance(&vehicle_id, edge, offset)
            })?;
        if let Some(raw) = lookahead.clamped_from {
            self.metrics.routing_anomalies += 1;
            self.events.publish(EpisodeEvent::RoutingAnomaly {
                tick,
                raw_distance_m: raw,
            });
        }
        self.speed = lookahead.speed;

        // Signal ahead

        let synthetic = || {
            let distance_m = route.remaining_after(velocity);
            SignalReading {
                distance_m,
                color: Color::Green,
                window: self.predictor.sentinel_window(),
                tracked: TrackedSignal::synthetic(
                    distance_m,
                    TlsInfo::synthetic(
                        self.config.signal.sentinel_horizon_s,
                        self.config.signal.synthetic_distance_m,
                    ),
                ),
            }
        };
        let reading = match next_signal {
            Some((next, raw, phase, time_to_switch)) => {
                match evaluate_signal(&self.predictor, &next, &raw, phase, time_to_switch) {
                    Ok(reading) => reading,
                    Err(err) => {
                        warn!(
                            "⚠️  Signal {} unusable at tick {}: {}. Treating as no signal ahead",
                            next.signal_id, tick, err
                        );
                        self.metrics.signal_faults += 1;
                        self.events.publish(EpisodeEvent::SignalFault {
                            tick,
                            signal_id: next.signal_id.clone(),
                            reason: err.to_string(),
                        });
                        synthetic()
                    }
                }
            }
            None => synthetic(),
        };

        // History

        let current_info = reading.tracked.info.clone();
        match self
            .history
            .observe(tick, route.distance_travelled_m, reading.tracked)
        {
            Ok(Some(entry)) => {
                self.metrics.signals_archived += 1;
                self.events.publish(EpisodeEvent::SignalPassed {
                    tick,
                    entry: entry.clone(),
                });
            }
            Ok(None) => {}
            Err(err) => {
                // The fault belongs to the signal just passed, not the one ahead.
                let signal_id = match &err {
                    SignalError::DegenerateCycle { signal_id } => signal_id.clone(),
                    _ => None,
                };
                self.metrics.degenerate_cycles += 1;
                self.events.publish(EpisodeEvent::SignalFault {
                    tick,
                    signal_id: signal_id.unwrap_or_default(),
                    reason: err.to_string(),
                });
            }
        }

        route.distance_travelled_m += velocity;
        self.metrics.tracked_ticks += 1;

        let snapshot = Snapshot {
            tick,
            elapsed_s: tick as f64 * self.config.tick_seconds,
            distance_covered_m: odometer,
            next_signal_distance_m: reading.distance_m,
            next_signal_color: reading.color,
            passing_window: reading.window,
            next_signal: current_info,
            longitude,
            latitude,
            signal_history: self.history.entries().to_vec(),
            done: false,
        };
        self.last_snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }
}

fn evaluate_signal(
    predictor: &PassingWindowPredictor,
    next: &NextSignal,
    raw: &[RawPhase],
    current_phase_index: usize,
    time_to_next_switch_s: f64,
) -> Result<SignalReading, SignalError> {
    let program = SignalProgram::from_raw(raw, next.link_index)?;
    let color = Color::from_state_char(next.state).ok_or(SignalError::UnknownStateChar {
        phase_index: current_phase_index,
        state_char: next.state,
    })?;

    let observation = SignalObservation {
        id: next.signal_id.clone(),
        distance_m: next.distance_m,
        color,
        link_index: next.link_index,
        current_phase_index,
        time_to_next_switch_s: time_to_next_switch_s.max(0.0),
    };
    let window = predictor.predict(&observation, &program)?;
    let offset = cycle_offset(&observation, &program)?;

    Ok(SignalReading {
        distance_m: next.distance_m,
        color,
        window,
        tracked: TrackedSignal::real(
            &next.signal_id,
            next.distance_m,
            program.to_info(next.distance_m, offset),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::replay::{Frame, NextSignalFrame, SignalFrame, VehicleFrame, INVALID_DISTANCE};
    use crate::engine::{EdgeTable, ReplayEngine, Scenario};
    use crate::error::EngineError;
    use std::collections::HashMap;

    const CYCLE: [(&str, f64); 3] = [("rG", 10.0), ("Gr", 15.0), ("yr", 3.0)];
    const SIGNALS: [(&str, f64); 2] = [("J1", 100.0), ("J2", 200.0)];

    fn route() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    /// Phase index and time left in it, `t` seconds after the cycle began.
    fn phase_at(t: f64) -> (usize, f64) {
        let in_cycle = t % 28.0;
        let mut start = 0.0;
        for (i, (_, duration)) in CYCLE.iter().enumerate() {
            if in_cycle < start + duration {
                return (i, start + duration - in_cycle);
            }
            start += duration;
        }
        (0, CYCLE[0].1)
    }

    fn base_scenario() -> Scenario {
        let phases: Vec<RawPhase> = CYCLE.iter().map(|(s, d)| RawPhase::new(s, *d)).collect();
        Scenario::new("host0")
            .with_edge("A", 100.0, 13.9)
            .with_edge("B", 100.0, 13.9)
            .with_edge("C", 100.0, 22.2)
            .with_edge("D", 50.0, 8.0)
            .with_signal("J1", phases.clone())
            .with_signal("J2", phases)
    }

    fn signal_frames(frame_index: usize) -> HashMap<String, SignalFrame> {
        let (phase, time_to_next_switch_s) = phase_at(frame_index as f64);
        SIGNALS
            .iter()
            .map(|(id, _)| {
                (
                    id.to_string(),
                    SignalFrame {
                        phase,
                        time_to_next_switch_s,
                    },
                )
            })
            .collect()
    }

    /// Vehicle at `position` metres along A-B-C, seeing the first signal ahead.
    fn driving_frame(frame_index: usize, position: f64, speed: f64) -> Frame {
        let (phase, _) = phase_at(frame_index as f64);
        let edge_index = ((position / 100.0) as usize).min(2);
        let next_signal = SIGNALS
            .iter()
            .find(|(_, at)| *at > position)
            .map(|(id, at)| NextSignalFrame {
                id: id.to_string(),
                link_index: 0,
                distance_m: at - position,
                state: CYCLE[phase].0.chars().next().unwrap(),
            });

        Frame {
            vehicle: Some(VehicleFrame {
                speed,
                x: position,
                y: 0.0,
                odometer: position,
                edge: route()[edge_index].clone(),
                lane_position: position - 100.0 * edge_index as f64,
                route: route(),
                next_signal,
            }),
            signals: signal_frames(frame_index),
        }
    }

    /// `wait` empty ticks, then 30 ticks at 10 m/s across both signals, then
    /// one tick with the vehicle gone.
    fn drive_scenario(wait: usize) -> Scenario {
        let mut scenario = base_scenario();
        for _ in 0..wait {
            scenario.push_frame(Frame::default());
        }
        for k in 0..30 {
            scenario.push_frame(driving_frame(wait + k, 10.0 * k as f64, 10.0));
        }
        scenario.push_frame(Frame::default());
        scenario
    }

    fn controller(scenario: Scenario) -> StepController<ReplayEngine, EdgeTable> {
        controller_with(scenario, Config::default())
    }

    fn controller_with(
        scenario: Scenario,
        config: Config,
    ) -> StepController<ReplayEngine, EdgeTable> {
        let table = scenario.edge_table();
        StepController::new(ReplayEngine::new(scenario), table, config)
    }

    fn run_to_end(controller: &mut StepController<ReplayEngine, EdgeTable>) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();
        for _ in 0..100 {
            let snapshot = controller.step().unwrap();
            let done = snapshot.done;
            snapshots.push(snapshot);
            if done {
                break;
            }
        }
        snapshots
    }

    #[test]
    fn test_first_step_waits_for_spawn() {
        let mut c = controller(drive_scenario(2));
        assert_eq!(c.phase(), EpisodePhase::AwaitingSpawn);

        let snapshot = c.step().unwrap();
        assert_eq!(snapshot.tick, 3);
        assert_eq!(snapshot.elapsed_s, 3.0);
        assert!(!snapshot.done);
        assert_eq!(c.phase(), EpisodePhase::Tracking);
        assert_eq!(c.metrics().spawn_wait_ticks, 2);

        let route = c.route().unwrap();
        assert_eq!(route.total_distance_m, 299.5);
        assert_eq!(route.distance_travelled_m, 10.0);

        let events = c.drain_events();
        assert!(matches!(
            events[0],
            EpisodeEvent::VehicleSpawned {
                tick: 3,
                edge_count: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_snapshot_carries_passing_window() {
        let mut c = controller(drive_scenario(2));
        let snapshot = c.step().unwrap();

        // Frame 2: red with 8s left, then 15s of green.
        assert_eq!(snapshot.next_signal_color, Color::Red);
        assert_eq!(snapshot.next_signal_distance_m, 100.0);
        assert_eq!(snapshot.passing_window, PassingWindow::new(9.0, 24.0));
        assert_eq!(snapshot.next_signal.phase_durations, vec![10.0, 15.0, 3.0]);
        assert_eq!(snapshot.next_signal.cycle_offset_s, 2.0);
    }

    #[test]
    fn test_speed_lookahead_targets_end_of_last_same_limit_edge() {
        let mut c = controller(drive_scenario(0));
        c.step().unwrap();

        let speed = c.current_speed_state();
        assert_eq!(speed.velocity_m_s, 10.0);
        assert_eq!(speed.current_speed_limit, 13.9);
        assert_eq!(speed.next_speed_limit, 22.2);
        // 100 left on A plus 99.5 into B
        assert_eq!(speed.next_speed_limit_distance_m, 199.5);
    }

    #[test]
    fn test_signals_archived_when_passed() {
        let mut c = controller(drive_scenario(2));
        let snapshots = run_to_end(&mut c);

        let history = &snapshots.last().unwrap().signal_history;
        assert_eq!(history.len(), 2);

        assert_eq!(history[0].signal_id.as_deref(), Some("J1"));
        assert_eq!(history[0].archived_at_tick, 13);
        assert_eq!(history[0].info.distance_m, 100.0);
        // Offset 11 on tick 12, backdated to tick 13.
        assert_eq!(history[0].info.cycle_offset_s, 26.0);

        assert_eq!(history[1].signal_id.as_deref(), Some("J2"));
        assert_eq!(history[1].info.distance_m, 200.0);
        assert_eq!(c.metrics().signals_archived, 2);
    }

    #[test]
    fn test_synthetic_signal_after_last_junction() {
        let mut c = controller(drive_scenario(0));
        let snapshots = run_to_end(&mut c);

        // k = 20: past J2, 299.5 - 200 - 10 left.
        let past = &snapshots[20];
        assert_eq!(past.next_signal_color, Color::Green);
        assert_eq!(past.next_signal_distance_m, 89.5);
        assert_eq!(past.passing_window, PassingWindow::sentinel(100.0));
        assert_eq!(past.next_signal, TlsInfo::synthetic(100.0, 1000.0));
    }

    #[test]
    fn test_episode_ends_when_vehicle_leaves() {
        let mut c = controller(drive_scenario(2));
        let snapshots = run_to_end(&mut c);

        assert_eq!(snapshots.len(), 31);
        let last = snapshots.last().unwrap();
        assert!(last.done);
        assert_eq!(last.tick, 33);
        assert_eq!(c.phase(), EpisodePhase::Done);
        assert!(snapshots[..30].iter().all(|s| !s.done));

        let events = c.drain_events();
        assert!(matches!(
            events.last(),
            Some(EpisodeEvent::VehicleDeparted { tick: 33, .. })
        ));
    }

    #[test]
    fn test_step_after_done_does_not_advance() {
        let mut c = controller(drive_scenario(0));
        let last = run_to_end(&mut c).pop().unwrap();
        let advanced = c.engine().ticks_advanced();

        let again = c.step().unwrap();
        assert_eq!(again, last);
        assert_eq!(c.engine().ticks_advanced(), advanced);
    }

    #[test]
    fn test_spawn_timeout_aborts_episode() {
        let mut scenario = base_scenario();
        for _ in 0..10 {
            scenario.push_frame(Frame::default());
        }
        let mut config = Config::default();
        config.episode.max_spawn_wait_ticks = 3;
        let mut c = controller_with(scenario, config);

        let err = c.step().unwrap_err();
        assert_eq!(
            err,
            EpisodeAborted::SpawnTimeout {
                vehicle_id: "host0".to_string(),
                ticks: 3
            }
        );
        assert_eq!(c.engine().ticks_advanced(), 3);
        assert_eq!(c.phase(), EpisodePhase::Done);
        assert_eq!(c.step().unwrap_err(), err);
    }

    #[test]
    fn test_engine_disconnect_aborts_episode() {
        let mut scenario = base_scenario();
        scenario.push_frame(driving_frame(0, 0.0, 10.0));
        let mut c = controller(scenario);

        c.step().unwrap();
        assert!(matches!(
            c.step(),
            Err(EpisodeAborted::Engine(EngineError::Disconnected(_)))
        ));
    }

    #[test]
    fn test_bad_link_index_falls_back_to_no_signal() {
        let mut scenario = base_scenario();
        let mut frame = driving_frame(0, 0.0, 10.0);
        if let Some(vehicle) = frame.vehicle.as_mut() {
            if let Some(next) = vehicle.next_signal.as_mut() {
                next.link_index = 5;
            }
        }
        scenario.push_frame(frame);
        let mut c = controller(scenario);

        let snapshot = c.step().unwrap();
        assert_eq!(snapshot.next_signal_color, Color::Green);
        assert_eq!(snapshot.passing_window, PassingWindow::sentinel(100.0));
        assert_eq!(snapshot.next_signal_distance_m, 289.5);
        assert_eq!(c.metrics().signal_faults, 1);
        assert!(c.drain_events().iter().any(|e| matches!(
            e,
            EpisodeEvent::SignalFault { signal_id, .. } if signal_id == "J1"
        )));
    }

    #[test]
    fn test_reroute_rebuilds_route_and_keeps_distance() {
        let mut scenario = base_scenario();
        scenario.push_frame(driving_frame(0, 0.0, 10.0));
        let mut rerouted = driving_frame(1, 10.0, 10.0);
        if let Some(vehicle) = rerouted.vehicle.as_mut() {
            vehicle.route = vec!["A".to_string(), "B".to_string(), "D".to_string()];
        }
        scenario.push_frame(rerouted);
        let mut c = controller(scenario);

        c.step().unwrap();
        c.step().unwrap();

        let route = c.route().unwrap();
        assert_eq!(route.edges, vec!["A", "B", "D"]);
        // 10 already driven, then 90 left on A, all of B, 49.5 into D
        assert_eq!(route.total_distance_m, 249.5);
        assert_eq!(route.distance_travelled_m, 20.0);
        assert_eq!(c.metrics().reroutes, 1);
        assert!(c
            .drain_events()
            .iter()
            .any(|e| matches!(e, EpisodeEvent::RouteChanged { edge_count: 3, .. })));
    }

    #[test]
    fn test_remaining_distance_after_reroute_without_signal() {
        let mut scenario = base_scenario();
        let mut start = driving_frame(0, 0.0, 150.0);
        if let Some(vehicle) = start.vehicle.as_mut() {
            vehicle.next_signal = None;
        }
        scenario.push_frame(start);
        let mut rerouted = driving_frame(1, 150.0, 10.0);
        if let Some(vehicle) = rerouted.vehicle.as_mut() {
            vehicle.route = vec!["A".to_string(), "B".to_string(), "D".to_string()];
            vehicle.next_signal = None;
        }
        scenario.push_frame(rerouted);
        let mut c = controller(scenario);

        c.step().unwrap();
        let snapshot = c.step().unwrap();

        // 50 left on B, 49.5 into D, one tick of travel ahead
        assert_eq!(snapshot.next_signal_distance_m, 89.5);
        assert_eq!(c.route().unwrap().total_distance_m, 150.0 + 99.5);

        let speed = c.current_speed_state();
        assert_eq!(speed.next_speed_limit, 8.0);
        assert_eq!(speed.next_speed_limit_distance_m, 49.5);
    }

    #[test]
    fn test_degenerate_cycle_fault_names_passed_signal() {
        let mut scenario = base_scenario().with_signal(
            "Z0",
            vec![RawPhase::new("G", 0.0), RawPhase::new("r", 0.0)],
        );
        let mut near = driving_frame(0, 0.0, 10.0);
        if let Some(vehicle) = near.vehicle.as_mut() {
            vehicle.next_signal = Some(NextSignalFrame {
                id: "Z0".to_string(),
                link_index: 0,
                distance_m: 10.0,
                state: 'G',
            });
        }
        near.signals.insert(
            "Z0".to_string(),
            SignalFrame {
                phase: 0,
                time_to_next_switch_s: 0.0,
            },
        );
        scenario.push_frame(near);
        scenario.push_frame(driving_frame(1, 10.0, 10.0));
        let mut c = controller(scenario);

        c.step().unwrap();
        c.step().unwrap();

        assert_eq!(c.metrics().degenerate_cycles, 1);
        assert!(c.signal_history().is_empty());
        let faults: Vec<_> = c
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                EpisodeEvent::SignalFault { signal_id, .. } => Some(signal_id),
                _ => None,
            })
            .collect();
        assert_eq!(faults, vec!["Z0".to_string()]);
    }

    #[test]
    fn test_internal_edge_uses_next_route_edge_and_clamps_distance() {
        let mut scenario = base_scenario();
        scenario.push_frame(driving_frame(0, 95.0, 10.0));
        let mut junction = driving_frame(1, 101.0, 10.0);
        if let Some(vehicle) = junction.vehicle.as_mut() {
            vehicle.edge = ":J1_0".to_string();
        }
        scenario.push_frame(junction);
        let mut c = controller(scenario);

        c.step().unwrap();
        c.step().unwrap();

        assert_eq!(c.metrics().edge_fallbacks, 1);
        assert_eq!(c.metrics().routing_anomalies, 1);
        assert_eq!(c.route().unwrap().current_edge_index, 0);

        let speed = c.current_speed_state();
        assert_eq!(speed.current_speed_limit, 13.9);
        assert_eq!(speed.next_speed_limit, 22.2);
        assert_eq!(speed.next_speed_limit_distance_m, 0.0);
        assert!(c.drain_events().iter().any(|e| matches!(
            e,
            EpisodeEvent::RoutingAnomaly { raw_distance_m, .. } if *raw_distance_m == INVALID_DISTANCE
        )));
    }

    #[test]
    fn test_reset_clears_episode_state() {
        let mut c = controller(drive_scenario(0));
        run_to_end(&mut c);
        assert!(!c.signal_history().is_empty());

        c.reset();
        assert_eq!(c.phase(), EpisodePhase::AwaitingSpawn);
        assert_eq!(c.tick(), 0);
        assert!(c.signal_history().is_empty());
        assert!(c.drain_events().is_empty());
        assert_eq!(c.metrics().total_ticks, 0);
        assert_eq!(c.current_speed_state(), SpeedState::default());
    }

    #[test]
    fn test_export_history_empties_archive() {
        let mut c = controller(drive_scenario(0));
        run_to_end(&mut c);

        let exported = c.export_history();
        assert_eq!(exported.len(), 2);
        assert!(c.signal_history().is_empty());
    }
}
