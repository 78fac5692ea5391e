// simulation.rs
use crate::config::TrafficConfig;
use crate::control_system::operator::{run_stdin_cli, OperatorCommand};
use crate::control_system::traffic_light_controller::{PhaseDecision, TrafficLightController};
use crate::flow_analyzer::route_advisor::{analyze_traffic, RouteAdvice};
use crate::global_variables::AMQP_URL;
use crate::monitoring::event_log::{transitions, TransitionEvent};
use crate::monitoring::phase_sinks::{AmqpPhasePublisher, CsvPhaseRecorder, LogSink, PhaseSink};
use crate::shared_data::{current_timestamp, IncidentReport, PhaseReport};
use crate::simulation_engine::intersections::{Snapshot, SnapshotError};
use crate::simulation_engine::traffic_flow::{FlowSampler, FlowSimulator, RandomFlow};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{interval, interval_at, sleep, Duration, Instant, MissedTickBehavior};

/// Everything downstream consumers hear about, in commit order.
#[derive(Debug, Clone)]
pub enum Report {
    Phase(PhaseReport),
    Transition(TransitionEvent),
    Notice(String),
    Incident(IncidentReport),
    Route(RouteAdvice),
    /// Last report of a run. Everything enqueued before it is still handled.
    Shutdown,
}

struct SharedIntersection {
    snapshot: Snapshot,
    tick: u64,
}

/// Cloneable access to the authoritative snapshot.
///
/// Every mutation (simulator step, controller tick, operator command) holds
/// the lock for its whole read-modify-write and only enqueues reports while
/// holding it, so no tick observes a half-applied update and reports leave in
/// commit order.
#[derive(Clone)]
pub struct IntersectionHandle {
    state: Arc<Mutex<SharedIntersection>>,
    controller: TrafficLightController,
    reports: UnboundedSender<Report>,
}

impl IntersectionHandle {
    pub fn new(
        controller: TrafficLightController,
        snapshot: Snapshot,
    ) -> (Self, UnboundedReceiver<Report>) {
        let (reports, receiver) = unbounded_channel();
        let handle = Self {
            state: Arc::new(Mutex::new(SharedIntersection { snapshot, tick: 0 })),
            controller,
            reports,
        };
        (handle, receiver)
    }

    pub fn controller(&self) -> &TrafficLightController {
        &self.controller
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot
    }

    /// Number of controller ticks committed so far.
    pub fn tick_count(&self) -> u64 {
        self.lock().tick
    }

    fn lock(&self) -> MutexGuard<'_, SharedIntersection> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, report: Report) {
        // A closed channel only happens during shutdown.
        let _ = self.reports.send(report);
    }

    fn commit(&self, state: &mut SharedIntersection, next: Snapshot) -> Result<(), SnapshotError> {
        next.validate(self.controller.config().max_vehicle_count)?;
        let previous = std::mem::replace(&mut state.snapshot, next);
        for event in transitions(&previous, &next) {
            self.send(Report::Transition(event));
        }
        Ok(())
    }

    /// Runs one controller tick and publishes the resulting phase. The
    /// decision is logged once the lock is released.
    pub fn run_controller_tick(&self) -> Result<Snapshot, SnapshotError> {
        let (next, decision, tick) = {
            let mut state = self.lock();
            let (next, decision) = self.controller.decide_tick(&state.snapshot)?;
            self.commit(&mut state, next)?;
            state.tick += 1;
            self.send(Report::Phase(PhaseReport::from_snapshot(
                state.tick,
                current_timestamp(),
                &next,
            )));
            (next, decision, state.tick)
        };
        if decision != PhaseDecision::CountedDown {
            log::debug!("Tick {}: {}", tick, decision);
        }
        Ok(next)
    }

    /// Applies one round of simulated inflow and outflow.
    pub fn run_flow_step<S: FlowSampler>(
        &self,
        simulator: &mut FlowSimulator<S>,
    ) -> Result<Snapshot, SnapshotError> {
        let mut state = self.lock();
        let next = simulator.step(&state.snapshot);
        self.commit(&mut state, next)?;
        Ok(next)
    }

    pub fn apply_command(&self, command: OperatorCommand) -> Result<Snapshot, SnapshotError> {
        let mut state = self.lock();
        let outcome = command.apply(&self.controller, &state.snapshot);
        outcome
            .snapshot
            .validate(self.controller.config().max_vehicle_count)?;
        self.send(Report::Notice(outcome.notice));
        if let Some(incident) = outcome.incident {
            self.send(Report::Incident(incident));
        }
        self.commit(&mut state, outcome.snapshot)?;
        Ok(outcome.snapshot)
    }

    /// Closes the report stream. Reports committed before this call reach
    /// the sinks; anything committed after it is dropped.
    pub fn shutdown(&self) {
        let _state = self.lock();
        self.send(Report::Shutdown);
    }

    fn publish_route_advice(&self) {
        let snapshot = self.snapshot();
        let advice = analyze_traffic(&snapshot, self.controller.config());
        self.send(Report::Route(advice));
    }
}

/// Fixed 1 Hz controller loop.
pub async fn run_controller_loop(handle: IntersectionHandle) {
    let period = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = handle.run_controller_tick() {
            log::error!("Controller tick rejected, keeping last snapshot: {}", e);
        }
    }
}

/// Self-scheduling simulator loop: the delay is re-sampled after every step.
pub async fn run_flow_loop<S: FlowSampler>(handle: IntersectionHandle, mut simulator: FlowSimulator<S>) {
    sleep(simulator.initial_delay()).await;
    loop {
        if let Err(e) = handle.run_flow_step(&mut simulator) {
            log::error!("Simulated flow step rejected: {}", e);
        }
        let delay = simulator.next_delay();
        sleep(delay).await;
    }
}

/// Periodic route advice, read from a copy of the snapshot outside the lock.
pub async fn run_route_advisor_loop(handle: IntersectionHandle) {
    let mut ticker = interval(handle.controller().config().route_update_interval());
    loop {
        ticker.tick().await;
        handle.publish_route_advice();
    }
}

/// Sinks enabled by `config`. An unreachable broker is skipped, not fatal.
pub fn build_sinks(config: &TrafficConfig) -> Vec<Box<dyn PhaseSink>> {
    let mut sinks: Vec<Box<dyn PhaseSink>> = vec![Box::new(LogSink)];
    if let Some(path) = &config.phase_csv_path {
        sinks.push(Box::new(CsvPhaseRecorder::new(path)));
    }
    if config.publish_to_amqp {
        match AmqpPhasePublisher::connect(AMQP_URL) {
            Ok(publisher) => sinks.push(Box::new(publisher)),
            Err(e) => log::warn!(
                "RabbitMQ unavailable, continuing without phase publishing: {}",
                e
            ),
        }
    }
    sinks
}

pub fn handle_report(report: Report, sinks: &mut [Box<dyn PhaseSink>]) {
    match report {
        Report::Phase(phase) => {
            for sink in sinks.iter_mut() {
                if let Err(e) = sink.publish(&phase) {
                    log::warn!("{} sink failed on tick {}: {}", sink.name(), phase.tick, e);
                }
            }
        }
        Report::Transition(event) => log::info!("{}", event),
        Report::Notice(notice) => log::info!("{}", notice),
        Report::Incident(incident) => log::info!(
            "Incident reported: {} on {} ({})",
            incident.kind,
            incident.lane_label,
            incident.lane
        ),
        Report::Route(advice) => {
            log::debug!(
                "Best route: {} ({} vehicles at the intersection)",
                advice.best_label,
                advice.total_vehicles
            );
            if advice.congested {
                log::warn!(
                    "High congestion detected at {}: {} vehicles waiting. Suggest {}.",
                    advice.busiest_lane.label(),
                    advice.total_vehicles,
                    advice.best_label
                );
            }
        }
        Report::Shutdown => {}
    }
}

/// Drains reports in order until [`IntersectionHandle::shutdown`] or until
/// every handle is dropped, then finishes each sink. Blocking: sinks may do
/// file or network I/O.
pub fn drain_reports(mut reports: UnboundedReceiver<Report>, mut sinks: Vec<Box<dyn PhaseSink>>) {
    while let Some(report) = reports.blocking_recv() {
        if let Report::Shutdown = report {
            break;
        }
        handle_report(report, &mut sinks);
    }
    for sink in sinks {
        let name = sink.name();
        if let Err(e) = sink.finish() {
            log::warn!("{} sink did not close cleanly: {}", name, e);
        }
    }
}

/// Runs the simulated intersection until Ctrl-C or the operator exits.
pub async fn run_simulation(config: TrafficConfig) {
    let controller = TrafficLightController::new(config.clone());
    let (handle, reports) =
        IntersectionHandle::new(controller, Snapshot::initial(config.initial_green_time));

    let sink_config = config.clone();
    let drain_thread = thread::spawn(move || drain_reports(reports, build_sinks(&sink_config)));

    let simulator = FlowSimulator::new(config.clone(), RandomFlow::from_seed(config.seed));
    let controller_task = tokio::spawn(run_controller_loop(handle.clone()));
    let flow_task = tokio::spawn(run_flow_loop(handle.clone(), simulator));
    let route_task = tokio::spawn(run_route_advisor_loop(handle.clone()));

    let (exit_tx, exit_rx) = oneshot::channel();
    let console_handle = handle.clone();
    thread::spawn(move || {
        if run_stdin_cli(&console_handle) {
            let _ = exit_tx.send(());
        }
    });

    log::info!(
        "Intersection running: {} green for {}s",
        handle.snapshot().green_lane().map(|l| l.id.label()).unwrap_or("none"),
        config.initial_green_time
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Ctrl-C received, stopping intersection"),
        Ok(()) = exit_rx => log::info!("Operator exited, stopping intersection"),
    }

    for task in [controller_task, flow_task, route_task] {
        task.abort();
        // Wait until the task has stopped so no tick commits after shutdown.
        let _ = task.await;
    }
    handle.shutdown();

    // The console thread may still hold a handle, so the drain thread is
    // stopped by the shutdown report rather than by the channel closing.
    match tokio::task::spawn_blocking(move || drain_thread.join()).await {
        Ok(Ok(())) => log::info!("All reports flushed"),
        Ok(Err(_)) => log::error!("Report consumer panicked"),
        Err(e) => log::error!("Could not wait for the report consumer: {}", e),
    }
}
