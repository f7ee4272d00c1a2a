//! `WarehouseEngine`: the in-process facade a scheduler loop or service handler drives.
//!
//! It owns both stores and wires the dispatcher, gateway, recorder, monitor and
//! optimizer together. `start` spawns the worker pool and the periodic runners;
//! `shutdown` stops them and drains both outboxes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use wareflow_ai::AnalysisError;
use wareflow_core::{DomainError, DomainResult, RobotId, UnitId};
use wareflow_events::{EscalationEvent, MissionRecord, Sink, TracingSink};
use wareflow_fleet::{
    initialize_fleet, FleetInit, FleetRegistry, RandomTelemetry, Telemetry, TelemetryGenerator,
};
use wareflow_inventory::{DigitalTwinStore, StowRequest, UnitLocation, UnitStatus};

use crate::analytics::{MissionRecorder, MissionTally};
use crate::config::EngineConfig;
use crate::dispatcher::TaskDispatcher;
use crate::error::{DispatchError, EngineError};
use crate::escalation::EscalationGateway;
use crate::handling::{FaultInjector, Pause, RandomFaults, ThreadPause};
use crate::monitor::{MonitorReport, PredictiveMaintenanceMonitor};
use crate::queue::PickQueue;
use crate::runner::{PeriodicRunner, RunnerHandle};
use crate::slotting::SlottingOptimizer;
use crate::workers::DispatchPool;

const MONITOR: &str = "pdm-monitor";

/// Final counters returned by `shutdown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSummary {
    pub missions: MissionTally,
    pub escalations: u64,
    pub abandoned_picks: u64,
}

pub struct EngineBuilder {
    config: EngineConfig,
    escalation_sink: Option<Arc<dyn Sink<EscalationEvent>>>,
    mission_sink: Option<Arc<dyn Sink<MissionRecord>>>,
    pause: Option<Box<dyn Pause>>,
    faults: Option<Box<dyn FaultInjector>>,
    telemetry: Option<Box<dyn TelemetryGenerator>>,
}

impl EngineBuilder {
    pub fn escalation_sink(mut self, sink: Arc<dyn Sink<EscalationEvent>>) -> Self {
        self.escalation_sink = Some(sink);
        self
    }

    pub fn mission_sink(mut self, sink: Arc<dyn Sink<MissionRecord>>) -> Self {
        self.mission_sink = Some(sink);
        self
    }

    pub fn pause(mut self, pause: Box<dyn Pause>) -> Self {
        self.pause = Some(pause);
        self
    }

    pub fn faults(mut self, faults: Box<dyn FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Generator for per-mission motor heat.
    pub fn telemetry(mut self, generator: Box<dyn TelemetryGenerator>) -> Self {
        self.telemetry = Some(generator);
        self
    }

    pub fn build(self) -> Result<WarehouseEngine, EngineError> {
        let config = self.config;
        config.validate()?;

        let escalation_sink = self
            .escalation_sink
            .unwrap_or_else(|| Arc::new(TracingSink::new("escalation")));
        let mission_sink = self
            .mission_sink
            .unwrap_or_else(|| Arc::new(TracingSink::new("analytics")));
        let pause = self.pause.unwrap_or_else(|| Box::new(ThreadPause));
        let faults = self.faults.unwrap_or_else(|| {
            Box::new(RandomFaults::new(
                config.faults.jam_probability,
                config.faults.hardware_share,
            ))
        });
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Box::new(RandomTelemetry::new()));

        let twin = Arc::new(DigitalTwinStore::new());
        let fleet = Arc::new(FleetRegistry::new());
        let gateway = Arc::new(EscalationGateway::spawn(escalation_sink)?);
        let recorder = Arc::new(MissionRecorder::spawn(mission_sink)?);

        let dispatcher = TaskDispatcher::new(
            Arc::clone(&twin),
            Arc::clone(&fleet),
            Arc::clone(&gateway),
            Arc::clone(&recorder),
            config.dispatch.clone(),
        )
        .with_handling(pause, faults)
        .with_telemetry(telemetry);

        let monitor = PredictiveMaintenanceMonitor::new(
            Arc::clone(&fleet),
            Arc::clone(&gateway),
            config.maintenance.thresholds,
        );
        let optimizer = SlottingOptimizer::new(
            Arc::clone(&twin),
            config.slotting.clone(),
            config.decay.clone(),
        );

        Ok(WarehouseEngine {
            config,
            twin,
            fleet,
            gateway,
            recorder,
            dispatcher: Arc::new(dispatcher),
            monitor: Arc::new(monitor),
            optimizer: Arc::new(optimizer),
            queue: Arc::new(PickQueue::new()),
            running: Mutex::new(None),
        })
    }
}

struct Running {
    pool: DispatchPool,
    runners: Vec<RunnerHandle>,
}

pub struct WarehouseEngine {
    config: EngineConfig,
    twin: Arc<DigitalTwinStore>,
    fleet: Arc<FleetRegistry>,
    gateway: Arc<EscalationGateway>,
    recorder: Arc<MissionRecorder>,
    dispatcher: Arc<TaskDispatcher>,
    monitor: Arc<PredictiveMaintenanceMonitor>,
    optimizer: Arc<SlottingOptimizer>,
    queue: Arc<PickQueue>,
    running: Mutex<Option<Running>>,
}

impl WarehouseEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            escalation_sink: None,
            mission_sink: None,
            pause: None,
            faults: None,
            telemetry: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn twin(&self) -> &DigitalTwinStore {
        &self.twin
    }

    pub fn fleet(&self) -> &FleetRegistry {
        &self.fleet
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn initialize_fleet(
        &self,
        init: &FleetInit,
        generator: &mut dyn TelemetryGenerator,
    ) -> DomainResult<Vec<RobotId>> {
        initialize_fleet(&self.fleet, init, generator)
    }

    /// Inbound stow without a robot (e.g. manual receive).
    pub fn stow(&self, request: StowRequest) -> DomainResult<UnitId> {
        self.twin.stow(request)
    }

    pub fn dispatch_stow(&self, request: StowRequest) -> Result<MissionRecord, DispatchError> {
        self.dispatcher.dispatch_stow(request)
    }

    /// STOWED → PENDING_PICK, then hand the unit to the dispatch workers.
    pub fn request_pick(&self, unit_id: UnitId) -> Result<(), EngineError> {
        if self.queue.is_closed() {
            return Err(EngineError::NotRunning);
        }
        let unit = self.twin.get(unit_id)?;
        if unit.is_archived() {
            return Err(DomainError::validation(format!("unit {unit_id} is archived")).into());
        }
        self.twin.transition(unit_id, UnitStatus::PendingPick, None)?;
        if self.queue.push(unit_id).is_err() {
            warn!(unit = %unit_id, "queue closed after pick request; unit left PENDING_PICK");
        }
        Ok(())
    }

    /// Re-queue every PENDING_PICK unit (e.g. after picks were abandoned).
    pub fn requeue_pending_picks(&self) -> usize {
        self.twin
            .ids_with_status(UnitStatus::PendingPick)
            .into_iter()
            .filter(|id| self.queue.push(*id).is_ok())
            .count()
    }

    pub fn update_demand(&self, unit_id: UnitId, score: f64) -> DomainResult<()> {
        self.twin.update_demand(unit_id, score)
    }

    /// Where the active units of `sku` sit.
    pub fn find_by_sku(&self, sku: &str) -> Vec<UnitLocation> {
        self.twin.find_by_sku(sku)
    }

    pub fn archive(&self, unit_id: UnitId) -> DomainResult<()> {
        self.twin.archive(unit_id)
    }

    /// Replace a robot's telemetry and ask the monitor for an early pass.
    pub fn record_telemetry(&self, robot_id: &RobotId, telemetry: Telemetry) -> DomainResult<()> {
        self.fleet.record_telemetry(robot_id, telemetry)?;
        if let Some(running) = self.running.lock().as_ref() {
            for runner in running.runners.iter().filter(|r| r.name() == MONITOR) {
                runner.trigger();
            }
        }
        Ok(())
    }

    /// External "serviced" signal.
    pub fn mark_serviced(&self, robot_id: &RobotId, telemetry: Option<Telemetry>) -> DomainResult<()> {
        self.fleet.mark_serviced(robot_id, telemetry)
    }

    pub fn run_monitor_pass(&self) -> Result<MonitorReport, AnalysisError> {
        self.monitor.run_pass()
    }

    pub fn run_slotting_pass(&self) -> Result<usize, AnalysisError> {
        self.optimizer.run_pass()
    }

    pub fn run_decay_pass(&self) -> Result<usize, AnalysisError> {
        self.optimizer.run_decay_pass()
    }

    /// Spawn the dispatch workers and the periodic runners.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        if self.queue.is_closed() {
            return Err(EngineError::NotRunning);
        }

        let mut runners = Vec::new();

        let monitor = Arc::clone(&self.monitor);
        runners.push(
            PeriodicRunner::new(MONITOR, self.config.maintenance.runner.clone())
                .spawn(move || monitor.run_pass())?,
        );

        let optimizer = Arc::clone(&self.optimizer);
        runners.push(
            PeriodicRunner::new("slotting-runner", self.config.slotting.runner.clone())
                .spawn(move || optimizer.run_pass())?,
        );

        if self.config.decay.enabled {
            let optimizer = Arc::clone(&self.optimizer);
            runners.push(
                PeriodicRunner::new("decay-runner", self.config.decay.runner.clone())
                    .spawn(move || optimizer.run_decay_pass())?,
            );
        }

        let pool = DispatchPool::spawn(
            self.config.workers,
            Arc::clone(&self.queue),
            Arc::clone(&self.dispatcher),
            self.config.pick_retry.clone(),
        )?;

        info!(workers = self.config.workers, runners = runners.len(), "engine started");
        *running = Some(Running { pool, runners });
        Ok(())
    }

    /// Block until the pick queue is empty and no dispatch is in flight.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_idle(timeout)
    }

    /// Deliver everything queued so far to both sinks.
    pub fn flush(&self) {
        self.gateway.flush();
        self.recorder.flush();
    }

    pub fn tally(&self) -> MissionTally {
        self.recorder.tally()
    }

    /// Stop workers and runners, then drain and close both outboxes.
    pub fn shutdown(self) -> EngineSummary {
        let abandoned_picks = self.stop();
        self.gateway.shutdown();
        self.recorder.shutdown();

        let summary = EngineSummary {
            missions: self.recorder.tally(),
            escalations: self.gateway.raised(),
            abandoned_picks,
        };
        info!(?summary, "engine stopped");
        summary
    }

    fn stop(&self) -> u64 {
        let dropped = self.queue.close();
        if dropped > 0 {
            warn!(dropped, "queued picks dropped at shutdown; units stay PENDING_PICK");
        }
        let Some(running) = self.running.lock().take() else {
            return 0;
        };
        for runner in running.runners {
            runner.shutdown();
        }
        running.pool.join()
    }
}

impl Drop for WarehouseEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WarehouseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseEngine")
            .field("units", &self.twin.len())
            .field("robots", &self.fleet.len())
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
