//! Task Dispatcher.
//!
//! A dispatch runs in three phases:
//!
//! ```text
//! snapshot eligible robots → select one → claim (atomic HEALTHY→BUSY + lease)
//!   ↓
//! unit → IN_TRANSIT, simulated handling (the only suspension point)
//!   ↓
//! completed: unit → PICKED, wear applied, robot released HEALTHY, COMPLETED record
//! jammed:    unit → EXCEPTION, robot released HEALTHY or MAINTENANCE_REQUIRED,
//!            one escalation, FAILED record
//! timed out: unit → EXCEPTION, robot released HEALTHY, TIMEOUT escalation,
//!            INTERRUPTED record
//! ```
//!
//! Selection is optimistic: the eligible list is a snapshot and only the claim is
//! authoritative. A lost claim is `RobotUnavailable`; `dispatch_pick` retries it a
//! bounded number of times before reporting `NoAvailableRobot`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use wareflow_core::{DomainError, Entity, MissionId, RobotId, UnitId};
use wareflow_events::{MissionRecord, MissionStatus, ReasonCode};
use wareflow_fleet::{FleetRegistry, RandomTelemetry, ReleaseOutcome, RobotStatus, RobotType, TelemetryGenerator};
use wareflow_inventory::{DigitalTwinStore, InventoryUnit, StowRequest, UnitStatus, Zone};

use crate::analytics::MissionRecorder;
use crate::config::{DispatchConfig, RobotSelection};
use crate::error::DispatchError;
use crate::escalation::EscalationGateway;
use crate::handling::{
    AssignmentTask, FaultInjector, FaultSignature, HandlingFault, Leg, NoFaults, Pause,
    SimulatedHandling, ThreadPause,
};

/// A claimed robot on its way.
struct Mission {
    task: AssignmentTask,
    leg: Leg,
    started_at: DateTime<Utc>,
    battery_start: f64,
}

impl Mission {
    fn record(&self, status: MissionStatus, error_code: Option<ReasonCode>, battery_end: f64) -> MissionRecord {
        MissionRecord {
            mission_id: self.task.mission_id,
            robot_id: self.task.candidate_robot_id.clone(),
            unit_id: self.task.unit_id,
            start_ts: self.started_at,
            end_ts: Utc::now(),
            status,
            error_code,
            distance_meters: self.leg.distance_meters,
            battery_level_start: self.battery_start,
            battery_level_end: battery_end,
            partition_day: self.started_at.date_naive(),
        }
    }
}

pub struct TaskDispatcher {
    twin: Arc<DigitalTwinStore>,
    fleet: Arc<FleetRegistry>,
    gateway: Arc<EscalationGateway>,
    recorder: Arc<MissionRecorder>,
    handling: SimulatedHandling,
    telemetry: Mutex<Box<dyn TelemetryGenerator>>,
    config: DispatchConfig,
}

impl TaskDispatcher {
    pub fn new(
        twin: Arc<DigitalTwinStore>,
        fleet: Arc<FleetRegistry>,
        gateway: Arc<EscalationGateway>,
        recorder: Arc<MissionRecorder>,
        config: DispatchConfig,
    ) -> Self {
        let handling = SimulatedHandling::new(
            Box::new(ThreadPause),
            Box::new(NoFaults),
            config.handling_timeout,
        );
        Self {
            twin,
            fleet,
            gateway,
            recorder,
            handling,
            telemetry: Mutex::new(Box::new(RandomTelemetry::new())),
            config,
        }
    }

    /// Replace the suspension point and the jam model.
    pub fn with_handling(mut self, pause: Box<dyn Pause>, faults: Box<dyn FaultInjector>) -> Self {
        self.handling = SimulatedHandling::new(pause, faults, self.config.handling_timeout);
        self
    }

    /// Replace the generator that supplies per-mission motor heat.
    pub fn with_telemetry(mut self, generator: Box<dyn TelemetryGenerator>) -> Self {
        self.telemetry = Mutex::new(generator);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatch a PENDING_PICK unit, retrying lost claim races internally.
    pub fn dispatch_pick(&self, unit_id: UnitId) -> Result<MissionRecord, DispatchError> {
        self.dispatch_pick_from(unit_id, &|| self.fleet.list_eligible(RobotType::Pick))
    }

    fn dispatch_pick_from(
        &self,
        unit_id: UnitId,
        eligible: &dyn Fn() -> Vec<RobotId>,
    ) -> Result<MissionRecord, DispatchError> {
        let unit = self.pending_pick(unit_id)?;
        let task = self.claim(RobotType::Pick, unit_id, eligible)?;
        self.run_pick(task, unit.zone())
    }

    /// Stow an inbound unit with a STOW robot as the acting robot.
    ///
    /// A jam still stows the unit (so it has an audit trail) and moves it straight
    /// to EXCEPTION.
    pub fn dispatch_stow(&self, request: StowRequest) -> Result<MissionRecord, DispatchError> {
        request.validate()?;
        if self.twin.get(request.unit_id).is_ok() {
            return Err(DomainError::DuplicateUnit(request.unit_id).into());
        }

        let task = self.claim(RobotType::Stow, request.unit_id, &|| {
            self.fleet.list_eligible(RobotType::Stow)
        })?;
        let robot_id = task.candidate_robot_id.clone();
        let mission = self.begin(task, request.zone);
        let outcome = self.handling.perform(&mission.task, &mission.leg);

        if let Err(e) = self.twin.stow(request.stowed_by(robot_id)) {
            self.release(&mission.task, RobotStatus::Healthy);
            return Err(e.into());
        }

        match outcome {
            Ok(()) => Ok(self.complete(&mission)),
            Err(fault) => Err(self.fail(&mission, fault)),
        }
    }

    fn pending_pick(&self, unit_id: UnitId) -> Result<InventoryUnit, DispatchError> {
        let unit = self.twin.get(unit_id)?;
        if unit.is_archived() {
            return Err(DomainError::validation(format!("unit {unit_id} is archived")).into());
        }
        if unit.status() != UnitStatus::PendingPick {
            return Err(DomainError::InvalidTransition {
                unit: unit_id,
                from: unit.status().as_str(),
                to: UnitStatus::InTransit.as_str(),
            }
            .into());
        }
        Ok(unit)
    }

    /// Claim a robot of `capability`, taking a fresh `eligible` snapshot per attempt.
    fn claim(
        &self,
        capability: RobotType,
        unit_id: UnitId,
        eligible: &dyn Fn() -> Vec<RobotId>,
    ) -> Result<AssignmentTask, DispatchError> {
        let attempts = self.config.max_claim_attempts.max(1);
        for attempt in 1..=attempts {
            match self.claim_once(capability, unit_id, &eligible()) {
                Err(DispatchError::RobotUnavailable(robot)) => {
                    debug!(unit = %unit_id, robot = %robot, attempt, "claim race lost");
                }
                other => return other,
            }
        }
        warn!(unit = %unit_id, capability = %capability, attempts, "claim retries exhausted");
        Err(DispatchError::NoAvailableRobot { capability })
    }

    /// One claim against a snapshot; a robot taken since the snapshot is
    /// `RobotUnavailable`.
    fn claim_once(
        &self,
        capability: RobotType,
        unit_id: UnitId,
        eligible: &[RobotId],
    ) -> Result<AssignmentTask, DispatchError> {
        let requested_at = Utc::now();
        let Some(candidate) = self.select(eligible) else {
            return Err(DispatchError::NoAvailableRobot { capability });
        };

        let mission_id = MissionId::new();
        match self.fleet.claim(&candidate, mission_id, self.config.claim_ttl())? {
            Some(_) => Ok(AssignmentTask {
                mission_id,
                unit_id,
                candidate_robot_id: candidate,
                requested_at,
            }),
            None => Err(DispatchError::RobotUnavailable(candidate)),
        }
    }

    fn select(&self, eligible: &[RobotId]) -> Option<RobotId> {
        match self.config.selection {
            RobotSelection::FirstEligible => eligible.first().cloned(),
            RobotSelection::LeastWorn => eligible
                .iter()
                .filter_map(|id| self.fleet.get(id).ok())
                .min_by_key(|robot| robot.missions_completed())
                .map(|robot| robot.id().clone()),
        }
    }

    fn begin(&self, task: AssignmentTask, zone: Zone) -> Mission {
        let battery_start = self
            .fleet
            .get(&task.candidate_robot_id)
            .map_or(0.0, |robot| robot.telemetry().battery_level);
        info!(
            mission = %task.mission_id,
            unit = %task.unit_id,
            robot = %task.candidate_robot_id,
            zone = %zone,
            "mission started"
        );
        Mission {
            task,
            leg: self.config.latency.leg(zone),
            started_at: Utc::now(),
            battery_start,
        }
    }

    fn run_pick(&self, task: AssignmentTask, zone: Zone) -> Result<MissionRecord, DispatchError> {
        let robot_id = task.candidate_robot_id.clone();

        // The unit may have been taken by another worker since the status check.
        if let Err(e) = self.twin.transition(task.unit_id, UnitStatus::InTransit, Some(&robot_id)) {
            self.release(&task, RobotStatus::Healthy);
            return Err(e.into());
        }

        let mission = self.begin(task, zone);
        match self.handling.perform(&mission.task, &mission.leg) {
            Ok(()) => {
                if let Err(e) = self.twin.transition(mission.task.unit_id, UnitStatus::Picked, Some(&robot_id)) {
                    self.release(&mission.task, RobotStatus::Healthy);
                    return Err(e.into());
                }
                Ok(self.complete(&mission))
            }
            Err(fault) => Err(self.fail(&mission, fault)),
        }
    }

    fn complete(&self, mission: &Mission) -> MissionRecord {
        let robot_id = &mission.task.candidate_robot_id;
        let heat = self.telemetry.lock().mission_heat();
        let drain = mission.leg.distance_meters * self.config.battery_drain_per_meter;

        let battery_end = match self.fleet.apply_mission_wear(robot_id, heat, drain) {
            Ok(telemetry) => telemetry.battery_level,
            Err(e) => {
                warn!(robot = %robot_id, error = %e, "could not apply mission wear");
                mission.battery_start
            }
        };
        // Stamp the record while the robot is still ours.
        let record = mission.record(MissionStatus::Completed, None, battery_end);
        self.release(&mission.task, RobotStatus::Healthy);

        info!(
            mission = %record.mission_id,
            unit = %record.unit_id,
            robot = %robot_id,
            secs = record.duration_secs(),
            "mission completed"
        );
        self.recorder.record(record.clone());
        record
    }

    fn fail(&self, mission: &Mission, fault: HandlingFault) -> DispatchError {
        let task = &mission.task;
        let robot_id = &task.candidate_robot_id;

        if let Err(e) = self.twin.transition(task.unit_id, UnitStatus::Exception, Some(robot_id)) {
            warn!(unit = %task.unit_id, error = %e, "could not move unit to EXCEPTION");
        }

        let (release_to, reason, status, message) = match fault {
            HandlingFault::Jam(FaultSignature::Mechanical) => (
                RobotStatus::Healthy,
                ReasonCode::MechanicalJam,
                MissionStatus::Failed,
                "Mechanical Jam".to_string(),
            ),
            HandlingFault::Jam(FaultSignature::Hardware) => (
                RobotStatus::MaintenanceRequired,
                ReasonCode::HardwareFault,
                MissionStatus::Failed,
                "jam matches a hardware failure signature; robot pulled for service".to_string(),
            ),
            HandlingFault::Timeout => (
                RobotStatus::Healthy,
                ReasonCode::Timeout,
                MissionStatus::Interrupted,
                format!("handling exceeded {:?}", self.config.handling_timeout),
            ),
        };

        let record = mission.record(status, Some(reason), mission.battery_start);
        self.release(task, release_to);
        self.gateway
            .escalate(Some(task.unit_id), Some(robot_id.clone()), reason, message);
        self.recorder.record(record);

        match fault {
            HandlingFault::Timeout => DispatchError::Interrupted {
                unit: task.unit_id,
                robot: robot_id.clone(),
            },
            HandlingFault::Jam(_) => DispatchError::Failure {
                unit: task.unit_id,
                robot: robot_id.clone(),
                reason,
            },
        }
    }

    fn release(&self, task: &AssignmentTask, to: RobotStatus) {
        let robot_id = &task.candidate_robot_id;
        match self.fleet.release(robot_id, task.mission_id, to) {
            Ok(ReleaseOutcome::Released(status)) => {
                debug!(robot = %robot_id, status = %status, "robot released");
            }
            Ok(ReleaseOutcome::LeaseLost) => {}
            Err(e) => warn!(robot = %robot_id, error = %e, "robot release failed"),
        }
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher")
            .field("config", &self.config)
            .field("handling", &self.handling)
            .finish_non_exhaustive()
    }
}
