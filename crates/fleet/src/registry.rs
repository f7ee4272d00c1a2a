//! Fleet Health Registry: per-robot telemetry and operational status.
//!
//! Like the digital twin, the registry keeps one lock per robot. Eligibility
//! listings are snapshots; the only way to take a robot is `claim`, a single
//! check-and-set under the robot's own lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use wareflow_core::{DomainError, DomainResult, Entity, MissionId, RobotId};

use crate::robot::{Lease, RobotRecord, RobotStatus, RobotType, Telemetry};

type RobotCell = Arc<Mutex<RobotRecord>>;

/// What happened when a mission handed its robot back.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lease was ours; the robot is now in the given status.
    Released(RobotStatus),
    /// The lease expired and was reclaimed (or re-claimed by another mission).
    LeaseLost,
}

#[derive(Debug, Default)]
pub struct FleetRegistry {
    // BTreeMap keeps `list_eligible` in a stable order.
    robots: RwLock<BTreeMap<RobotId, RobotCell>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, robot_id: &RobotId) -> DomainResult<RobotCell> {
        self.robots
            .read()
            .get(robot_id)
            .cloned()
            .ok_or_else(|| DomainError::RobotNotFound(robot_id.clone()))
    }

    fn cells(&self) -> Vec<RobotCell> {
        self.robots.read().values().cloned().collect()
    }

    pub fn register(&self, robot: RobotRecord) -> DomainResult<()> {
        let mut robots = self.robots.write();
        if robots.contains_key(robot.id()) {
            return Err(DomainError::DuplicateRobot(robot.id().clone()));
        }
        debug!(robot = %robot.id(), kind = %robot.robot_type(), "robot registered");
        robots.insert(robot.id().clone(), Arc::new(Mutex::new(robot)));
        Ok(())
    }

    pub fn get(&self, robot_id: &RobotId) -> DomainResult<RobotRecord> {
        Ok(self.cell(robot_id)?.lock().clone())
    }

    /// Move a robot along the status table. Returns the previous status.
    pub fn set_status(&self, robot_id: &RobotId, status: RobotStatus) -> DomainResult<RobotStatus> {
        let cell = self.cell(robot_id)?;
        let mut robot = cell.lock();
        let previous = robot.set_status(status)?;
        info!(robot = %robot_id, from = %previous, to = %status, "robot status changed");
        Ok(previous)
    }

    /// Every HEALTHY robot of the requested capability, in id order.
    ///
    /// The result is stale the moment it is returned; use `claim` to take one.
    pub fn list_eligible(&self, capability: RobotType) -> Vec<RobotId> {
        self.cells()
            .iter()
            .filter_map(|c| {
                let robot = c.lock();
                (robot.status().is_assignable() && robot.robot_type() == capability)
                    .then(|| robot.id().clone())
            })
            .collect()
    }

    /// Atomically take a HEALTHY robot for `mission_id`, marking it BUSY under a lease.
    ///
    /// Returns `Ok(None)` if another worker (or the monitor) got there first.
    pub fn claim(
        &self,
        robot_id: &RobotId,
        mission_id: MissionId,
        ttl: Duration,
    ) -> DomainResult<Option<Lease>> {
        let cell = self.cell(robot_id)?;
        let mut robot = cell.lock();
        if !robot.status().is_assignable() {
            debug!(robot = %robot_id, status = %robot.status(), "claim lost");
            return Ok(None);
        }

        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let lease = Lease {
            mission_id,
            claimed_at: now,
            expires_at,
        };
        robot.set_status(RobotStatus::Busy)?;
        robot.set_lease(Some(lease));
        debug!(robot = %robot_id, mission = %mission_id, "robot claimed");
        Ok(Some(lease))
    }

    /// Hand a robot back after a mission.
    ///
    /// Only the mission that holds the lease can release it. A robot flagged for
    /// maintenance mid-mission keeps that status; `to` is otherwise applied.
    pub fn release(
        &self,
        robot_id: &RobotId,
        mission_id: MissionId,
        to: RobotStatus,
    ) -> DomainResult<ReleaseOutcome> {
        let cell = self.cell(robot_id)?;
        let mut robot = cell.lock();

        let holds_lease = robot.lease().is_some_and(|l| l.mission_id == mission_id);
        if !holds_lease {
            warn!(robot = %robot_id, mission = %mission_id, "release after lease was lost");
            return Ok(ReleaseOutcome::LeaseLost);
        }

        robot.set_lease(None);
        if robot.status() == RobotStatus::Busy {
            robot.set_status(to)?;
        }
        debug!(robot = %robot_id, mission = %mission_id, status = %robot.status(), "robot released");
        Ok(ReleaseOutcome::Released(robot.status()))
    }

    /// Flag a robot for service. Returns `false` if it already is flagged (or retired),
    /// so callers can escalate exactly once.
    pub fn flag_for_maintenance(&self, robot_id: &RobotId) -> DomainResult<bool> {
        let cell = self.cell(robot_id)?;
        let mut robot = cell.lock();
        match robot.status() {
            RobotStatus::Healthy | RobotStatus::Busy => {
                robot.set_status(RobotStatus::MaintenanceRequired)?;
                warn!(robot = %robot_id, "robot flagged for maintenance");
                Ok(true)
            }
            RobotStatus::MaintenanceRequired | RobotStatus::Offline => Ok(false),
        }
    }

    /// External "serviced" signal: the only way out of MAINTENANCE_REQUIRED back to work.
    pub fn mark_serviced(&self, robot_id: &RobotId, telemetry: Option<Telemetry>) -> DomainResult<()> {
        let cell = self.cell(robot_id)?;
        let mut robot = cell.lock();
        if robot.status() != RobotStatus::MaintenanceRequired {
            return Err(DomainError::InvalidRobotTransition {
                robot: robot_id.clone(),
                from: robot.status().as_str(),
                to: RobotStatus::Healthy.as_str(),
            });
        }
        if let Some(t) = telemetry {
            *robot.telemetry_mut() = t;
        }
        // A lease left over from a mission flagged mid-flight is void now.
        robot.set_status(RobotStatus::Healthy)?;
        info!(robot = %robot_id, "robot serviced");
        Ok(())
    }

    /// Replace a robot's telemetry with a fresh reading.
    pub fn record_telemetry(&self, robot_id: &RobotId, telemetry: Telemetry) -> DomainResult<()> {
        *self.cell(robot_id)?.lock().telemetry_mut() = telemetry;
        Ok(())
    }

    /// Account for the wear of one finished mission: motor heat and battery drain.
    pub fn apply_mission_wear(
        &self,
        robot_id: &RobotId,
        heat_c: f64,
        battery_drain: f64,
    ) -> DomainResult<Telemetry> {
        let cell = self.cell(robot_id)?;
        let mut robot = cell.lock();
        robot.count_mission();
        let telemetry = robot.telemetry_mut();
        telemetry.motor_temp_c += heat_c;
        telemetry.battery_level = (telemetry.battery_level - battery_drain).max(0.0);
        Ok(*telemetry)
    }

    /// Return every BUSY robot whose lease expired to HEALTHY.
    ///
    /// Guards against a worker that died mid-mission leaving its robot BUSY forever.
    pub fn reap_expired_leases(&self, now: DateTime<Utc>) -> Vec<(RobotId, Lease)> {
        let mut reclaimed = Vec::new();
        for cell in self.cells() {
            let mut robot = cell.lock();
            let Some(lease) = robot.lease().copied() else {
                continue;
            };
            if !lease.is_expired(now) {
                continue;
            }
            robot.set_lease(None);
            if robot.status() == RobotStatus::Busy && robot.set_status(RobotStatus::Healthy).is_ok() {
                warn!(robot = %robot.id(), mission = %lease.mission_id, "lease expired, robot reclaimed");
                reclaimed.push((robot.id().clone(), lease));
            }
        }
        reclaimed
    }

    pub fn snapshot(&self) -> Vec<RobotRecord> {
        self.cells().iter().map(|c| c.lock().clone()).collect()
    }

    pub fn count_by_status(&self, status: RobotStatus) -> usize {
        self.cells().iter().filter(|c| c.lock().status() == status).count()
    }

    pub fn len(&self) -> usize {
        self.robots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    const TTL: Duration = Duration::from_secs(30);

    fn robot(kind: RobotType, index: usize) -> RobotRecord {
        RobotRecord::new(
            RobotId::serial(kind.as_str(), index),
            kind,
            Telemetry::new(35.0, 0.2),
        )
    }

    fn registry_with(robots: impl IntoIterator<Item = RobotRecord>) -> FleetRegistry {
        let registry = FleetRegistry::new();
        for r in robots {
            registry.register(r).unwrap();
        }
        registry
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = registry_with([robot(RobotType::Pick, 0)]);
        let err = registry.register(robot(RobotType::Pick, 0)).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateRobot(_)));
    }

    #[test]
    fn eligible_lists_only_healthy_robots_of_the_capability() {
        let registry = registry_with([
            robot(RobotType::Pick, 0),
            robot(RobotType::Pick, 1),
            robot(RobotType::Pick, 2),
            robot(RobotType::Stow, 0),
        ]);
        registry
            .flag_for_maintenance(&RobotId::serial("PICK", 1))
            .unwrap();

        let eligible = registry.list_eligible(RobotType::Pick);
        assert_eq!(
            eligible,
            vec![RobotId::serial("PICK", 0), RobotId::serial("PICK", 2)]
        );
        assert!(registry.list_eligible(RobotType::Sort).is_empty());
    }

    #[test]
    fn claim_is_exclusive_under_contention() {
        let registry = Arc::new(registry_with([robot(RobotType::Pick, 0)]));
        let id = RobotId::serial("PICK", 0);
        let contenders = 8;
        let barrier = Arc::new(Barrier::new(contenders));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..contenders)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if registry.claim(&id, MissionId::new(), TTL).unwrap().is_some() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get(&id).unwrap().status(), RobotStatus::Busy);
    }

    #[test]
    fn release_requires_the_matching_lease() {
        let registry = registry_with([robot(RobotType::Pick, 0)]);
        let id = RobotId::serial("PICK", 0);
        let mission = MissionId::new();
        registry.claim(&id, mission, TTL).unwrap().unwrap();

        let stranger = registry
            .release(&id, MissionId::new(), RobotStatus::Healthy)
            .unwrap();
        assert_eq!(stranger, ReleaseOutcome::LeaseLost);
        assert_eq!(registry.get(&id).unwrap().status(), RobotStatus::Busy);

        let owner = registry.release(&id, mission, RobotStatus::Healthy).unwrap();
        assert_eq!(owner, ReleaseOutcome::Released(RobotStatus::Healthy));
        assert!(registry.get(&id).unwrap().lease().is_none());
    }

    #[test]
    fn robot_flagged_mid_mission_stays_in_maintenance_after_release() {
        let registry = registry_with([robot(RobotType::Pick, 0)]);
        let id = RobotId::serial("PICK", 0);
        let mission = MissionId::new();
        registry.claim(&id, mission, TTL).unwrap().unwrap();

        assert!(registry.flag_for_maintenance(&id).unwrap());
        let outcome = registry.release(&id, mission, RobotStatus::Healthy).unwrap();

        assert_eq!(
            outcome,
            ReleaseOutcome::Released(RobotStatus::MaintenanceRequired)
        );
    }

    #[test]
    fn flagging_twice_reports_no_change() {
        let registry = registry_with([robot(RobotType::Move, 0)]);
        let id = RobotId::serial("MOVE", 0);

        assert!(registry.flag_for_maintenance(&id).unwrap());
        assert!(!registry.flag_for_maintenance(&id).unwrap());
    }

    #[test]
    fn serviced_signal_is_the_only_way_back() {
        let registry = registry_with([robot(RobotType::Pick, 0)]);
        let id = RobotId::serial("PICK", 0);

        // Not in maintenance: nothing to service.
        assert!(registry.mark_serviced(&id, None).is_err());

        registry.flag_for_maintenance(&id).unwrap();
        registry
            .mark_serviced(&id, Some(Telemetry::new(32.0, 0.1)))
            .unwrap();

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status(), RobotStatus::Healthy);
        assert_eq!(record.telemetry().motor_temp_c, 32.0);
    }

    #[test]
    fn expired_leases_are_reaped() {
        let registry = registry_with([robot(RobotType::Pick, 0), robot(RobotType::Pick, 1)]);
        let stuck = RobotId::serial("PICK", 0);
        let fresh = RobotId::serial("PICK", 1);
        registry
            .claim(&stuck, MissionId::new(), Duration::ZERO)
            .unwrap()
            .unwrap();
        registry.claim(&fresh, MissionId::new(), TTL).unwrap().unwrap();

        let reclaimed = registry.reap_expired_leases(Utc::now());

        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].0, stuck);
        assert_eq!(registry.get(&stuck).unwrap().status(), RobotStatus::Healthy);
        assert_eq!(registry.get(&fresh).unwrap().status(), RobotStatus::Busy);
    }

    #[test]
    fn mission_wear_heats_motor_and_drains_battery() {
        let registry = registry_with([robot(RobotType::Pick, 0)]);
        let id = RobotId::serial("PICK", 0);

        let telemetry = registry.apply_mission_wear(&id, 2.5, 120.0).unwrap();

        assert_eq!(telemetry.motor_temp_c, 37.5);
        assert_eq!(telemetry.battery_level, 0.0);
        assert_eq!(registry.get(&id).unwrap().missions_completed(), 1);
    }
}
