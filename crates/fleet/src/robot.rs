use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{DomainError, DomainResult, Entity, MissionId, RobotId};

/// Capability class of a robot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotType {
    Stow,
    Move,
    Pick,
    Sort,
}

impl RobotType {
    pub const ALL: [RobotType; 4] = [
        RobotType::Stow,
        RobotType::Move,
        RobotType::Pick,
        RobotType::Sort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RobotType::Stow => "STOW",
            RobotType::Move => "MOVE",
            RobotType::Pick => "PICK",
            RobotType::Sort => "SORT",
        }
    }
}

impl core::fmt::Display for RobotType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RobotType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RobotType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown robot type: {s}")))
    }
}

/// Operational status of a robot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RobotStatus {
    Healthy,
    Busy,
    MaintenanceRequired,
    Offline,
}

/// Every legal `(from, to)` status move.
///
/// MAINTENANCE_REQUIRED only leaves through HEALTHY (the serviced signal) or OFFLINE.
const LEGAL_TRANSITIONS: &[(RobotStatus, RobotStatus)] = &[
    (RobotStatus::Healthy, RobotStatus::Busy),
    (RobotStatus::Busy, RobotStatus::Healthy),
    (RobotStatus::Healthy, RobotStatus::MaintenanceRequired),
    (RobotStatus::Busy, RobotStatus::MaintenanceRequired),
    (RobotStatus::MaintenanceRequired, RobotStatus::Healthy),
    (RobotStatus::Healthy, RobotStatus::Offline),
    (RobotStatus::Busy, RobotStatus::Offline),
    (RobotStatus::MaintenanceRequired, RobotStatus::Offline),
    (RobotStatus::Offline, RobotStatus::Healthy),
];

impl RobotStatus {
    pub fn can_transition_to(self, next: RobotStatus) -> bool {
        LEGAL_TRANSITIONS.contains(&(self, next))
    }

    /// Only HEALTHY robots may be handed a new assignment.
    pub fn is_assignable(self) -> bool {
        self == RobotStatus::Healthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RobotStatus::Healthy => "HEALTHY",
            RobotStatus::Busy => "BUSY",
            RobotStatus::MaintenanceRequired => "MAINTENANCE_REQUIRED",
            RobotStatus::Offline => "OFFLINE",
        }
    }
}

impl core::fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware telemetry reported by a robot.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub motor_temp_c: f64,
    pub battery_cycles: u32,
    pub vibration_index: f64,
    /// Remaining charge in percent.
    pub battery_level: f64,
}

impl Telemetry {
    pub fn new(motor_temp_c: f64, vibration_index: f64) -> Self {
        Self {
            motor_temp_c,
            battery_cycles: 0,
            vibration_index,
            battery_level: 100.0,
        }
    }

    pub fn with_battery(mut self, cycles: u32, level: f64) -> Self {
        self.battery_cycles = cycles;
        self.battery_level = level;
        self
    }
}

/// Time-bounded claim of a robot by one mission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub mission_id: MissionId,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A robot in the fleet. Never removed while the fleet runs; OFFLINE is retirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotRecord {
    id: RobotId,
    robot_type: RobotType,
    telemetry: Telemetry,
    status: RobotStatus,
    lease: Option<Lease>,
    missions_completed: u64,
}

impl RobotRecord {
    pub fn new(id: RobotId, robot_type: RobotType, telemetry: Telemetry) -> Self {
        Self {
            id,
            robot_type,
            telemetry,
            status: RobotStatus::Healthy,
            lease: None,
            missions_completed: 0,
        }
    }

    pub fn robot_type(&self) -> RobotType {
        self.robot_type
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn status(&self) -> RobotStatus {
        self.status
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    pub fn missions_completed(&self) -> u64 {
        self.missions_completed
    }

    pub(crate) fn set_status(&mut self, next: RobotStatus) -> DomainResult<RobotStatus> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidRobotTransition {
                robot: self.id.clone(),
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        let previous = self.status;
        self.status = next;
        if next != RobotStatus::Busy && next != RobotStatus::MaintenanceRequired {
            self.lease = None;
        }
        Ok(previous)
    }

    pub(crate) fn set_lease(&mut self, lease: Option<Lease>) {
        self.lease = lease;
    }

    pub(crate) fn telemetry_mut(&mut self) -> &mut Telemetry {
        &mut self.telemetry
    }

    pub(crate) fn count_mission(&mut self) {
        self.missions_completed += 1;
    }
}

impl Entity for RobotRecord {
    type Id = RobotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
