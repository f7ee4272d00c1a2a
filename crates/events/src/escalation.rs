use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{RobotId, UnitId};

/// Machine-readable cause of an escalation (also used as a mission error code).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Motor temperature above the predictive-maintenance limit.
    Thermal,
    /// Vibration index above the predictive-maintenance limit.
    Vibration,
    /// Physical jam during handling; the robot itself is fine.
    MechanicalJam,
    /// Jam matching a hardware failure signature; the robot needs service.
    HardwareFault,
    /// Handling exceeded the suspension-point timeout.
    Timeout,
    /// A claim lease expired and the robot was reclaimed.
    LeaseExpired,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Thermal => "THERMAL",
            ReasonCode::Vibration => "VIBRATION",
            ReasonCode::MechanicalJam => "MECHANICAL_JAM",
            ReasonCode::HardwareFault => "HARDWARE_FAULT",
            ReasonCode::Timeout => "TIMEOUT",
            ReasonCode::LeaseExpired => "LEASE_EXPIRED",
        }
    }
}

impl core::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured notification for a human operator.
///
/// Maintenance escalations carry no unit; lease reclaims may carry neither a unit
/// nor anything beyond the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationEvent {
    pub unit_id: Option<UnitId>,
    pub robot_id: Option<RobotId>,
    pub reason_code: ReasonCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl EscalationEvent {
    pub fn new(
        unit_id: Option<UnitId>,
        robot_id: Option<RobotId>,
        reason_code: ReasonCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            unit_id,
            robot_id,
            reason_code,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
