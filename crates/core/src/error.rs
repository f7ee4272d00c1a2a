//! Domain error model.

use thiserror::Error;

use crate::id::{RobotId, UnitId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error raised by the digital twin and the fleet registry.
///
/// These are programmer/data errors: fatal to the call, never retried. Transient
/// dispatch conditions (no robot, lost claim race) live in the dispatcher's error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A unit with this id is already stowed.
    #[error("duplicate unit: {0}")]
    DuplicateUnit(UnitId),

    /// A robot with this id is already registered.
    #[error("duplicate robot: {0}")]
    DuplicateRobot(RobotId),

    #[error("unit not found: {0}")]
    UnitNotFound(UnitId),

    #[error("robot not found: {0}")]
    RobotNotFound(RobotId),

    /// The requested lifecycle status is not reachable from the unit's current status.
    #[error("invalid transition for unit {unit}: {from} -> {to}")]
    InvalidTransition {
        unit: UnitId,
        from: &'static str,
        to: &'static str,
    },

    /// The requested robot status is not reachable from the robot's current status.
    #[error("invalid transition for robot {robot}: {from} -> {to}")]
    InvalidRobotTransition {
        robot: RobotId,
        from: &'static str,
        to: &'static str,
    },

    /// A value failed validation (e.g. demand score outside [0, 1]).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnitNotFound(_) | Self::RobotNotFound(_))
    }
}
