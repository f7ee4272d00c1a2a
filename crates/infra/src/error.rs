use thiserror::Error;

use wareflow_ai::AnalysisError;
use wareflow_core::{DomainError, RobotId, UnitId};
use wareflow_events::ReasonCode;
use wareflow_fleet::RobotType;

/// Outcome of a dispatch attempt that did not complete the mission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// No HEALTHY robot of the capability exists (or every claim race was lost).
    #[error("no available {capability} robot")]
    NoAvailableRobot { capability: RobotType },

    /// The selected robot was claimed or flagged between snapshot and claim.
    #[error("robot {0} became unavailable before it could be claimed")]
    RobotUnavailable(RobotId),

    /// Physical jam. The unit is in EXCEPTION and an escalation went out.
    #[error("dispatch of unit {unit} by {robot} failed: {reason}")]
    Failure {
        unit: UnitId,
        robot: RobotId,
        reason: ReasonCode,
    },

    /// Handling exceeded the timeout. The unit is in EXCEPTION, the robot released.
    #[error("dispatch of unit {unit} by {robot} was interrupted")]
    Interrupted { unit: UnitId, robot: RobotId },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl DispatchError {
    /// Worth retrying with backoff; everything else is final for this unit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::NoAvailableRobot { .. } | DispatchError::RobotUnavailable(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("engine is not running")]
    NotRunning,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_availability_errors_are_transient() {
        assert!(DispatchError::NoAvailableRobot {
            capability: RobotType::Pick
        }
        .is_transient());
        assert!(DispatchError::RobotUnavailable(RobotId::serial("PICK", 0)).is_transient());

        let jam = DispatchError::Failure {
            unit: UnitId::new(),
            robot: RobotId::serial("PICK", 0),
            reason: ReasonCode::MechanicalJam,
        };
        assert!(!jam.is_transient());
        assert!(!DispatchError::from(DomainError::UnitNotFound(UnitId::new())).is_transient());
    }
}
