//! Exception Escalation Gateway.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use wareflow_core::{RobotId, UnitId};
use wareflow_events::{EscalationEvent, ReasonCode, Sink};

use crate::error::EngineError;
use crate::outbox::Outbox;

/// Fire-and-forget delivery of operator notifications.
///
/// `escalate` never blocks on the notification sink and never fails; delivery
/// problems are logged on the outbox thread.
#[derive(Debug)]
pub struct EscalationGateway {
    outbox: Outbox<EscalationEvent>,
    raised: AtomicU64,
}

impl EscalationGateway {
    pub fn spawn(sink: Arc<dyn Sink<EscalationEvent>>) -> Result<Self, EngineError> {
        Ok(Self {
            outbox: Outbox::spawn("escalation-outbox", sink)?,
            raised: AtomicU64::new(0),
        })
    }

    pub fn escalate(
        &self,
        unit_id: Option<UnitId>,
        robot_id: Option<RobotId>,
        reason: ReasonCode,
        message: impl Into<String>,
    ) {
        let event = EscalationEvent::new(unit_id, robot_id, reason, message);
        warn!(
            unit = ?event.unit_id,
            robot = ?event.robot_id.as_ref().map(RobotId::as_str),
            reason = %reason,
            message = %event.message,
            "escalation raised"
        );
        self.raised.fetch_add(1, Ordering::Relaxed);
        self.outbox.send(event);
    }

    /// Escalations raised since start, delivered or not.
    pub fn raised(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }

    pub fn flush(&self) {
        self.outbox.flush();
    }

    pub fn shutdown(&self) {
        self.outbox.shutdown();
    }
}
