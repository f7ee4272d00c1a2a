//! Mission analytics: one record per dispatch outcome, shipped off-thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use wareflow_events::{MissionRecord, MissionStatus, Sink};

use crate::error::EngineError;
use crate::outbox::Outbox;

/// Outcome counts since the recorder started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MissionTally {
    pub completed: u64,
    pub failed: u64,
    pub interrupted: u64,
}

impl MissionTally {
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.interrupted
    }
}

#[derive(Debug)]
pub struct MissionRecorder {
    outbox: Outbox<MissionRecord>,
    completed: AtomicU64,
    failed: AtomicU64,
    interrupted: AtomicU64,
}

impl MissionRecorder {
    pub fn spawn(sink: Arc<dyn Sink<MissionRecord>>) -> Result<Self, EngineError> {
        Ok(Self {
            outbox: Outbox::spawn("analytics-outbox", sink)?,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
        })
    }

    pub fn record(&self, record: MissionRecord) {
        let counter = match record.status {
            MissionStatus::Completed => &self.completed,
            MissionStatus::Failed => &self.failed,
            MissionStatus::Interrupted => &self.interrupted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        debug!(
            mission = %record.mission_id,
            robot = %record.robot_id,
            unit = %record.unit_id,
            status = ?record.status,
            "mission recorded"
        );
        self.outbox.send(record);
    }

    pub fn tally(&self) -> MissionTally {
        MissionTally {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            interrupted: self.interrupted.load(Ordering::Relaxed),
        }
    }

    pub fn flush(&self) {
        self.outbox.flush();
    }

    pub fn shutdown(&self) {
        self.outbox.shutdown();
    }
}
