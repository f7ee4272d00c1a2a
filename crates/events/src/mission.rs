use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{MissionId, RobotId, UnitId};

use crate::escalation::ReasonCode;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Completed,
    /// Jammed; the unit went to EXCEPTION.
    Failed,
    /// Cut short by the handling timeout.
    Interrupted,
}

/// Analytics record for one dispatch outcome.
///
/// `partition_day` is the UTC day of `start_ts`; downstream tables partition on it
/// and cluster on `(robot_id, status)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionRecord {
    pub mission_id: MissionId,
    pub robot_id: RobotId,
    pub unit_id: UnitId,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub status: MissionStatus,
    pub error_code: Option<ReasonCode>,
    pub distance_meters: f64,
    pub battery_level_start: f64,
    pub battery_level_end: f64,
    pub partition_day: NaiveDate,
}

impl MissionRecord {
    pub fn duration_secs(&self) -> f64 {
        (self.end_ts - self.start_ts).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn cluster_key(&self) -> (&RobotId, MissionStatus) {
        (&self.robot_id, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_never_negative() {
        let now = Utc::now();
        let record = MissionRecord {
            mission_id: MissionId::new(),
            robot_id: RobotId::serial("PICK", 0),
            unit_id: UnitId::new(),
            start_ts: now,
            end_ts: now - chrono::Duration::seconds(1),
            status: MissionStatus::Completed,
            error_code: None,
            distance_meters: 15.0,
            battery_level_start: 90.0,
            battery_level_end: 89.7,
            partition_day: now.date_naive(),
        };
        assert_eq!(record.duration_secs(), 0.0);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "COMPLETED");
        assert!(json["errorCode"].is_null());
        assert!(json.get("partitionDay").is_some());
    }
}
