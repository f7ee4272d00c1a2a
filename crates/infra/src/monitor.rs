//! Predictive Maintenance Monitor.
//!
//! Each pass snapshots fleet telemetry, runs the maintenance scan and pulls at-risk
//! robots out of the eligible pool. It also reclaims robots whose claim lease expired.
//! The monitor never returns a robot to service; that takes `mark_serviced`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use wareflow_ai::{AnalysisError, AnalysisJob, MaintenanceScan, MaintenanceThresholds, RiskSignal, RobotReading};
use wareflow_core::{Entity, RobotId};
use wareflow_events::ReasonCode;
use wareflow_fleet::{FleetRegistry, RobotStatus};

use crate::escalation::EscalationGateway;

/// What one monitor pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    /// Newly flagged for maintenance (each escalated once).
    pub flagged: Vec<RobotId>,
    /// Returned to HEALTHY after their lease expired.
    pub reclaimed: Vec<RobotId>,
}

#[derive(Debug)]
pub struct PredictiveMaintenanceMonitor {
    fleet: Arc<FleetRegistry>,
    gateway: Arc<EscalationGateway>,
    thresholds: MaintenanceThresholds,
}

impl PredictiveMaintenanceMonitor {
    pub fn new(
        fleet: Arc<FleetRegistry>,
        gateway: Arc<EscalationGateway>,
        thresholds: MaintenanceThresholds,
    ) -> Self {
        Self {
            fleet,
            gateway,
            thresholds,
        }
    }

    /// Full pass: telemetry scan, then lease reaping.
    pub fn run_pass(&self) -> Result<MonitorReport, AnalysisError> {
        let flagged = self.scan()?;
        let reclaimed = self.reap_leases();
        Ok(MonitorReport { flagged, reclaimed })
    }

    /// Flag every robot whose telemetry crosses a threshold.
    ///
    /// A robot already in MAINTENANCE_REQUIRED (or OFFLINE) is skipped, so re-running
    /// the scan never escalates twice.
    pub fn scan(&self) -> Result<Vec<RobotId>, AnalysisError> {
        let readings = self
            .fleet
            .snapshot()
            .into_iter()
            .map(|robot| RobotReading {
                robot_id: robot.id().clone(),
                motor_temp_c: robot.telemetry().motor_temp_c,
                vibration_index: robot.telemetry().vibration_index,
                excluded: matches!(
                    robot.status(),
                    RobotStatus::MaintenanceRequired | RobotStatus::Offline
                ),
            })
            .collect();

        let scan = MaintenanceScan::new(readings).with_thresholds(self.thresholds);
        let findings = scan.run()?;
        debug!(job = scan.name(), robots = scan.input().len(), findings = findings.len(), "scan finished");

        let mut flagged = Vec::new();
        for finding in findings {
            let reason = match finding.primary() {
                Some(RiskSignal::Thermal { .. }) => ReasonCode::Thermal,
                Some(RiskSignal::Vibration { .. }) => ReasonCode::Vibration,
                None => continue,
            };
            match self.fleet.flag_for_maintenance(&finding.robot_id) {
                Ok(true) => {
                    self.gateway.escalate(
                        None,
                        Some(finding.robot_id.clone()),
                        reason,
                        finding.describe(),
                    );
                    flagged.push(finding.robot_id);
                }
                // Flagged concurrently (e.g. by a hardware jam); already escalated.
                Ok(false) => {}
                Err(e) => warn!(robot = %finding.robot_id, error = %e, "could not flag robot"),
            }
        }
        Ok(flagged)
    }

    /// Return robots stuck BUSY past their lease to HEALTHY, escalating each.
    pub fn reap_leases(&self) -> Vec<RobotId> {
        self.fleet
            .reap_expired_leases(Utc::now())
            .into_iter()
            .map(|(robot_id, lease)| {
                self.gateway.escalate(
                    None,
                    Some(robot_id.clone()),
                    ReasonCode::LeaseExpired,
                    format!(
                        "mission {} held the robot past {}; robot reclaimed",
                        lease.mission_id, lease.expires_at
                    ),
                );
                robot_id
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use wareflow_core::MissionId;
    use wareflow_events::{EscalationEvent, RecordingSink};
    use wareflow_fleet::{RobotRecord, RobotType, Telemetry};

    fn setup(telemetry: &[Telemetry]) -> (Arc<FleetRegistry>, PredictiveMaintenanceMonitor, Arc<EscalationGateway>, Arc<RecordingSink<EscalationEvent>>) {
        let fleet = Arc::new(FleetRegistry::new());
        for (i, t) in telemetry.iter().enumerate() {
            fleet
                .register(RobotRecord::new(RobotId::serial("MOVE", i), RobotType::Move, *t))
                .unwrap();
        }
        let sink = Arc::new(RecordingSink::<EscalationEvent>::new());
        let gateway = Arc::new(EscalationGateway::spawn(sink.clone()).unwrap());
        let monitor = PredictiveMaintenanceMonitor::new(
            Arc::clone(&fleet),
            Arc::clone(&gateway),
            MaintenanceThresholds::default(),
        );
        (fleet, monitor, gateway, sink)
    }

    #[test]
    fn vibration_alone_flags_the_robot() {
        let (fleet, monitor, gateway, sink) =
            setup(&[Telemetry::new(40.0, 0.85), Telemetry::new(40.0, 0.3)]);

        let report = monitor.run_pass().unwrap();
        gateway.flush();

        assert_eq!(report.flagged, vec![RobotId::serial("MOVE", 0)]);
        assert_eq!(
            fleet.get(&RobotId::serial("MOVE", 1)).unwrap().status(),
            RobotStatus::Healthy
        );
        assert_eq!(sink.all()[0].reason_code, ReasonCode::Vibration);
        assert_eq!(sink.all()[0].unit_id, None);
    }

    #[test]
    fn busy_robot_is_flagged_mid_mission() {
        let (fleet, monitor, _gateway, _sink) = setup(&[Telemetry::new(90.0, 0.2)]);
        let id = RobotId::serial("MOVE", 0);
        fleet
            .claim(&id, MissionId::new(), Duration::from_secs(30))
            .unwrap()
            .unwrap();

        assert_eq!(monitor.scan().unwrap(), vec![id.clone()]);
        assert_eq!(fleet.get(&id).unwrap().status(), RobotStatus::MaintenanceRequired);
    }

    #[test]
    fn expired_leases_escalate_once() {
        let (fleet, monitor, gateway, sink) = setup(&[Telemetry::new(35.0, 0.2)]);
        let id = RobotId::serial("MOVE", 0);
        fleet.claim(&id, MissionId::new(), Duration::ZERO).unwrap().unwrap();

        assert_eq!(monitor.run_pass().unwrap().reclaimed, vec![id.clone()]);
        assert!(monitor.run_pass().unwrap().reclaimed.is_empty());
        gateway.flush();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.all()[0].reason_code, ReasonCode::LeaseExpired);
        assert_eq!(fleet.get(&id).unwrap().status(), RobotStatus::Healthy);
    }
}
