use serde::{Deserialize, Serialize};

use wareflow_core::RobotId;

use crate::job::AnalysisJob;
use crate::result::{check_threshold, AnalysisError};

/// Failure-risk thresholds. Both comparisons are strict (`>`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceThresholds {
    pub max_motor_temp_c: f64,
    pub max_vibration_index: f64,
}

impl Default for MaintenanceThresholds {
    fn default() -> Self {
        Self {
            max_motor_temp_c: 75.0,
            max_vibration_index: 0.8,
        }
    }
}

impl MaintenanceThresholds {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        check_threshold("max_motor_temp_c", self.max_motor_temp_c, -50.0..=200.0)?;
        check_threshold("max_vibration_index", self.max_vibration_index, 0.0..=1.0)
    }
}

/// One robot as seen by the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotReading {
    pub robot_id: RobotId,
    pub motor_temp_c: f64,
    pub vibration_index: f64,
    /// Already flagged or retired: never reported again.
    pub excluded: bool,
}

/// Why a robot is considered at risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RiskSignal {
    Thermal { motor_temp_c: f64, limit: f64 },
    Vibration { vibration_index: f64, limit: f64 },
}

impl RiskSignal {
    pub fn describe(&self) -> String {
        match self {
            RiskSignal::Thermal { motor_temp_c, limit } => {
                format!("motor temperature {motor_temp_c:.1}C above {limit:.1}C")
            }
            RiskSignal::Vibration {
                vibration_index,
                limit,
            } => format!("vibration index {vibration_index:.2} above {limit:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceFinding {
    pub robot_id: RobotId,
    /// Non-empty; thermal is listed first when both trip.
    pub signals: Vec<RiskSignal>,
}

impl MaintenanceFinding {
    /// The signal used as the escalation reason.
    pub fn primary(&self) -> Option<&RiskSignal> {
        self.signals.first()
    }

    pub fn describe(&self) -> String {
        self.signals
            .iter()
            .map(RiskSignal::describe)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Scans fleet telemetry for hardware failure signatures.
#[derive(Debug, Clone)]
pub struct MaintenanceScan {
    input: Vec<RobotReading>,
    thresholds: MaintenanceThresholds,
}

impl MaintenanceScan {
    pub fn new(input: Vec<RobotReading>) -> Self {
        Self {
            input,
            thresholds: MaintenanceThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: MaintenanceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

impl AnalysisJob for MaintenanceScan {
    type Input = Vec<RobotReading>;
    type Output = Vec<MaintenanceFinding>;

    fn name(&self) -> &'static str {
        "pdm.scan"
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<Self::Output, AnalysisError> {
        self.thresholds.validate()?;

        let findings = self
            .input
            .iter()
            .filter(|r| !r.excluded)
            .filter_map(|r| {
                let signals = evaluate(r, &self.thresholds);
                (!signals.is_empty()).then(|| MaintenanceFinding {
                    robot_id: r.robot_id.clone(),
                    signals,
                })
            })
            .collect();
        Ok(findings)
    }
}

fn evaluate(reading: &RobotReading, thresholds: &MaintenanceThresholds) -> Vec<RiskSignal> {
    let mut signals = Vec::new();
    if reading.motor_temp_c > thresholds.max_motor_temp_c {
        signals.push(RiskSignal::Thermal {
            motor_temp_c: reading.motor_temp_c,
            limit: thresholds.max_motor_temp_c,
        });
    }
    if reading.vibration_index > thresholds.max_vibration_index {
        signals.push(RiskSignal::Vibration {
            vibration_index: reading.vibration_index,
            limit: thresholds.max_vibration_index,
        });
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(index: usize, temp: f64, vibration: f64) -> RobotReading {
        RobotReading {
            robot_id: RobotId::serial("PICK", index),
            motor_temp_c: temp,
            vibration_index: vibration,
            excluded: false,
        }
    }

    #[test]
    fn flags_thermal_and_vibration_separately() {
        let scan = MaintenanceScan::new(vec![
            reading(0, 35.0, 0.2),
            reading(1, 80.0, 0.2),
            reading(2, 35.0, 0.9),
        ]);

        let findings = scan.run().unwrap();

        assert_eq!(findings.len(), 2);
        assert!(matches!(findings[0].primary(), Some(RiskSignal::Thermal { .. })));
        assert!(matches!(findings[1].primary(), Some(RiskSignal::Vibration { .. })));
    }

    #[test]
    fn thresholds_are_exclusive() {
        let findings = MaintenanceScan::new(vec![reading(0, 75.0, 0.8)]).run().unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn thermal_wins_when_both_trip() {
        let findings = MaintenanceScan::new(vec![reading(0, 90.0, 0.95)]).run().unwrap();

        assert_eq!(findings[0].signals.len(), 2);
        assert!(matches!(findings[0].primary(), Some(RiskSignal::Thermal { .. })));
        assert!(findings[0].describe().contains("vibration"));
    }

    #[test]
    fn excluded_robots_are_never_reported() {
        let mut flagged = reading(0, 99.0, 0.99);
        flagged.excluded = true;
        assert!(MaintenanceScan::new(vec![flagged]).run().unwrap().is_empty());
    }

    #[test]
    fn rejects_nonsense_thresholds() {
        let scan = MaintenanceScan::new(vec![]).with_thresholds(MaintenanceThresholds {
            max_motor_temp_c: f64::NAN,
            max_vibration_index: 0.8,
        });
        assert!(matches!(scan.run(), Err(AnalysisError::InvalidThreshold { .. })));
    }
}
