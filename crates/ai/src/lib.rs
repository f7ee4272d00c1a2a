//! `wareflow-ai`
//!
//! **Responsibility:** analysis jobs behind the predictive-maintenance monitor and
//! the slotting optimizer.
//!
//! Jobs here are pure:
//! - They read snapshot types defined in this crate, never the live stores.
//! - They must not mutate fleet or twin state.
//! - They return findings; `wareflow-infra` decides how to apply them.

pub mod job;
pub mod maintenance;
pub mod result;
pub mod slotting;

pub use job::AnalysisJob;
pub use maintenance::{MaintenanceFinding, MaintenanceScan, MaintenanceThresholds, RiskSignal, RobotReading};
pub use result::AnalysisError;
pub use slotting::{check_demand_threshold, DemandDecayJob, Reslot, ReslotDirection, SlottingJob, UnitDemand};
