//! Fleet domain module: robot records, health status and the registry that
//! hands robots out to dispatch workers.

pub mod init;
pub mod registry;
pub mod robot;

pub use init::{initialize_fleet, FixedTelemetry, FleetInit, RandomTelemetry, TelemetryGenerator};
pub use registry::{FleetRegistry, ReleaseOutcome};
pub use robot::{Lease, RobotRecord, RobotStatus, RobotType, Telemetry};
