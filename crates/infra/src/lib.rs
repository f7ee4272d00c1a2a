//! Engine layer: dispatch, escalation, analytics, background runners and the
//! `WarehouseEngine` facade over the twin and fleet stores.

pub mod analytics;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod handling;
pub mod monitor;
pub mod outbox;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod slotting;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use analytics::{MissionRecorder, MissionTally};
pub use config::{
    DecayPolicy, DispatchConfig, EngineConfig, FaultConfig, MaintenancePolicy, RobotSelection,
    RunnerConfig, SlottingPolicy,
};
pub use dispatcher::TaskDispatcher;
pub use engine::{EngineBuilder, EngineSummary, WarehouseEngine};
pub use error::{DispatchError, EngineError};
pub use escalation::EscalationGateway;
pub use handling::{
    AssignmentTask, FaultInjector, FaultSignature, InstantPause, LatencyModel, NoFaults, Pause,
    RandomFaults, ScriptedFaults, ThreadPause, ZoneCost,
};
pub use monitor::{MonitorReport, PredictiveMaintenanceMonitor};
pub use queue::{PickJob, PickQueue};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use runner::{PeriodicRunner, RunnerHandle};
pub use slotting::SlottingOptimizer;
pub use workers::DispatchPool;
