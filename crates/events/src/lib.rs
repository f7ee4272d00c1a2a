//! Outbound payloads and the sinks that carry them out of the engine.
//!
//! - `escalation`: operator notifications (notification sink).
//! - `mission`: one record per dispatch outcome (analytics sink).
//! - `sink`: delivery abstraction plus in-memory, JSON-lines and tracing sinks.

pub mod escalation;
pub mod mission;
pub mod sink;

pub use escalation::{EscalationEvent, ReasonCode};
pub use mission::{MissionRecord, MissionStatus};
pub use sink::{JsonLinesSink, RecordingSink, Sink, SinkError, TracingSink};
