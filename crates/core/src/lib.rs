//! `wareflow-core`: shared building blocks for the warehouse engine.
//!
//! This crate contains **pure domain** primitives (no threads, no IO).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{MissionId, RobotId, UnitId};
