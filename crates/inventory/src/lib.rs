//! Inventory domain module: the digital twin of every stowed unit.
//!
//! `unit` holds the lifecycle model and its transition table; `twin` is the
//! authoritative in-memory store with per-unit locking.

pub mod twin;
pub mod unit;

pub use twin::DigitalTwinStore;
pub use unit::{HistoryEntry, InventoryUnit, StowRequest, UnitLocation, UnitStatus, Zone};
