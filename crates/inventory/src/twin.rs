//! Digital Twin Store: authoritative in-memory record of every inventory unit.
//!
//! The map itself sits behind a `RwLock` that is only write-locked to insert a new
//! unit. Each unit lives behind its own `Mutex`, so transitions on the same unit
//! serialize while transitions on different units never contend. Units are never
//! removed; `archive` hides them from the active pool and keeps the audit trail.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use wareflow_core::{DomainError, DomainResult, Entity, RobotId, UnitId};

use crate::unit::{
    validate_demand, HistoryEntry, InventoryUnit, StowRequest, UnitLocation, UnitStatus, Zone,
};

type UnitCell = Arc<Mutex<InventoryUnit>>;

#[derive(Debug, Default)]
pub struct DigitalTwinStore {
    units: RwLock<HashMap<UnitId, UnitCell>>,
}

impl DigitalTwinStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, unit_id: UnitId) -> DomainResult<UnitCell> {
        self.units
            .read()
            .get(&unit_id)
            .cloned()
            .ok_or(DomainError::UnitNotFound(unit_id))
    }

    fn cells(&self) -> Vec<UnitCell> {
        self.units.read().values().cloned().collect()
    }

    /// Stow a new unit. Fails with `DuplicateUnit` if the id is already known.
    pub fn stow(&self, request: StowRequest) -> DomainResult<UnitId> {
        request.validate()?;
        let unit_id = request.unit_id;

        let mut units = self.units.write();
        if units.contains_key(&unit_id) {
            return Err(DomainError::DuplicateUnit(unit_id));
        }
        let unit = InventoryUnit::stow(request, Utc::now());
        debug!(unit = %unit_id, sku = unit.sku(), zone = %unit.zone(), "unit stowed");
        units.insert(unit_id, Arc::new(Mutex::new(unit)));
        Ok(unit_id)
    }

    /// Snapshot of one unit.
    pub fn get(&self, unit_id: UnitId) -> DomainResult<InventoryUnit> {
        Ok(self.cell(unit_id)?.lock().clone())
    }

    /// Atomically move a unit to `next` and append one history entry.
    pub fn transition(
        &self,
        unit_id: UnitId,
        next: UnitStatus,
        robot_id: Option<&RobotId>,
    ) -> DomainResult<HistoryEntry> {
        let cell = self.cell(unit_id)?;
        let mut unit = cell.lock();
        let from = unit.status();
        let entry = unit.apply_transition(next, robot_id.cloned(), Utc::now())?;
        debug!(
            unit = %unit_id,
            from = %from,
            to = %next,
            robot = robot_id.map(|r| r.as_str()).unwrap_or("-"),
            "unit transition"
        );
        Ok(entry)
    }

    /// Move a unit to `to` only if it is still in `expected`.
    ///
    /// Zone moves are placement changes and never touch the history. Returns `false`
    /// when the unit was concurrently moved elsewhere.
    pub fn reassign_zone(&self, unit_id: UnitId, expected: Zone, to: Zone) -> DomainResult<bool> {
        let cell = self.cell(unit_id)?;
        let mut unit = cell.lock();
        if unit.zone() != expected || unit.is_archived() {
            return Ok(false);
        }
        unit.set_zone(to);
        info!(unit = %unit_id, from = %expected, to = %to, "unit reslotted");
        Ok(true)
    }

    /// Record a fresh demand signal for a unit.
    pub fn update_demand(&self, unit_id: UnitId, score: f64) -> DomainResult<()> {
        validate_demand(score)?;
        self.cell(unit_id)?.lock().set_demand(score);
        Ok(())
    }

    /// Hide a unit from the active pool without removing it.
    pub fn archive(&self, unit_id: UnitId) -> DomainResult<()> {
        let cell = self.cell(unit_id)?;
        let mut unit = cell.lock();
        if !unit.is_archived() {
            unit.mark_archived();
            info!(unit = %unit_id, status = %unit.status(), "unit archived");
        }
        Ok(())
    }

    /// Snapshot of every unit. Each unit is internally consistent; the set as a whole
    /// is not a point-in-time view.
    pub fn snapshot(&self) -> Vec<InventoryUnit> {
        self.cells().iter().map(|c| c.lock().clone()).collect()
    }

    /// Ids of active (non-archived) units currently in `status`.
    pub fn ids_with_status(&self, status: UnitStatus) -> Vec<UnitId> {
        self.cells()
            .iter()
            .filter_map(|c| {
                let unit = c.lock();
                (unit.status() == status && !unit.is_archived()).then(|| *unit.id())
            })
            .collect()
    }

    /// Every active unit of `sku`, ordered by pod then unit id.
    pub fn find_by_sku(&self, sku: &str) -> Vec<UnitLocation> {
        let mut found: Vec<_> = self
            .cells()
            .iter()
            .filter_map(|c| {
                let unit = c.lock();
                (unit.sku() == sku && !unit.is_archived()).then(|| unit.location())
            })
            .collect();
        found.sort_by(|a, b| {
            a.pod_location
                .cmp(&b.pod_location)
                .then(a.unit_id.cmp(&b.unit_id))
        });
        found
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}
