use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wareflow_core::{DomainError, DomainResult, Entity, RobotId, UnitId};

/// Storage zone of a unit. A placement attribute, independent of lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    /// Default chaotic storage far from the exit tunnels.
    LongTail,
    /// Reserved for high-demand units, close to the pick stations.
    HotZone,
}

impl Zone {
    pub fn as_str(self) -> &'static str {
        match self {
            Zone::LongTail => "LONG_TAIL",
            Zone::HotZone => "HOT_ZONE",
        }
    }
}

impl core::fmt::Display for Zone {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an inventory unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Stowed,
    PendingPick,
    InTransit,
    Picked,
    Exception,
}

/// Every legal `(from, to)` lifecycle move. Anything not listed is rejected.
const LEGAL_TRANSITIONS: &[(UnitStatus, UnitStatus)] = &[
    (UnitStatus::Stowed, UnitStatus::PendingPick),
    (UnitStatus::PendingPick, UnitStatus::InTransit),
    (UnitStatus::InTransit, UnitStatus::Picked),
    (UnitStatus::Stowed, UnitStatus::Exception),
    (UnitStatus::PendingPick, UnitStatus::Exception),
    (UnitStatus::InTransit, UnitStatus::Exception),
    (UnitStatus::Picked, UnitStatus::Exception),
];

impl UnitStatus {
    pub const ALL: [UnitStatus; 5] = [
        UnitStatus::Stowed,
        UnitStatus::PendingPick,
        UnitStatus::InTransit,
        UnitStatus::Picked,
        UnitStatus::Exception,
    ];

    pub fn can_transition_to(self, next: UnitStatus) -> bool {
        LEGAL_TRANSITIONS.contains(&(self, next))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Stowed => "STOWED",
            UnitStatus::PendingPick => "PENDING_PICK",
            UnitStatus::InTransit => "IN_TRANSIT",
            UnitStatus::Picked => "PICKED",
            UnitStatus::Exception => "EXCEPTION",
        }
    }
}

impl core::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a unit's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub status: UnitStatus,
    /// Weak reference to the robot that acted; `None` for operator-issued changes.
    pub robot_id: Option<RobotId>,
}

/// Inbound stow request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StowRequest {
    pub unit_id: UnitId,
    pub sku: String,
    pub pod_location: String,
    pub zone: Zone,
    pub demand_score: f64,
    pub weight_grams: u32,
    pub stowed_by: Option<RobotId>,
}

impl StowRequest {
    pub fn new(sku: impl Into<String>, pod_location: impl Into<String>) -> Self {
        Self {
            unit_id: UnitId::new(),
            sku: sku.into(),
            pod_location: pod_location.into(),
            zone: Zone::LongTail,
            demand_score: 0.0,
            weight_grams: 0,
            stowed_by: None,
        }
    }

    pub fn with_unit_id(mut self, unit_id: UnitId) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_demand(mut self, demand_score: f64) -> Self {
        self.demand_score = demand_score;
        self
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zone = zone;
        self
    }

    pub fn with_weight(mut self, weight_grams: u32) -> Self {
        self.weight_grams = weight_grams;
        self
    }

    pub fn stowed_by(mut self, robot_id: RobotId) -> Self {
        self.stowed_by = Some(robot_id);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if self.pod_location.trim().is_empty() {
            return Err(DomainError::validation("pod location cannot be empty"));
        }
        validate_demand(self.demand_score)
    }
}

pub(crate) fn validate_demand(score: f64) -> DomainResult<()> {
    if !(0.0..=1.0).contains(&score) {
        return Err(DomainError::validation(format!(
            "demand score must be within [0, 1], got {score}"
        )));
    }
    Ok(())
}

/// Where a unit physically sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitLocation {
    pub unit_id: UnitId,
    pub pod_location: String,
    pub zone: Zone,
}

/// Digital twin of one physical inventory unit.
///
/// Fields are read-only outside this crate; all mutation goes through
/// [`crate::DigitalTwinStore`], which holds the per-unit lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryUnit {
    id: UnitId,
    sku: String,
    pod_location: String,
    zone: Zone,
    demand_score: f64,
    status: UnitStatus,
    weight_grams: u32,
    archived: bool,
    history: Vec<HistoryEntry>,
}

impl InventoryUnit {
    /// Materialize a stowed unit. The stow itself is the first history entry.
    pub(crate) fn stow(request: StowRequest, at: DateTime<Utc>) -> Self {
        Self {
            id: request.unit_id,
            sku: request.sku,
            pod_location: request.pod_location,
            zone: request.zone,
            demand_score: request.demand_score,
            status: UnitStatus::Stowed,
            weight_grams: request.weight_grams,
            archived: false,
            history: vec![HistoryEntry {
                at,
                status: UnitStatus::Stowed,
                robot_id: request.stowed_by,
            }],
        }
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn pod_location(&self) -> &str {
        &self.pod_location
    }

    pub fn zone(&self) -> Zone {
        self.zone
    }

    pub fn demand_score(&self) -> f64 {
        self.demand_score
    }

    pub fn status(&self) -> UnitStatus {
        self.status
    }

    pub fn weight_grams(&self) -> u32 {
        self.weight_grams
    }

    pub fn is_archived(&self) -> bool {
        self.archived
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Robot recorded on the most recent history entry, if any.
    pub fn last_robot(&self) -> Option<&RobotId> {
        self.history.last().and_then(|e| e.robot_id.as_ref())
    }

    /// Apply a lifecycle transition and append exactly one history entry.
    ///
    /// Timestamps never go backwards within one unit's history, even if the wall clock does.
    pub(crate) fn apply_transition(
        &mut self,
        next: UnitStatus,
        robot_id: Option<RobotId>,
        now: DateTime<Utc>,
    ) -> DomainResult<HistoryEntry> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                unit: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }

        let at = match self.history.last() {
            Some(last) if last.at > now => last.at,
            _ => now,
        };
        let entry = HistoryEntry {
            at,
            status: next,
            robot_id,
        };
        self.status = next;
        self.history.push(entry.clone());
        Ok(entry)
    }

    pub(crate) fn set_zone(&mut self, zone: Zone) {
        self.zone = zone;
    }

    pub(crate) fn set_demand(&mut self, score: f64) {
        self.demand_score = score;
    }

    pub(crate) fn mark_archived(&mut self) {
        self.archived = true;
    }
}

impl InventoryUnit {
    pub fn location(&self) -> UnitLocation {
        UnitLocation {
            unit_id: self.id,
            pod_location: self.pod_location.clone(),
            zone: self.zone,
        }
    }
}

impl Entity for InventoryUnit {
    type Id = UnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
