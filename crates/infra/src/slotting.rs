//! Dynamic Slotting Optimizer.

use std::sync::Arc;

use tracing::{debug, warn};

use wareflow_ai::{AnalysisError, AnalysisJob, DemandDecayJob, Reslot, ReslotDirection, SlottingJob, UnitDemand};
use wareflow_core::Entity;
use wareflow_inventory::{DigitalTwinStore, Zone};

use crate::config::{DecayPolicy, SlottingPolicy};

/// Reclassifies units between zones from their demand scores.
///
/// Zone moves are placement changes: no lifecycle transition, no history entry.
/// Archived units are never considered.
#[derive(Debug)]
pub struct SlottingOptimizer {
    twin: Arc<DigitalTwinStore>,
    slotting: SlottingPolicy,
    decay: DecayPolicy,
}

impl SlottingOptimizer {
    pub fn new(twin: Arc<DigitalTwinStore>, slotting: SlottingPolicy, decay: DecayPolicy) -> Self {
        Self {
            twin,
            slotting,
            decay,
        }
    }

    fn demand_snapshot(&self) -> Vec<UnitDemand> {
        self.twin
            .snapshot()
            .into_iter()
            .filter(|unit| !unit.is_archived())
            .map(|unit| UnitDemand {
                unit_id: *unit.id(),
                demand_score: unit.demand_score(),
                in_hot_zone: unit.zone() == Zone::HotZone,
            })
            .collect()
    }

    /// Promote every unit with demand strictly above the hot threshold. Returns the
    /// number of units moved.
    pub fn run_pass(&self) -> Result<usize, AnalysisError> {
        let job = SlottingJob::new(self.demand_snapshot()).with_hot_threshold(self.slotting.hot_threshold);
        let moves = job.run()?;
        let applied = self.apply(&moves);
        debug!(job = job.name(), units = job.input().len(), moved = applied, "slotting pass finished");
        Ok(applied)
    }

    /// Demote hot units whose demand fell below the decay threshold.
    pub fn run_decay_pass(&self) -> Result<usize, AnalysisError> {
        let job = DemandDecayJob::new(self.demand_snapshot(), self.decay.demote_below);
        let moves = job.run()?;
        let applied = self.apply(&moves);
        debug!(job = job.name(), units = job.input().len(), moved = applied, "decay pass finished");
        Ok(applied)
    }

    fn apply(&self, moves: &[Reslot]) -> usize {
        moves
            .iter()
            .filter(|m| {
                let (from, to) = match m.direction {
                    ReslotDirection::Promote => (Zone::LongTail, Zone::HotZone),
                    ReslotDirection::Demote => (Zone::HotZone, Zone::LongTail),
                };
                match self.twin.reassign_zone(m.unit_id, from, to) {
                    Ok(moved) => moved,
                    Err(e) => {
                        warn!(unit = %m.unit_id, error = %e, "reslot failed");
                        false
                    }
                }
            })
            .count()
    }
}
