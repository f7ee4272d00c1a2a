//! Demand-driven slotting analyses.
//!
//! Promotion and demotion are separate jobs so they can be scheduled (or disabled)
//! independently.

use serde::{Deserialize, Serialize};

use wareflow_core::UnitId;

use crate::job::AnalysisJob;
use crate::result::{check_threshold, AnalysisError};

/// One unit as seen by the slotting jobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitDemand {
    pub unit_id: UnitId,
    pub demand_score: f64,
    pub in_hot_zone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReslotDirection {
    /// Move into the hot zone.
    Promote,
    /// Move back to long-tail storage.
    Demote,
}

/// A recommended zone move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reslot {
    pub unit_id: UnitId,
    pub demand_score: f64,
    pub direction: ReslotDirection,
}

/// Demand thresholds live on the demand-score scale, `[0, 1]`.
pub fn check_demand_threshold(name: &'static str, value: f64) -> Result<(), AnalysisError> {
    check_threshold(name, value, 0.0..=1.0)
}

/// Promote units whose demand is strictly above `hot_threshold`.
#[derive(Debug, Clone)]
pub struct SlottingJob {
    input: Vec<UnitDemand>,
    hot_threshold: f64,
}

impl SlottingJob {
    pub fn new(input: Vec<UnitDemand>) -> Self {
        Self {
            input,
            hot_threshold: 0.85,
        }
    }

    pub fn with_hot_threshold(mut self, hot_threshold: f64) -> Self {
        self.hot_threshold = hot_threshold;
        self
    }
}

impl AnalysisJob for SlottingJob {
    type Input = Vec<UnitDemand>;
    type Output = Vec<Reslot>;

    fn name(&self) -> &'static str {
        "slotting.promote"
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<Self::Output, AnalysisError> {
        check_demand_threshold("hot_threshold", self.hot_threshold)?;

        Ok(self
            .input
            .iter()
            .filter(|u| !u.in_hot_zone && u.demand_score > self.hot_threshold)
            .map(|u| Reslot {
                unit_id: u.unit_id,
                demand_score: u.demand_score,
                direction: ReslotDirection::Promote,
            })
            .collect())
    }
}

/// Demote hot-zone units whose demand fell strictly below `demote_below`.
#[derive(Debug, Clone)]
pub struct DemandDecayJob {
    input: Vec<UnitDemand>,
    demote_below: f64,
}

impl DemandDecayJob {
    pub fn new(input: Vec<UnitDemand>, demote_below: f64) -> Self {
        Self {
            input,
            demote_below,
        }
    }
}

impl AnalysisJob for DemandDecayJob {
    type Input = Vec<UnitDemand>;
    type Output = Vec<Reslot>;

    fn name(&self) -> &'static str {
        "slotting.decay"
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<Self::Output, AnalysisError> {
        check_demand_threshold("demote_below", self.demote_below)?;

        Ok(self
            .input
            .iter()
            .filter(|u| u.in_hot_zone && u.demand_score < self.demote_below)
            .map(|u| Reslot {
                unit_id: u.unit_id,
                demand_score: u.demand_score,
                direction: ReslotDirection::Demote,
            })
            .collect())
    }
}
