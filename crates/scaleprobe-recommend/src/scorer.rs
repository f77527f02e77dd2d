//! Outcome scorer — rates one trial from an assignment snapshot.
//!
//! ```text
//! waste       = least_waste × (allocatable − assigned_to_unit) / allocatable   (memory)
//! unscheduled = (considered − assigned_total) / considered
//! cost        = least_cost × price(pool) / Σ price(all pools)
//! cumulative  = waste + unscheduled + cost                                      (lower wins)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use scaleprobe_core::PriceTable;
use scaleprobe_state::{CapacityPool, CapacityUnit, WorkloadUnit};

use crate::error::{RecommendError, RecommendResult};

/// Caller-supplied multipliers. The unscheduled ratio is always weighted 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub least_waste: f64,
    pub least_cost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            least_waste: 1.0,
            least_cost: 1.0,
        }
    }
}

/// Score of one trial unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialOutcome {
    pub unit: String,
    /// `pool/zone` key the trial would add capacity to.
    pub pool_zone: String,
    /// Workload units assigned to the trial unit itself.
    pub assigned_to_unit: usize,
    /// Workload units assigned anywhere in the cluster.
    pub assigned_total: usize,
    pub considered: usize,
    pub waste_ratio: f64,
    pub unscheduled_ratio: f64,
    pub cost_ratio: f64,
    pub cumulative_score: f64,
}

#[derive(Clone)]
pub struct OutcomeScorer {
    prices: Arc<PriceTable>,
}

impl OutcomeScorer {
    pub fn new(prices: Arc<PriceTable>) -> Self {
        Self { prices }
    }

    /// Score `unit` against the workload considered for its trial.
    ///
    /// Fails with `ScoringMismatch` when the unit's pool label names none
    /// of `pools`.
    pub fn score(
        &self,
        weights: &ScoreWeights,
        unit: &CapacityUnit,
        workload: &[WorkloadUnit],
        pools: &[CapacityPool],
    ) -> RecommendResult<TrialOutcome> {
        let pool = unit
            .pool()
            .and_then(|name| pools.iter().find(|p| p.name == name))
            .ok_or_else(|| RecommendError::ScoringMismatch {
                unit: unit.name.clone(),
                pool: unit.pool().map(str::to_string),
            })?;

        let on_unit: Vec<&WorkloadUnit> = workload
            .iter()
            .filter(|w| w.node_name.as_deref() == Some(unit.name.as_str()))
            .collect();
        let consumed: u64 = on_unit.iter().map(|w| w.requests.memory_bytes).sum();
        let allocatable = unit.allocatable.memory_bytes;
        let waste_ratio = if allocatable == 0 {
            0.0
        } else {
            weights.least_waste * allocatable.saturating_sub(consumed) as f64 / allocatable as f64
        };

        let considered = workload.len();
        let assigned_total = workload.iter().filter(|w| w.is_assigned()).count();
        let unscheduled_ratio = if considered == 0 {
            0.0
        } else {
            (considered - assigned_total) as f64 / considered as f64
        };

        let total_price: f64 = pools
            .iter()
            .map(|p| self.prices.price_of(&p.machine_type))
            .sum();
        let cost_ratio = if total_price > 0.0 {
            weights.least_cost * self.prices.price_of(&pool.machine_type) / total_price
        } else {
            0.0
        };

        let outcome = TrialOutcome {
            unit: unit.name.clone(),
            pool_zone: unit.pool_zone_key(),
            assigned_to_unit: on_unit.len(),
            assigned_total,
            considered,
            waste_ratio,
            unscheduled_ratio,
            cost_ratio,
            cumulative_score: waste_ratio + unscheduled_ratio + cost_ratio,
        };
        debug!(
            unit = %outcome.unit,
            waste = outcome.waste_ratio,
            unscheduled = outcome.unscheduled_ratio,
            cost = outcome.cost_ratio,
            score = outcome.cumulative_score,
            "trial scored"
        );
        Ok(outcome)
    }
}

/// Lowest cumulative score among trials that absorbed any workload.
///
/// Outcomes are expected in pool declaration order; on equal scores the
/// first one wins.
pub fn select_winner(outcomes: &[TrialOutcome]) -> Option<&TrialOutcome> {
    let mut best: Option<&TrialOutcome> = None;
    for outcome in outcomes.iter().filter(|o| o.assigned_to_unit > 0) {
        match best {
            Some(b) if outcome.cumulative_score >= b.cumulative_score => {}
            _ => best = Some(outcome),
        }
    }
    best
}
