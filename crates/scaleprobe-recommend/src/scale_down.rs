//! Scale-down recommender — taint-and-test, most expensive unit first.
//!
//! Units are tested strictly one after another: cordon the unit, submit
//! fresh copies of its workload, and see whether they all land elsewhere.
//! A unit whose copies all land is removed for real (originals first,
//! then the unit); otherwise the copies are deleted, the unit is
//! uncordoned, and it is reported as essential.

use std::sync::Arc;

use tracing::{debug, info};

use scaleprobe_core::{EngineSettings, PriceTable};
use scaleprobe_state::{CapacityUnit, ClusterStore, labels, now_millis};

use crate::context::RunContext;
use crate::convergence::{ConvergenceWaiter, WorkloadScope};
use crate::error::{RecommendError, RecommendResult, StopCause};
use crate::trial::{TrialGuard, relocation_copies};

pub struct ScaleDownRecommender {
    store: Arc<dyn ClusterStore>,
    waiter: ConvergenceWaiter,
    prices: Arc<PriceTable>,
    settings: EngineSettings,
}

impl ScaleDownRecommender {
    pub fn new(store: Arc<dyn ClusterStore>, prices: Arc<PriceTable>, settings: EngineSettings) -> Self {
        Self {
            waiter: ConvergenceWaiter::new(store.clone(), settings.poll_interval()),
            store,
            prices,
            settings,
        }
    }

    /// Candidates in test order: non-increasing price, input order on ties.
    pub fn order_by_cost(&self, units: &[CapacityUnit]) -> Vec<CapacityUnit> {
        let mut ordered = units.to_vec();
        ordered.sort_by(|a, b| {
            let pa = self.prices.price_of(a.machine_type().unwrap_or_default());
            let pb = self.prices.price_of(b.machine_type().unwrap_or_default());
            pb.total_cmp(&pa)
        });
        ordered
    }

    /// Names of units that can be removed, in the order they were removed.
    pub async fn run(&self, ctx: &RunContext, units: &[CapacityUnit]) -> RecommendResult<Vec<String>> {
        let mut removable = Vec::new();
        let mut essential = Vec::new();

        for unit in self.order_by_cost(units) {
            ctx.check()?;
            if unit.is_pre_existing() || unit.is_trial() {
                debug!(unit = %unit.name, "not a removal candidate");
                continue;
            }
            if self.test_unit(ctx, &unit).await? {
                removable.push(unit.name);
            } else {
                essential.push(unit.name);
            }
        }

        info!(
            removable = removable.len(),
            essential = ?essential,
            "scale-down run finished"
        );
        Ok(removable)
    }

    /// Returns whether `unit` was removed.
    async fn test_unit(&self, ctx: &RunContext, unit: &CapacityUnit) -> RecommendResult<bool> {
        let live = self.store.list_units()?;
        if !live.iter().any(|u| u.name == unit.name) {
            debug!(unit = %unit.name, "unit no longer exists, skipping");
            return Ok(false);
        }

        let assigned: Vec<_> = self
            .store
            .list_workload()?
            .into_iter()
            .filter(|w| w.node_name.as_deref() == Some(unit.name.as_str()))
            .collect();
        if assigned.is_empty() {
            self.store.delete_unit(&unit.name)?;
            info!(unit = %unit.name, "empty unit removed");
            return Ok(true);
        }

        self.store.taint_unit(&unit.name)?;
        let mut guard = TrialGuard::new(self.store.clone(), labels::RELOCATED_FROM, &unit.name)
            .untaint_on_release(&unit.name);

        let since = now_millis();
        let copies = relocation_copies(&assigned, &unit.name);
        self.store.create_workload(&copies)?;

        let scope = WorkloadScope::label(labels::RELOCATED_FROM, &unit.name);
        let failing = match self
            .waiter
            .wait_for_convergence(ctx, self.settings.scale_down_timeout(), since, &scope)
            .await
        {
            Ok(n) => n,
            Err(RecommendError::Timeout {
                cause: StopCause::WaitDeadline,
                unscheduled,
            }) => unscheduled,
            Err(e) => return Err(e),
        };

        // Copies a placer never reported on still count as unplaceable.
        let stranded = self
            .store
            .list_workload()?
            .iter()
            .filter(|w| w.has_label(labels::RELOCATED_FROM, &unit.name) && !w.is_assigned())
            .count();
        let unplaceable = failing.max(stranded);

        if unplaceable > 0 {
            guard.purge()?;
            info!(unit = %unit.name, unplaceable, "unit is essential, rolled back");
            return Ok(false);
        }

        for w in &assigned {
            self.store.delete_workload(&w.name)?;
        }
        self.store.delete_unit(&unit.name)?;
        guard.disarm();
        info!(unit = %unit.name, relocated = copies.len(), "unit removed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaleprobe_placement::{Placer, SimulatedCluster};
    use scaleprobe_state::Resources;
    use std::collections::BTreeMap;

    fn unit(name: &str, machine_type: &str) -> CapacityUnit {
        let mut unit_labels = BTreeMap::new();
        unit_labels.insert(labels::INSTANCE_TYPE.to_string(), machine_type.to_string());
        CapacityUnit {
            name: name.to_string(),
            labels: unit_labels,
            allocatable: Resources::new(4000, 8 << 30),
            capacity: Resources::new(4000, 8 << 30),
            max_workload: 110,
            taints: Vec::new(),
            unschedulable: false,
            created_at: 0,
        }
    }

    fn recommender() -> ScaleDownRecommender {
        let store = Arc::new(SimulatedCluster::in_memory(Placer::new()).unwrap());
        let prices = PriceTable::default()
            .with_price("big", 30.0)
            .with_price("small", 10.0);
        ScaleDownRecommender::new(store, Arc::new(prices), EngineSettings::default())
    }

    #[test]
    fn orders_by_descending_price_stably() {
        let r = recommender();
        let units = vec![unit("c", "small"), unit("a", "big"), unit("b", "big")];
        let names: Vec<_> = r.order_by_cost(&units).into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn unpriced_units_go_last() {
        let r = recommender();
        let units = vec![unit("x", "unknown"), unit("c", "small")];
        let names: Vec<_> = r.order_by_cost(&units).into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["c", "x"]);
    }
}
