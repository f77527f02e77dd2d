//! Capacity pool enumerator — which pools can grow, and trial provisioning.

use std::sync::Arc;

use tracing::{debug, info};

use scaleprobe_state::{CapacityPool, CapacityUnit, ClusterStore, labels, now_millis};

use crate::error::{RecommendError, RecommendResult};
use crate::trial::{TrialTag, generate_name, rename_unit};

#[derive(Clone)]
pub struct PoolEnumerator {
    store: Arc<dyn ClusterStore>,
}

impl PoolEnumerator {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    /// Pools whose live unit count is below their maximum, in declaration order.
    pub fn eligible_pools(&self, pools: &[CapacityPool]) -> RecommendResult<Vec<CapacityPool>> {
        let units = self.store.list_units()?;
        let eligible: Vec<CapacityPool> = pools
            .iter()
            .filter(|p| {
                let count = units_in_pool(&units, &p.name).count();
                debug!(pool = %p.name, count, maximum = p.maximum, "pool size");
                (count as u64) < u64::from(p.maximum)
            })
            .cloned()
            .collect();
        Ok(eligible)
    }

    /// Zone in `pool` with the fewest live units; ties go to the first
    /// declared zone.
    pub fn least_loaded_zone(&self, pool: &CapacityPool) -> RecommendResult<Option<String>> {
        let units = self.store.list_units()?;
        let zone = pool
            .zones
            .iter()
            .enumerate()
            .min_by_key(|(i, z)| {
                let count = units_in_pool(&units, &pool.name)
                    .filter(|u| u.zone() == Some(z.as_str()))
                    .count();
                (count, *i)
            })
            .map(|(_, z)| z.clone());
        Ok(zone)
    }

    /// Clone a template unit of `pool` into a new trial unit and add it.
    ///
    /// Returns `Ok(None)` when the pool is already at its maximum and
    /// `NoTemplate` when the pool has no unit to clone. A `zone` override
    /// rewrites the zone and region labels.
    pub fn provision_trial_unit(
        &self,
        pool: &CapacityPool,
        zone: Option<&str>,
        tag: &TrialTag,
    ) -> RecommendResult<Option<CapacityUnit>> {
        let units = self.store.list_units()?;
        let mut members: Vec<&CapacityUnit> = units_in_pool(&units, &pool.name).collect();
        if members.len() as u64 >= u64::from(pool.maximum) {
            debug!(pool = %pool.name, maximum = pool.maximum, "pool at maximum");
            return Ok(None);
        }

        members.sort_by(|a, b| a.name.cmp(&b.name));
        let template = members
            .into_iter()
            .find(|u| !u.is_trial())
            .ok_or_else(|| RecommendError::NoTemplate(pool.name.clone()))?;

        let mut unit = template.clone();
        rename_unit(&mut unit, generate_name(&pool.name));
        unit.labels.remove(labels::PRE_EXISTING);
        unit.taints.retain(|t| t.key != labels::TRIAL);
        unit.unschedulable = false;
        unit.created_at = now_millis();
        if let Some(zone) = zone {
            unit.labels.insert(labels::ZONE.to_string(), zone.to_string());
            if let Some(region) = region_of(zone) {
                unit.labels.insert(labels::REGION.to_string(), region.to_string());
            }
        }
        tag.apply_to_unit(&mut unit);

        self.store.add_units(std::slice::from_ref(&unit))?;
        info!(
            unit = %unit.name,
            pool = %pool.name,
            zone = unit.zone().unwrap_or_default(),
            template = %template.name,
            "trial unit provisioned"
        );
        Ok(Some(unit))
    }
}

fn units_in_pool<'a>(
    units: &'a [CapacityUnit],
    pool: &'a str,
) -> impl Iterator<Item = &'a CapacityUnit> + 'a {
    units.iter().filter(move |u| u.pool() == Some(pool))
}

/// `eu-west-1a` → `eu-west-1`. Zones without a trailing letter suffix
/// have no derivable region.
fn region_of(zone: &str) -> Option<&str> {
    let mut chars = zone.chars().rev();
    let last = chars.next()?;
    let prev = chars.next()?;
    (last.is_ascii_lowercase() && prev.is_ascii_digit()).then(|| &zone[..zone.len() - 1])
}
