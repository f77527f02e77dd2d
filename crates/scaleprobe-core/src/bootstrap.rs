//! Seed a fresh cluster from its descriptor.

use tracing::info;

use scaleprobe_state::ClusterStore;

use crate::config::ClusterDescriptor;
use crate::error::{ConfigError, ConfigResult};

/// Create each pool's `initial` units, spread round-robin over its zones.
///
/// Returns the names of the units created.
pub fn seed_cluster(
    store: &dyn ClusterStore,
    descriptor: &ClusterDescriptor,
) -> ConfigResult<Vec<String>> {
    let mut units = Vec::new();
    for pool in &descriptor.pools {
        for i in 0..pool.initial {
            let zone = &pool.zones[i as usize % pool.zones.len()];
            let name = format!("{}-{}-{i}", descriptor.cluster.name, pool.name);
            units.push(pool.build_unit(&name, zone, &descriptor.cluster.region)?);
        }
    }

    store
        .add_units(&units)
        .map_err(|e| ConfigError::Invalid(format!("seeding cluster: {e}")))?;

    info!(
        cluster = %descriptor.cluster.name,
        units = units.len(),
        "cluster seeded"
    );
    Ok(units.into_iter().map(|u| u.name).collect())
}
