//! Assemble the cluster and engine from command-line inputs.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use scaleprobe_core::bootstrap::seed_cluster;
use scaleprobe_core::{ClusterDescriptor, PriceTable, WorkloadManifest};
use scaleprobe_placement::{Placer, SimulatedCluster};
use scaleprobe_recommend::Recommender;
use scaleprobe_state::{ClusterStore, StateStore};

use crate::ClusterArgs;

pub struct Assembly {
    pub cluster: Arc<SimulatedCluster>,
    pub descriptor: Arc<ClusterDescriptor>,
    pub recommender: Arc<Recommender>,
}

/// Open the store, seed it if empty, submit the manifest, build the engine.
pub fn assemble(args: &ClusterArgs) -> anyhow::Result<Assembly> {
    let descriptor = Arc::new(ClusterDescriptor::from_file(&args.descriptor)?);
    info!(
        cluster = %descriptor.cluster.name,
        pools = descriptor.pools.len(),
        "descriptor loaded"
    );

    let prices = match &args.prices {
        Some(path) => PriceTable::from_file(path)?,
        None => {
            warn!("no price table given, all machine types cost 0");
            PriceTable::default()
        }
    };

    let store = match &args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join("scaleprobe.redb");
            let store = StateStore::open(&path)?;
            info!(path = ?path, "state store opened");
            store
        }
        None => {
            info!("using in-memory state store");
            StateStore::open_in_memory()?
        }
    };

    let placer = Placer::new().serve_scheduler(&descriptor.engine.trial_scheduler);
    let cluster = Arc::new(SimulatedCluster::new(store, placer));

    if cluster.list_units()?.is_empty() {
        seed_cluster(cluster.as_ref(), &descriptor)?;
    } else {
        info!("existing cluster state found, skipping seed");
    }

    if let Some(path) = &args.workload {
        let existing: HashSet<String> = cluster
            .list_workload()?
            .into_iter()
            .map(|w| w.name)
            .collect();
        let fresh: Vec<_> = WorkloadManifest::from_file(path)?
            .workload_units()?
            .into_iter()
            .filter(|w| !existing.contains(&w.name))
            .collect();
        if !fresh.is_empty() {
            cluster.create_workload(&fresh)?;
        }
        info!(path = ?path, submitted = fresh.len(), "workload manifest applied");
    }

    let recommender = Arc::new(Recommender::new(
        cluster.clone(),
        descriptor.clone(),
        &descriptor.cluster.name,
        Arc::new(prices),
        descriptor.engine.clone(),
    ));

    Ok(Assembly {
        cluster,
        descriptor,
        recommender,
    })
}
