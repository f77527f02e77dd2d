//! Recommender — the entry point callers run scenarios through.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use scaleprobe_core::{EngineSettings, PriceTable};
use scaleprobe_state::{CapacityUnit, ClusterStore, DescriptorProvider};

use crate::context::{AbandonGuard, RunContext};
use crate::error::{RecommendError, RecommendResult};
use crate::scale_down::ScaleDownRecommender;
use crate::scale_up::{Recommendation, ScaleUpRecommender};
use crate::scorer::ScoreWeights;

/// Runs scale-up and scale-down scenarios against one cluster.
///
/// Runs are serialised: both kinds mutate the shared cluster state and
/// must not observe each other's trial artifacts.
pub struct Recommender {
    store: Arc<dyn ClusterStore>,
    descriptors: Arc<dyn DescriptorProvider>,
    cluster: String,
    settings: EngineSettings,
    scale_up: Arc<ScaleUpRecommender>,
    scale_down: ScaleDownRecommender,
    run_lock: Arc<Mutex<()>>,
}

impl Recommender {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        descriptors: Arc<dyn DescriptorProvider>,
        cluster: &str,
        prices: Arc<PriceTable>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            scale_up: Arc::new(ScaleUpRecommender::new(
                store.clone(),
                prices.clone(),
                settings.clone(),
            )),
            scale_down: ScaleDownRecommender::new(store.clone(), prices, settings.clone()),
            store,
            descriptors,
            cluster: cluster.to_string(),
            settings,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// A fresh context bounded by the configured run timeout.
    pub fn context(&self) -> RunContext {
        RunContext::with_timeout(self.settings.run_timeout())
    }

    /// Recommend units to add until unplaced workload fits.
    ///
    /// The run executes on its own task so blocking trial provisioning and
    /// the cleanup after it always complete. Dropping the returned future
    /// cancels the run at its next suspension point.
    pub async fn run_scale_up(
        &self,
        ctx: &RunContext,
        weights: &ScoreWeights,
    ) -> RecommendResult<Recommendation> {
        if ![weights.least_waste, weights.least_cost]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
        {
            return Err(RecommendError::InvalidInput(format!(
                "weights must be finite and non-negative, got {weights:?}"
            )));
        }

        let run = self.run_lock.clone().lock_owned().await;
        let pools = self.descriptors.pools(&self.cluster)?;
        info!(cluster = %self.cluster, ?weights, "running scale-up");

        let (_abandon, abandoned) = AbandonGuard::new();
        let ctx = ctx.clone().with_abandon(abandoned);
        let scale_up = self.scale_up.clone();
        let weights = *weights;
        let task = tokio::spawn(async move {
            let _run = run;
            let result = scale_up.run(&ctx, &weights, &pools).await;
            if let Err(e) = &result {
                warn!(error = %e, "scale-up run ended with an error");
            }
            result
        });
        task.await
            .map_err(|e| RecommendError::Task(e.to_string()))?
    }

    /// Test `units` for removal; `None` tests every unit in the cluster.
    pub async fn run_scale_down(
        &self,
        ctx: &RunContext,
        units: Option<&[CapacityUnit]>,
    ) -> RecommendResult<Vec<String>> {
        let _run = self.run_lock.lock().await;
        let units = match units {
            Some(units) => units.to_vec(),
            None => self.store.list_units()?,
        };
        info!(cluster = %self.cluster, candidates = units.len(), "running scale-down");
        self.scale_down.run(ctx, &units).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaleprobe_core::ClusterDescriptor;
    use scaleprobe_placement::{Placer, SimulatedCluster};

    fn recommender() -> Recommender {
        let descriptor = ClusterDescriptor::from_toml_str("[cluster]\nname = \"demo\"\n").unwrap();
        Recommender::new(
            Arc::new(SimulatedCluster::in_memory(Placer::new()).unwrap()),
            Arc::new(descriptor),
            "demo",
            Arc::new(PriceTable::default()),
            EngineSettings::default(),
        )
    }

    #[tokio::test]
    async fn rejects_negative_weights() {
        let r = recommender();
        let weights = ScoreWeights {
            least_waste: -1.0,
            least_cost: 1.0,
        };
        let err = r.run_scale_up(&r.context(), &weights).await.unwrap_err();
        assert!(matches!(err, RecommendError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn empty_cluster_needs_nothing() {
        let r = recommender();
        let rec = r
            .run_scale_up(&r.context(), &ScoreWeights::default())
            .await
            .unwrap();
        assert!(rec.additions.is_empty());
        assert!(r.run_scale_down(&r.context(), None).await.unwrap().is_empty());
    }
}
