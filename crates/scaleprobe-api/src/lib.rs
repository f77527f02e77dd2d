//! scaleprobe-api — REST API for scaleprobe.
//!
//! Provides axum route handlers for inspecting the cluster, submitting
//! workload and running recommendation scenarios.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/pools` | Declared pools with live unit counts |
//! | GET | `/api/v1/units` | List capacity units |
//! | GET | `/api/v1/workload` | List workload units |
//! | POST | `/api/v1/workload` | Submit workload (manifest entries) |
//! | POST | `/api/v1/scenarios/scale-up` | Run scale-up, optional `weights` |
//! | POST | `/api/v1/scenarios/scale-down` | Run scale-down, optional `units` |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::watch;

use scaleprobe_core::ClusterDescriptor;
use scaleprobe_recommend::{Recommender, RunContext};
use scaleprobe_state::ClusterStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub cluster: Arc<dyn ClusterStore>,
    pub descriptor: Arc<ClusterDescriptor>,
    pub recommender: Arc<Recommender>,
    /// Flipped to `true` on daemon shutdown; aborts running scenarios.
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl ApiState {
    pub fn new(
        cluster: Arc<dyn ClusterStore>,
        descriptor: Arc<ClusterDescriptor>,
        recommender: Arc<Recommender>,
    ) -> Self {
        Self {
            cluster,
            descriptor,
            recommender,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Context for one scenario run.
    fn run_context(&self) -> RunContext {
        let ctx = self.recommender.context();
        match &self.shutdown {
            Some(rx) => ctx.with_shutdown(rx.clone()),
            None => ctx,
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/pools", get(handlers::list_pools))
        .route("/units", get(handlers::list_units))
        .route(
            "/workload",
            get(handlers::list_workload).post(handlers::submit_workload),
        )
        .route("/scenarios/scale-up", post(handlers::scale_up))
        .route("/scenarios/scale-down", post(handlers::scale_down))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
