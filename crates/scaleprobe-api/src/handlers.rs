//! REST API handlers.
//!
//! Each handler reads or mutates the cluster through the `ClusterStore`
//! capability, or runs a scenario through the `Recommender`, and returns
//! JSON in the `{success, data, error}` envelope.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scaleprobe_core::WorkloadManifest;
use scaleprobe_recommend::{RecommendError, ScoreWeights};
use scaleprobe_state::StateError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn state_error(e: &StateError) -> Response {
    let status = match e {
        StateError::AlreadyExists(_) => StatusCode::CONFLICT,
        StateError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

fn recommend_error(e: &RecommendError) -> Response {
    let status = match e {
        RecommendError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

/// Decode an optional JSON body; an empty body yields the default.
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| error_response(&format!("invalid request body: {e}"), StatusCode::BAD_REQUEST))
}

// ── Cluster ────────────────────────────────────────────────────

/// A declared pool with its live size.
#[derive(Debug, Serialize)]
pub struct PoolStatus {
    pub name: String,
    pub machine_type: String,
    pub zones: Vec<String>,
    pub maximum: u32,
    pub units: usize,
}

/// GET /api/v1/pools
pub async fn list_pools(State(state): State<ApiState>) -> Response {
    let units = match state.cluster.list_units() {
        Ok(units) => units,
        Err(e) => return state_error(&e),
    };
    let pools: Vec<PoolStatus> = state
        .descriptor
        .capacity_pools()
        .into_iter()
        .map(|p| PoolStatus {
            units: units.iter().filter(|u| u.pool() == Some(p.name.as_str())).count(),
            name: p.name,
            machine_type: p.machine_type,
            zones: p.zones,
            maximum: p.maximum,
        })
        .collect();
    ApiResponse::ok(pools).into_response()
}

/// GET /api/v1/units
pub async fn list_units(State(state): State<ApiState>) -> Response {
    match state.cluster.list_units() {
        Ok(units) => ApiResponse::ok(units).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/workload
pub async fn list_workload(State(state): State<ApiState>) -> Response {
    match state.cluster.list_workload() {
        Ok(workload) => ApiResponse::ok(workload).into_response(),
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/workload
///
/// Body: `{"workload": [{"name": "web", "replicas": 3, "cpu": "500m", "memory": "1Gi"}]}`.
pub async fn submit_workload(State(state): State<ApiState>, body: Bytes) -> Response {
    let manifest: WorkloadManifest = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            return error_response(&format!("invalid request body: {e}"), StatusCode::BAD_REQUEST);
        }
    };
    let workload = match manifest.workload_units() {
        Ok(w) => w,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    };

    match state.cluster.create_workload(&workload) {
        Ok(()) => {
            let names: Vec<String> = workload.into_iter().map(|w| w.name).collect();
            info!(count = names.len(), "workload submitted");
            (StatusCode::CREATED, ApiResponse::ok(names)).into_response()
        }
        Err(e) => state_error(&e),
    }
}

// ── Scenarios ──────────────────────────────────────────────────

/// Scale-up request body.
#[derive(Debug, Default, Deserialize)]
pub struct ScaleUpRequest {
    #[serde(default)]
    pub weights: ScoreWeights,
}

/// POST /api/v1/scenarios/scale-up
pub async fn scale_up(State(state): State<ApiState>, body: Bytes) -> Response {
    let req: ScaleUpRequest = match optional_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let ctx = state.run_context();
    match state.recommender.run_scale_up(&ctx, &req.weights).await {
        Ok(rec) => ApiResponse::ok(rec).into_response(),
        Err(e) => {
            warn!(error = %e, "scale-up scenario failed");
            recommend_error(&e)
        }
    }
}

/// Scale-down request body. Without `units`, every unit is a candidate.
#[derive(Debug, Default, Deserialize)]
pub struct ScaleDownRequest {
    #[serde(default)]
    pub units: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ScaleDownResponse {
    pub removable: Vec<String>,
}

/// POST /api/v1/scenarios/scale-down
pub async fn scale_down(State(state): State<ApiState>, body: Bytes) -> Response {
    let req: ScaleDownRequest = match optional_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let selected = match &req.units {
        None => None,
        Some(names) => {
            let live = match state.cluster.list_units() {
                Ok(units) => units,
                Err(e) => return state_error(&e),
            };
            let mut selected = Vec::with_capacity(names.len());
            for name in names {
                match live.iter().find(|u| &u.name == name) {
                    Some(unit) => selected.push(unit.clone()),
                    None => {
                        return error_response(
                            &format!("unit {name} not found"),
                            StatusCode::NOT_FOUND,
                        );
                    }
                }
            }
            Some(selected)
        }
    };

    let ctx = state.run_context();
    match state
        .recommender
        .run_scale_down(&ctx, selected.as_deref())
        .await
    {
        Ok(removable) => ApiResponse::ok(ScaleDownResponse { removable }).into_response(),
        Err(e) => {
            warn!(error = %e, "scale-down scenario failed");
            recommend_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use scaleprobe_core::bootstrap::seed_cluster;
    use scaleprobe_core::{ClusterDescriptor, PriceTable};
    use scaleprobe_placement::{Placer, SimulatedCluster};
    use scaleprobe_recommend::Recommender;

    const DESCRIPTOR: &str = r#"
[cluster]
name = "demo"

[engine]
poll_interval_ms = 5
scale_down_timeout_ms = 30

[[pools]]
name = "general"
machine_type = "m5.large"
zones = ["z1"]
maximum = 3
initial = 1

[pools.allocatable]
cpu = "2"
memory = "8Gi"
"#;

    fn test_state() -> ApiState {
        let descriptor = Arc::new(ClusterDescriptor::from_toml_str(DESCRIPTOR).unwrap());
        let cluster = Arc::new(SimulatedCluster::in_memory(Placer::new()).unwrap());
        seed_cluster(cluster.as_ref(), &descriptor).unwrap();
        let recommender = Arc::new(Recommender::new(
            cluster.clone(),
            descriptor.clone(),
            "demo",
            Arc::new(PriceTable::default()),
            descriptor.engine.clone(),
        ));
        ApiState::new(cluster, descriptor, recommender)
    }

    fn workload_body(name: &str) -> Bytes {
        Bytes::from(format!(
            r#"{{"workload": [{{"name": "{name}", "replicas": 2, "cpu": "100m", "memory": "1Gi"}}]}}"#
        ))
    }

    #[tokio::test]
    async fn list_pools_reports_live_counts() {
        let resp = list_pools(State(test_state())).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn submit_workload_created() {
        let state = test_state();
        let resp = submit_workload(State(state.clone()), workload_body("web")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(state.cluster.list_workload().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_workload_conflicts() {
        let state = test_state();
        submit_workload(State(state.clone()), workload_body("web")).await;
        let resp = submit_workload(State(state), workload_body("web")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_workload_is_bad_request() {
        let resp = submit_workload(State(test_state()), Bytes::from_static(b"{nope")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let bad_quantity = Bytes::from_static(
            br#"{"workload": [{"name": "x", "cpu": "lots", "memory": "1Gi"}]}"#,
        );
        let resp = submit_workload(State(test_state()), bad_quantity).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scale_up_with_empty_body_uses_defaults() {
        let resp = scale_up(State(test_state()), Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn scale_up_rejects_negative_weights() {
        let body = Bytes::from_static(br#"{"weights": {"least_waste": -2.0}}"#);
        let resp = scale_up(State(test_state()), body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scale_down_unknown_unit_not_found() {
        let body = Bytes::from_static(br#"{"units": ["ghost"]}"#);
        let resp = scale_down(State(test_state()), body).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scale_down_named_unit() {
        let state = test_state();
        let body = Bytes::from_static(br#"{"units": ["demo-general-0"]}"#);
        let resp = scale_down(State(state.clone()), body).await;
        assert_eq!(resp.status(), StatusCode::OK);
        // Empty, not pre-existing: removed.
        assert!(state.cluster.list_units().unwrap().is_empty());
    }
}
