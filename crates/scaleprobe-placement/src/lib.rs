//! scaleprobe-placement — a simulated placement engine.
//!
//! The recommendation engine treats placement as an external
//! collaborator and only observes its effects through the cluster state
//! store. This crate is that collaborator for local runs and tests: it
//! assigns pending workload to capacity units and records a
//! placement-failure event for anything it cannot place.
//!
//! # Components
//!
//! - **`scorer`** — Unit feasibility and scoring (bin-packing, balance)
//! - **`placer`** — Reconcile pass (assignments, failure events, topology spread)
//! - **`convert`** — Type conversions from state store types
//! - **`simulated`** — `SimulatedCluster`, a `ClusterStore` that reconciles on every mutation

pub mod convert;
pub mod placer;
pub mod scorer;
pub mod simulated;

pub use convert::{cluster_resources, unit_to_resources};
pub use placer::{FAILED_SCHEDULING, Placer, ReconcileOutcome};
pub use scorer::{NodeResources, NodeScore, Rejection, ScoringWeights, rank_nodes, score_node};
pub use simulated::{ReconcileSummary, SimulatedCluster};
