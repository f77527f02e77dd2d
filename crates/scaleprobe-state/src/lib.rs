//! scaleprobe-state — the cluster state store.
//!
//! Holds the system of record the recommendation engine works against:
//! capacity units (nodes), workload units (pods) and placement-failure
//! events. Backed by [redb](https://docs.rs/redb) with an in-memory
//! backend for tests and ephemeral runs.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns
//! and keyed by name. Placement-failure events are keyed by the workload
//! they describe, so only the most recent event per workload is kept.
//!
//! Access from the engine goes through the [`ClusterStore`] capability
//! trait so that the store, the placement engine driving it and test
//! doubles are interchangeable.

pub mod cluster;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use cluster::{ClusterStore, DescriptorProvider};
pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
