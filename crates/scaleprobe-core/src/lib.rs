//! scaleprobe-core — configuration and process-wide read-only inputs.
//!
//! - **`config`** — cluster descriptor (`scaleprobe.toml`) and engine settings
//! - **`quantity`** — Kubernetes-style cpu/memory quantity parsing
//! - **`pricing`** — static machine-type price table
//! - **`manifest`** — workload manifest loading
//! - **`bootstrap`** — seeding a fresh cluster from a descriptor

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pricing;
pub mod quantity;

pub use config::{ClusterDescriptor, EngineSettings, PoolConfig};
pub use error::{ConfigError, ConfigResult};
pub use manifest::WorkloadManifest;
pub use pricing::PriceTable;
