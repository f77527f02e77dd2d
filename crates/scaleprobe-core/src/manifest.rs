//! Workload manifests.
//!
//! ```toml
//! [[workload]]
//! name = "web"
//! replicas = 3
//! cpu = "500m"
//! memory = "1Gi"
//! node_selector = { "scaleprobe.io/pool" = "general" }
//! spread = { group = "web", max_skew = 1 }
//! ```
//!
//! An entry with `replicas > 1` expands to `web-0`, `web-1`, ….

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use scaleprobe_state::{
    DEFAULT_SCHEDULER, Resources, Toleration, TopologySpread, WorkloadUnit, now_millis,
};

use crate::error::{ConfigError, ConfigResult, read_file};
use crate::quantity::{parse_cpu, parse_memory};

#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadManifest {
    #[serde(default)]
    pub workload: Vec<WorkloadEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadEntry {
    pub name: String,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    pub cpu: String,
    pub memory: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
    pub spread: Option<TopologySpread>,
    pub scheduler_name: Option<String>,
}

fn default_replicas() -> u32 {
    1
}

impl WorkloadManifest {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_toml_str(&read_file(path)?)
    }

    /// Expand every entry into pending workload units.
    pub fn workload_units(&self) -> ConfigResult<Vec<WorkloadUnit>> {
        let mut units = Vec::new();
        for entry in &self.workload {
            if entry.replicas == 0 {
                return Err(ConfigError::Invalid(format!(
                    "workload {:?} has zero replicas",
                    entry.name
                )));
            }
            let requests = Resources::new(parse_cpu(&entry.cpu)?, parse_memory(&entry.memory)?);
            for i in 0..entry.replicas {
                let name = if entry.replicas == 1 {
                    entry.name.clone()
                } else {
                    format!("{}-{i}", entry.name)
                };
                units.push(WorkloadUnit {
                    name,
                    labels: entry.labels.clone(),
                    requests,
                    node_selector: entry.node_selector.clone(),
                    tolerations: entry.tolerations.clone(),
                    spread: entry.spread.clone(),
                    scheduler_name: entry
                        .scheduler_name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_SCHEDULER.to_string()),
                    node_name: None,
                    created_at: now_millis(),
                });
            }
        }
        Ok(units)
    }
}
