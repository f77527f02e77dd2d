//! scaleprobe.toml cluster descriptor parser.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scaleprobe_state::{
    CapacityPool, CapacityUnit, DescriptorProvider, Resources, StateError, StateResult, labels,
    now_millis,
};

use crate::error::{ConfigError, ConfigResult, read_file};
use crate::quantity::{parse_cpu, parse_memory};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub machine_type: String,
    pub zones: Vec<String>,
    pub maximum: u32,
    /// Units seeded at bootstrap.
    #[serde(default)]
    pub initial: u32,
    /// Mark seeded units as pre-existing (never removal candidates).
    #[serde(default)]
    pub pre_existing: bool,
    pub allocatable: AllocatableConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatableConfig {
    pub cpu: String,
    pub memory: String,
    #[serde(default = "default_pods")]
    pub pods: u32,
}

/// Tuning knobs for recommendation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub poll_interval_ms: u64,
    pub scale_up_round_timeout_ms: u64,
    pub scale_down_timeout_ms: u64,
    pub max_rounds: u32,
    pub run_timeout_ms: u64,
    /// Scheduler profile trial workload copies are submitted to.
    pub trial_scheduler: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            scale_up_round_timeout_ms: 60_000,
            scale_down_timeout_ms: 10_000,
            max_rounds: 50,
            run_timeout_ms: 600_000,
            trial_scheduler: "scaleprobe-trial".to_string(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scale_up_round_timeout(&self) -> Duration {
        Duration::from_millis(self.scale_up_round_timeout_ms)
    }

    pub fn scale_down_timeout(&self) -> Duration {
        Duration::from_millis(self.scale_down_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }
}

fn default_region() -> String {
    "local".to_string()
}

fn default_pods() -> u32 {
    110
}

impl ClusterDescriptor {
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let descriptor: ClusterDescriptor = toml::from_str(content)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_toml_str(&read_file(path)?)
    }

    fn validate(&self) -> ConfigResult<()> {
        let mut seen = std::collections::HashSet::new();
        for pool in &self.pools {
            if !seen.insert(pool.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate pool {:?}", pool.name)));
            }
            if pool.zones.is_empty() {
                return Err(ConfigError::Invalid(format!("pool {:?} has no zones", pool.name)));
            }
            if pool.initial > pool.maximum {
                return Err(ConfigError::Invalid(format!(
                    "pool {:?}: initial {} exceeds maximum {}",
                    pool.name, pool.initial, pool.maximum
                )));
            }
            pool.allocatable.resources()?;
        }
        if self.engine.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("engine.poll_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Declared pools in priority order.
    pub fn capacity_pools(&self) -> Vec<CapacityPool> {
        self.pools.iter().map(PoolConfig::to_capacity_pool).collect()
    }

    pub fn pool(&self, name: &str) -> Option<&PoolConfig> {
        self.pools.iter().find(|p| p.name == name)
    }
}

impl DescriptorProvider for ClusterDescriptor {
    fn pools(&self, cluster: &str) -> StateResult<Vec<CapacityPool>> {
        if cluster != self.cluster.name {
            return Err(StateError::NotFound(format!("cluster {cluster}")));
        }
        Ok(self.capacity_pools())
    }
}

impl AllocatableConfig {
    pub fn resources(&self) -> ConfigResult<Resources> {
        Ok(Resources::new(parse_cpu(&self.cpu)?, parse_memory(&self.memory)?))
    }
}

impl PoolConfig {
    pub fn to_capacity_pool(&self) -> CapacityPool {
        CapacityPool {
            name: self.name.clone(),
            zones: self.zones.clone(),
            machine_type: self.machine_type.clone(),
            maximum: self.maximum,
        }
    }

    /// Build a unit of this pool in `zone`, labelled like a real node.
    pub fn build_unit(&self, name: &str, zone: &str, region: &str) -> ConfigResult<CapacityUnit> {
        let allocatable = self.allocatable.resources()?;
        let mut unit_labels = BTreeMap::new();
        unit_labels.insert(labels::POOL.to_string(), self.name.clone());
        unit_labels.insert(labels::ZONE.to_string(), zone.to_string());
        unit_labels.insert(labels::REGION.to_string(), region.to_string());
        unit_labels.insert(labels::INSTANCE_TYPE.to_string(), self.machine_type.clone());
        unit_labels.insert(labels::HOSTNAME.to_string(), name.to_string());
        if self.pre_existing {
            unit_labels.insert(labels::PRE_EXISTING.to_string(), "true".to_string());
        }
        Ok(CapacityUnit {
            name: name.to_string(),
            labels: unit_labels,
            allocatable,
            capacity: allocatable,
            max_workload: self.allocatable.pods,
            taints: Vec::new(),
            unschedulable: false,
            created_at: now_millis(),
        })
    }
}
