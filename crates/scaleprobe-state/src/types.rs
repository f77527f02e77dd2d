//! Domain types for the scaleprobe state store.
//!
//! These mirror the Kubernetes objects the engine reasons about: capacity
//! units are nodes, workload units are pods, capacity pools are worker
//! pools. Pool, zone and machine type live in well-known labels exactly
//! as they would on a real node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Well-known label and taint keys.
pub mod labels {
    /// Pool a capacity unit belongs to.
    pub const POOL: &str = "scaleprobe.io/pool";
    pub const ZONE: &str = "topology.kubernetes.io/zone";
    pub const REGION: &str = "topology.kubernetes.io/region";
    pub const INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
    pub const HOSTNAME: &str = "kubernetes.io/hostname";
    /// Origin marker: units present before the engine touched the cluster.
    pub const PRE_EXISTING: &str = "scaleprobe.io/pre-existing";
    /// Trial id, set on trial units, their taint, and trial workload copies.
    pub const TRIAL: &str = "scaleprobe.io/trial";
    /// Round marker shared by every artifact of one scale-up round.
    pub const ROUND: &str = "scaleprobe.io/round";
    /// Name of the unit a scale-down copy was relocated from.
    pub const RELOCATED_FROM: &str = "scaleprobe.io/relocated-from";
}

/// Scheduler name served by the placement engine for ordinary workload.
pub const DEFAULT_SCHEDULER: &str = "default-scheduler";

/// CPU and memory amounts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    /// CPU in millicores.
    pub cpu_millis: u64,
    /// Memory in bytes.
    pub memory_bytes: u64,
}

impl Resources {
    pub fn new(cpu_millis: u64, memory_bytes: u64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
        }
    }

    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.saturating_sub(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
        }
    }

    pub fn add(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis + other.cpu_millis,
            memory_bytes: self.memory_bytes + other.memory_bytes,
        }
    }

    /// Whether `request` fits inside these resources.
    pub fn fits(&self, request: &Resources) -> bool {
        request.cpu_millis <= self.cpu_millis && request.memory_bytes <= self.memory_bytes
    }
}

// ── Capacity unit ─────────────────────────────────────────────────

/// A `NoSchedule` taint. Only workload tolerating it may be placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Taint {
    pub key: String,
    pub value: String,
}

/// A schedulable host instance (node).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapacityUnit {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Resources available to workload.
    pub allocatable: Resources,
    /// Raw machine resources.
    pub capacity: Resources,
    /// Maximum number of workload units the unit accepts.
    pub max_workload: u32,
    pub taints: Vec<Taint>,
    /// Cordoned: no new workload may be placed, existing assignment stays.
    pub unschedulable: bool,
    /// Unix timestamp (milliseconds) when the unit was created.
    pub created_at: u64,
}

impl CapacityUnit {
    pub fn pool(&self) -> Option<&str> {
        self.labels.get(labels::POOL).map(String::as_str)
    }

    pub fn zone(&self) -> Option<&str> {
        self.labels.get(labels::ZONE).map(String::as_str)
    }

    pub fn machine_type(&self) -> Option<&str> {
        self.labels.get(labels::INSTANCE_TYPE).map(String::as_str)
    }

    /// Units present before the engine ran are never removal candidates.
    pub fn is_pre_existing(&self) -> bool {
        self.labels
            .get(labels::PRE_EXISTING)
            .is_some_and(|v| v == "true")
    }

    /// Whether this unit is a scale-up trial artifact.
    pub fn is_trial(&self) -> bool {
        self.labels.contains_key(labels::TRIAL)
    }

    /// `pool/zone` key used in recommendations.
    pub fn pool_zone_key(&self) -> String {
        format!(
            "{}/{}",
            self.pool().unwrap_or_default(),
            self.zone().unwrap_or_default()
        )
    }
}

// ── Workload unit ─────────────────────────────────────────────────

/// Tolerates taints with a matching key (and value, if set).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toleration {
    pub key: String,
    /// `None` tolerates any value for the key.
    pub value: Option<String>,
}

impl Toleration {
    pub fn tolerates(&self, taint: &Taint) -> bool {
        self.key == taint.key && self.value.as_ref().is_none_or(|v| *v == taint.value)
    }
}

/// Zone topology spread: workload sharing `group` must stay within
/// `max_skew` of each other across the zones of eligible units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologySpread {
    pub group: String,
    pub max_skew: u32,
}

/// A schedulable work item (pod).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadUnit {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub requests: Resources,
    /// Required unit labels (node affinity).
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
    #[serde(default)]
    pub spread: Option<TopologySpread>,
    /// Scheduler profile expected to place this unit.
    pub scheduler_name: String,
    /// Assigned capacity unit, `None` while unplaced.
    pub node_name: Option<String>,
    /// Unix timestamp (milliseconds) when the workload was created.
    pub created_at: u64,
}

impl WorkloadUnit {
    /// Build a pending workload unit for the default scheduler.
    pub fn pending(name: &str, requests: Resources) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            requests,
            node_selector: BTreeMap::new(),
            tolerations: Vec::new(),
            spread: None,
            scheduler_name: DEFAULT_SCHEDULER.to_string(),
            node_name: None,
            created_at: now_millis(),
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.node_name.is_some()
    }

    /// Whether this is a scale-up trial copy.
    pub fn is_trial(&self) -> bool {
        self.labels.contains_key(labels::TRIAL)
    }

    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).is_some_and(|v| v == value)
    }
}

// ── Events ────────────────────────────────────────────────────────

/// Emitted by the placement engine when a workload unit cannot be placed.
///
/// Events are never retracted when the workload is later placed or
/// deleted; consumers must cross-check the workload's current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacementFailureEvent {
    pub workload: String,
    /// Unix timestamp (milliseconds) of the most recent failure.
    pub timestamp: u64,
    pub reason: String,
    pub message: String,
}

// ── Pools ─────────────────────────────────────────────────────────

/// A declared worker pool. Position in the pool list is its priority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapacityPool {
    pub name: String,
    pub zones: Vec<String>,
    pub machine_type: String,
    /// Maximum number of units the pool may hold.
    pub maximum: u32,
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
