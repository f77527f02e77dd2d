//! Unit scoring for placement decisions.
//!
//! Evaluates candidate capacity units for one workload unit using:
//! - **Feasibility**: cordon, taints, node selector, cpu/memory/count fit
//! - **Bin-packing** (best-fit): prefer units that will be most full after placement
//! - **Balance**: prefer units close to the cluster's average utilization

use std::collections::BTreeMap;
use std::fmt;

use scaleprobe_state::{Resources, Taint, WorkloadUnit};

/// Resource capacity and usage for a single capacity unit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeResources {
    pub unit_name: String,
    pub zone: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<Taint>,
    pub allocatable: Resources,
    pub used: Resources,
    pub max_workload: u32,
    pub workload_count: u32,
    pub unschedulable: bool,
}

impl NodeResources {
    pub fn free(&self) -> Resources {
        self.allocatable.saturating_sub(&self.used)
    }

    pub fn memory_utilization(&self) -> f64 {
        if self.allocatable.memory_bytes > 0 {
            self.used.memory_bytes as f64 / self.allocatable.memory_bytes as f64
        } else {
            0.5
        }
    }

    /// Account for a workload unit newly assigned to this unit.
    pub fn assign(&mut self, requests: &Resources) {
        self.used = self.used.add(requests);
        self.workload_count += 1;
    }

    /// Label, taint and cordon checks, independent of free resources.
    pub fn admits(&self, workload: &WorkloadUnit) -> Result<(), Rejection> {
        if self.unschedulable {
            return Err(Rejection::Cordoned);
        }
        let untolerated = self
            .taints
            .iter()
            .any(|taint| !workload.tolerations.iter().any(|t| t.tolerates(taint)));
        if untolerated {
            return Err(Rejection::UntoleratedTaint);
        }
        let selector_ok = workload
            .node_selector
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|nv| nv == v));
        if !selector_ok {
            return Err(Rejection::SelectorMismatch);
        }
        Ok(())
    }
}

/// Why a unit cannot take a workload unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rejection {
    Cordoned,
    UntoleratedTaint,
    SelectorMismatch,
    InsufficientCpu,
    InsufficientMemory,
    TooManyWorkload,
    TopologySpread,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::Cordoned => "unit(s) were unschedulable",
            Rejection::UntoleratedTaint => "unit(s) had untolerated taint",
            Rejection::SelectorMismatch => "unit(s) didn't match node selector",
            Rejection::InsufficientCpu => "Insufficient cpu",
            Rejection::InsufficientMemory => "Insufficient memory",
            Rejection::TooManyWorkload => "Too many workload units",
            Rejection::TopologySpread => "unit(s) didn't match topology spread constraints",
        };
        f.write_str(s)
    }
}

/// Scored placement result for a single unit.
#[derive(Debug, Clone)]
pub struct NodeScore {
    pub unit_name: String,
    /// Total composite score (higher = better). Range: 0.0..=100.0.
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Individual score components for debugging.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    /// How full the unit will be after placement (higher = more packed).
    pub bin_packing: f64,
    /// Closeness to the cluster's average utilization.
    pub balance: f64,
}

/// Weights for the scoring components.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub bin_packing: f64,
    pub balance: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            bin_packing: 0.7,
            balance: 0.3,
        }
    }
}

/// Score a single unit for the given workload unit.
pub fn score_node(
    node: &NodeResources,
    workload: &WorkloadUnit,
    weights: &ScoringWeights,
    cluster_avg_utilization: f64,
) -> Result<NodeScore, Rejection> {
    node.admits(workload)?;

    let free = node.free();
    if workload.requests.cpu_millis > free.cpu_millis {
        return Err(Rejection::InsufficientCpu);
    }
    if workload.requests.memory_bytes > free.memory_bytes {
        return Err(Rejection::InsufficientMemory);
    }
    if node.workload_count >= node.max_workload {
        return Err(Rejection::TooManyWorkload);
    }

    let projected = node.used.memory_bytes + workload.requests.memory_bytes;
    let bin_packing = if node.allocatable.memory_bytes > 0 {
        (projected as f64 / node.allocatable.memory_bytes as f64).min(1.0) * 100.0
    } else {
        50.0
    };

    let balance =
        (1.0 - (node.memory_utilization() - cluster_avg_utilization).abs()).max(0.0) * 100.0;

    let score = weights.bin_packing * bin_packing + weights.balance * balance;

    Ok(NodeScore {
        unit_name: node.unit_name.clone(),
        score,
        breakdown: ScoreBreakdown {
            bin_packing,
            balance,
        },
    })
}

/// Score all units. Returns feasible units best first (ties by name)
/// and the rejection reason for every other unit.
pub fn rank_nodes<'a>(
    nodes: impl Iterator<Item = &'a NodeResources> + Clone,
    workload: &WorkloadUnit,
    weights: &ScoringWeights,
) -> (Vec<NodeScore>, Vec<Rejection>) {
    let (total_util, count) = nodes
        .clone()
        .fold((0.0, 0usize), |(sum, n), node| (sum + node.memory_utilization(), n + 1));
    let cluster_avg = if count == 0 { 0.5 } else { total_util / count as f64 };

    let mut scores = Vec::new();
    let mut rejections = Vec::new();
    for node in nodes {
        match score_node(node, workload, weights, cluster_avg) {
            Ok(score) => scores.push(score),
            Err(reason) => rejections.push(reason),
        }
    }

    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.unit_name.cmp(&b.unit_name))
    });
    (scores, rejections)
}
