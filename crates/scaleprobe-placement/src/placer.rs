//! Placement engine — assigns pending workload to capacity units.
//!
//! One reconcile pass over a cluster snapshot:
//! 1. Rebuild per-unit usage from assigned workload
//! 2. Walk pending workload served by a known scheduler profile, oldest first
//! 3. Place each on the best-scoring feasible unit (see `scorer`)
//! 4. Emit a placement-failure event for every unit that cannot be placed
//!
//! The pass never evicts: assigned workload stays where it is even if the
//! unit has since been cordoned or tainted.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use scaleprobe_state::{
    CapacityUnit, DEFAULT_SCHEDULER, PlacementFailureEvent, WorkloadUnit, now_millis,
};

use crate::convert::cluster_resources;
use crate::scorer::{NodeResources, Rejection, ScoringWeights, rank_nodes};

/// Reason attached to every placement-failure event.
pub const FAILED_SCHEDULING: &str = "FailedScheduling";

/// Outcome of a reconcile pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// (workload name, unit name) pairs placed in this pass.
    pub assignments: Vec<(String, String)>,
    pub failures: Vec<PlacementFailureEvent>,
}

/// Pure placement logic over a snapshot of units and workload.
#[derive(Debug, Clone)]
pub struct Placer {
    /// Scheduler names this engine serves.
    profiles: HashSet<String>,
    weights: ScoringWeights,
}

impl Default for Placer {
    fn default() -> Self {
        Self::new()
    }
}

impl Placer {
    /// A placer serving only the default scheduler.
    pub fn new() -> Self {
        Self {
            profiles: HashSet::from([DEFAULT_SCHEDULER.to_string()]),
            weights: ScoringWeights::default(),
        }
    }

    /// Also serve workload submitted to `scheduler`.
    pub fn serve_scheduler(mut self, scheduler: &str) -> Self {
        self.profiles.insert(scheduler.to_string());
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn serves(&self, scheduler: &str) -> bool {
        self.profiles.contains(scheduler)
    }

    /// Compute assignments and failures for all pending workload.
    pub fn reconcile(&self, units: &[CapacityUnit], workload: &[WorkloadUnit]) -> ReconcileOutcome {
        let mut nodes = cluster_resources(units, workload);

        // Live spread counts: group -> zone -> assigned workload.
        let unit_zone: HashMap<&str, &str> = units
            .iter()
            .filter_map(|u| u.zone().map(|z| (u.name.as_str(), z)))
            .collect();
        let mut spread_counts: HashMap<String, BTreeMap<String, u32>> = HashMap::new();
        for w in workload {
            if let (Some(spread), Some(node)) = (&w.spread, &w.node_name)
                && let Some(zone) = unit_zone.get(node.as_str())
            {
                *spread_counts
                    .entry(spread.group.clone())
                    .or_default()
                    .entry(zone.to_string())
                    .or_insert(0) += 1;
            }
        }

        let mut pending: Vec<&WorkloadUnit> = workload
            .iter()
            .filter(|w| w.node_name.is_none() && self.serves(&w.scheduler_name))
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

        let now = now_millis();
        let mut outcome = ReconcileOutcome::default();

        for w in pending {
            let allowed_zones = w
                .spread
                .as_ref()
                .map(|s| spread_allowed_zones(&nodes, w, s.max_skew, spread_counts.get(&s.group)));

            let candidates = nodes.values().filter(|n| match &allowed_zones {
                Some(zones) => n.zone.as_ref().is_some_and(|z| zones.contains(z)),
                None => true,
            });
            let (ranked, mut rejections) = rank_nodes(candidates, w, &self.weights);

            match ranked.first() {
                Some(best) => {
                    let unit_name = best.unit_name.clone();
                    if let Some(node) = nodes.get_mut(&unit_name) {
                        node.assign(&w.requests);
                        if let (Some(spread), Some(zone)) = (&w.spread, &node.zone) {
                            *spread_counts
                                .entry(spread.group.clone())
                                .or_default()
                                .entry(zone.clone())
                                .or_insert(0) += 1;
                        }
                    }
                    debug!(workload = %w.name, unit = %unit_name, score = best.score, "placed workload");
                    outcome.assignments.push((w.name.clone(), unit_name));
                }
                None => {
                    let excluded = nodes.len().saturating_sub(rejections.len());
                    rejections.extend(std::iter::repeat_n(Rejection::TopologySpread, excluded));
                    let message = failure_message(nodes.len(), &rejections);
                    debug!(workload = %w.name, %message, "placement failed");
                    outcome.failures.push(PlacementFailureEvent {
                        workload: w.name.clone(),
                        timestamp: now,
                        reason: FAILED_SCHEDULING.to_string(),
                        message,
                    });
                }
            }
        }

        outcome
    }
}

/// Zones a spread-constrained workload unit may land in.
///
/// Eligible domains are the zones of units that admit the workload on
/// labels, taints and cordon alone; a zone is allowed when placing there
/// keeps its count within `max_skew` of the least-loaded eligible zone.
fn spread_allowed_zones(
    nodes: &BTreeMap<String, NodeResources>,
    workload: &WorkloadUnit,
    max_skew: u32,
    counts: Option<&BTreeMap<String, u32>>,
) -> HashSet<String> {
    let eligible: HashSet<&String> = nodes
        .values()
        .filter(|n| n.admits(workload).is_ok())
        .filter_map(|n| n.zone.as_ref())
        .collect();

    let count_in = |zone: &String| counts.and_then(|c| c.get(zone)).copied().unwrap_or(0);
    let min = eligible.iter().map(|z| count_in(z)).min().unwrap_or(0);

    eligible
        .into_iter()
        .filter(|z| count_in(z) + 1 - min <= max_skew)
        .cloned()
        .collect()
}

/// Kubernetes-style summary, e.g. `0/3 units are available: 2 Insufficient memory, 1 ...`.
fn failure_message(total: usize, rejections: &[Rejection]) -> String {
    let mut counts: BTreeMap<Rejection, usize> = BTreeMap::new();
    for r in rejections {
        *counts.entry(*r).or_insert(0) += 1;
    }
    let detail: Vec<String> = counts.iter().map(|(r, n)| format!("{n} {r}")).collect();
    if detail.is_empty() {
        format!("0/{total} units are available")
    } else {
        format!("0/{total} units are available: {}", detail.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaleprobe_state::*;

    fn unit(name: &str, zone: &str, mem_gi: u64) -> CapacityUnit {
        let mut unit_labels = BTreeMap::new();
        unit_labels.insert(labels::ZONE.to_string(), zone.to_string());
        CapacityUnit {
            name: name.to_string(),
            labels: unit_labels,
            allocatable: Resources::new(8000, mem_gi << 30),
            capacity: Resources::new(8000, mem_gi << 30),
            max_workload: 110,
            taints: Vec::new(),
            unschedulable: false,
            created_at: 0,
        }
    }

    fn pod(name: &str, mem_gi: u64, created_at: u64) -> WorkloadUnit {
        let mut w = WorkloadUnit::pending(name, Resources::new(100, mem_gi << 30));
        w.created_at = created_at;
        w
    }

    #[test]
    fn places_pending_until_full() {
        let units = vec![unit("n1", "z1", 4)];
        let workload = vec![pod("a", 2, 1), pod("b", 2, 2), pod("c", 2, 3)];

        let outcome = Placer::new().reconcile(&units, &workload);
        assert_eq!(
            outcome.assignments,
            vec![
                ("a".to_string(), "n1".to_string()),
                ("b".to_string(), "n1".to_string())
            ]
        );
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].workload, "c");
        assert_eq!(outcome.failures[0].reason, FAILED_SCHEDULING);
        assert!(outcome.failures[0].message.contains("Insufficient memory"));
    }

    #[test]
    fn oldest_workload_placed_first() {
        let units = vec![unit("n1", "z1", 2)];
        let workload = vec![pod("late", 2, 20), pod("early", 2, 10)];

        let outcome = Placer::new().reconcile(&units, &workload);
        assert_eq!(outcome.assignments[0].0, "early");
        assert_eq!(outcome.failures[0].workload, "late");
    }

    #[test]
    fn ignores_unserved_scheduler() {
        let units = vec![unit("n1", "z1", 4)];
        let mut w = pod("a", 1, 1);
        w.scheduler_name = "trial".to_string();

        let outcome = Placer::new().reconcile(&units, std::slice::from_ref(&w));
        assert!(outcome.assignments.is_empty());
        assert!(outcome.failures.is_empty());

        let outcome = Placer::new().serve_scheduler("trial").reconcile(&units, &[w]);
        assert_eq!(outcome.assignments.len(), 1);
    }

    #[test]
    fn cordoned_unit_receives_nothing() {
        let mut cordoned = unit("n1", "z1", 4);
        cordoned.unschedulable = true;
        let outcome = Placer::new().reconcile(&[cordoned], &[pod("a", 1, 1)]);
        assert!(outcome.assignments.is_empty());
        assert!(outcome.failures[0].message.contains("unschedulable"));
    }

    #[test]
    fn existing_usage_counts_against_capacity() {
        let units = vec![unit("n1", "z1", 4)];
        let mut running = pod("running", 3, 1);
        running.node_name = Some("n1".to_string());

        let outcome = Placer::new().reconcile(&units, &[running, pod("new", 2, 2)]);
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.failures.len(), 1);
    }

    #[test]
    fn topology_spread_balances_zones() {
        let units = vec![unit("a1", "za", 16), unit("b1", "zb", 16)];
        let spread = TopologySpread {
            group: "web".to_string(),
            max_skew: 1,
        };
        let workload: Vec<_> = (0..4)
            .map(|i| {
                let mut w = pod(&format!("web-{i}"), 1, i);
                w.spread = Some(spread.clone());
                w
            })
            .collect();

        let outcome = Placer::new().reconcile(&units, &workload);
        let in_a = outcome.assignments.iter().filter(|(_, u)| u == "a1").count();
        let in_b = outcome.assignments.iter().filter(|(_, u)| u == "b1").count();
        assert_eq!((in_a, in_b), (2, 2));
    }

    #[test]
    fn topology_spread_blocks_when_only_one_zone_fits() {
        // zb is eligible but full, so za may run at most max_skew ahead.
        let units = vec![unit("a1", "za", 16), unit("b1", "zb", 1)];
        let spread = TopologySpread {
            group: "web".to_string(),
            max_skew: 1,
        };
        let workload: Vec<_> = (0..3)
            .map(|i| {
                let mut w = pod(&format!("web-{i}"), 2, i);
                w.spread = Some(spread.clone());
                w
            })
            .collect();

        let outcome = Placer::new().reconcile(&units, &workload);
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.failures.len(), 2);
    }
}
