//! Type conversions between state store types and placement types.
//!
//! Bridges `scaleprobe_state::{CapacityUnit, WorkloadUnit}` to the
//! placement engine's `NodeResources`.

use std::collections::BTreeMap;

use scaleprobe_state::{CapacityUnit, WorkloadUnit};

use crate::scorer::NodeResources;

/// Convert a [`CapacityUnit`] to empty [`NodeResources`].
pub fn unit_to_resources(unit: &CapacityUnit) -> NodeResources {
    NodeResources {
        unit_name: unit.name.clone(),
        zone: unit.zone().map(str::to_string),
        labels: unit.labels.clone(),
        taints: unit.taints.clone(),
        allocatable: unit.allocatable,
        used: Default::default(),
        max_workload: unit.max_workload,
        workload_count: 0,
        unschedulable: unit.unschedulable,
    }
}

/// Build per-unit resources with usage from currently assigned workload.
///
/// Workload assigned to a unit that no longer exists is ignored.
pub fn cluster_resources(
    units: &[CapacityUnit],
    workload: &[WorkloadUnit],
) -> BTreeMap<String, NodeResources> {
    let mut nodes: BTreeMap<String, NodeResources> = units
        .iter()
        .map(|u| (u.name.clone(), unit_to_resources(u)))
        .collect();

    for w in workload {
        if let Some(node) = w.node_name.as_ref().and_then(|n| nodes.get_mut(n)) {
            node.assign(&w.requests);
        }
    }
    nodes
}
