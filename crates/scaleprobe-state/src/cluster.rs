//! Capability traits the recommendation engine consumes.
//!
//! The engine never touches a concrete store. Everything it reads or
//! mutates goes through [`ClusterStore`], and the pool list comes from a
//! [`DescriptorProvider`]. The simulated placement engine implements the
//! former; a parsed cluster descriptor implements the latter.

use crate::error::StateResult;
use crate::types::{CapacityPool, CapacityUnit, PlacementFailureEvent, WorkloadUnit};

/// System of record for units, workload and placement-failure events.
///
/// Every call either completes against the live cluster state or returns
/// an error; implementations must not cache state between calls.
pub trait ClusterStore: Send + Sync {
    fn list_units(&self) -> StateResult<Vec<CapacityUnit>>;

    fn list_workload(&self) -> StateResult<Vec<WorkloadUnit>>;

    /// Register new capacity units. Fails if a name is already taken.
    fn add_units(&self, units: &[CapacityUnit]) -> StateResult<()>;

    /// Remove a unit. Workload assigned to it becomes unplaced.
    fn delete_unit(&self, name: &str) -> StateResult<bool>;

    /// Submit workload units for placement.
    fn create_workload(&self, workload: &[WorkloadUnit]) -> StateResult<()>;

    fn delete_workload(&self, name: &str) -> StateResult<bool>;

    /// Cordon a unit: no new placements, existing assignment untouched.
    fn taint_unit(&self, name: &str) -> StateResult<()>;

    /// Lift a cordon set by [`ClusterStore::taint_unit`].
    fn untaint_unit(&self, name: &str) -> StateResult<()>;

    /// Latest placement-failure event per workload unit.
    fn list_placement_failure_events(&self) -> StateResult<Vec<PlacementFailureEvent>>;
}

/// Source of the declared capacity pools for a named cluster.
pub trait DescriptorProvider: Send + Sync {
    /// Pools in declaration (priority) order.
    fn pools(&self, cluster: &str) -> StateResult<Vec<CapacityPool>>;
}
