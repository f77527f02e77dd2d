//! SimulatedCluster — a [`ClusterStore`] with a live placement engine.
//!
//! Wraps a [`StateStore`] and runs a [`Placer`] reconcile pass after every
//! mutation that could let pending workload land, the way a scheduler
//! reacts to watch events. Mutations are serialised so a reconcile always
//! sees the state it is about to write over.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use scaleprobe_state::{
    CapacityUnit, ClusterStore, PlacementFailureEvent, StateError, StateResult, StateStore,
    WorkloadUnit,
};

use crate::placer::Placer;

/// Counts from one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub placed: usize,
    pub failed: usize,
}

pub struct SimulatedCluster {
    store: StateStore,
    placer: Placer,
    lock: Mutex<()>,
}

impl SimulatedCluster {
    pub fn new(store: StateStore, placer: Placer) -> Self {
        Self {
            store,
            placer,
            lock: Mutex::new(()),
        }
    }

    /// An empty cluster over an in-memory store.
    pub fn in_memory(placer: Placer) -> StateResult<Self> {
        Ok(Self::new(StateStore::open_in_memory()?, placer))
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run a placement pass now.
    pub fn reconcile(&self) -> StateResult<ReconcileSummary> {
        let _guard = self.lock()?;
        self.reconcile_locked()
    }

    fn lock(&self) -> StateResult<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| StateError::Poisoned)
    }

    fn reconcile_locked(&self) -> StateResult<ReconcileSummary> {
        let units = self.store.list_units()?;
        let mut workload = self.store.list_workload()?;
        let outcome = self.placer.reconcile(&units, &workload);

        if !outcome.assignments.is_empty() {
            let targets: HashMap<&str, &str> = outcome
                .assignments
                .iter()
                .map(|(w, u)| (w.as_str(), u.as_str()))
                .collect();
            workload.retain_mut(|w| match targets.get(w.name.as_str()) {
                Some(unit) => {
                    w.node_name = Some(unit.to_string());
                    true
                }
                None => false,
            });
            self.store.put_workloads(&workload)?;
        }
        if !outcome.failures.is_empty() {
            self.store.put_events(&outcome.failures)?;
        }

        let summary = ReconcileSummary {
            placed: outcome.assignments.len(),
            failed: outcome.failures.len(),
        };
        if summary.placed > 0 || summary.failed > 0 {
            debug!(placed = summary.placed, failed = summary.failed, "reconcile pass");
        }
        Ok(summary)
    }

    fn set_unschedulable(&self, name: &str, unschedulable: bool) -> StateResult<()> {
        let mut unit = self
            .store
            .get_unit(name)?
            .ok_or_else(|| StateError::NotFound(format!("unit {name}")))?;
        unit.unschedulable = unschedulable;
        self.store.put_unit(&unit)
    }
}

impl ClusterStore for SimulatedCluster {
    fn list_units(&self) -> StateResult<Vec<CapacityUnit>> {
        self.store.list_units()
    }

    fn list_workload(&self) -> StateResult<Vec<WorkloadUnit>> {
        self.store.list_workload()
    }

    fn add_units(&self, units: &[CapacityUnit]) -> StateResult<()> {
        let _guard = self.lock()?;
        for unit in units {
            if self.store.get_unit(&unit.name)?.is_some() {
                return Err(StateError::AlreadyExists(format!("unit {}", unit.name)));
            }
        }
        self.store.put_units(units)?;
        info!(count = units.len(), "units added");
        self.reconcile_locked()?;
        Ok(())
    }

    fn delete_unit(&self, name: &str) -> StateResult<bool> {
        let _guard = self.lock()?;
        let mut orphaned = self.store.list_workload_on(name)?;
        if !self.store.delete_unit(name)? {
            return Ok(false);
        }
        for w in &mut orphaned {
            w.node_name = None;
        }
        self.store.put_workloads(&orphaned)?;
        info!(unit = %name, orphaned = orphaned.len(), "unit deleted");
        self.reconcile_locked()?;
        Ok(true)
    }

    fn create_workload(&self, workload: &[WorkloadUnit]) -> StateResult<()> {
        let _guard = self.lock()?;
        for w in workload {
            if self.store.get_workload(&w.name)?.is_some() {
                return Err(StateError::AlreadyExists(format!("workload {}", w.name)));
            }
        }
        self.store.put_workloads(workload)?;
        debug!(count = workload.len(), "workload created");
        self.reconcile_locked()?;
        Ok(())
    }

    fn delete_workload(&self, name: &str) -> StateResult<bool> {
        let _guard = self.lock()?;
        let existed = self.store.delete_workload(name)?;
        if existed {
            self.reconcile_locked()?;
        }
        Ok(existed)
    }

    fn taint_unit(&self, name: &str) -> StateResult<()> {
        let _guard = self.lock()?;
        self.set_unschedulable(name, true)?;
        debug!(unit = %name, "unit cordoned");
        Ok(())
    }

    fn untaint_unit(&self, name: &str) -> StateResult<()> {
        let _guard = self.lock()?;
        self.set_unschedulable(name, false)?;
        debug!(unit = %name, "unit uncordoned");
        self.reconcile_locked()?;
        Ok(())
    }

    fn list_placement_failure_events(&self) -> StateResult<Vec<PlacementFailureEvent>> {
        self.store.list_events()
    }
}
