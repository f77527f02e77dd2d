//! Trial artifacts: tagging, copying and guaranteed cleanup.
//!
//! Every unit or workload unit the engine creates speculatively carries a
//! marker label. A [`TrialGuard`] owns one marker value and deletes
//! everything carrying it, either explicitly via [`TrialGuard::purge`] or
//! on drop, so artifacts never outlive the run that created them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use scaleprobe_state::{
    CapacityUnit, ClusterStore, StateResult, Taint, Toleration, WorkloadUnit, labels, now_millis,
};

static NAME_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh name of the form `{prefix}-{16 hex digits}`.
pub(crate) fn generate_name(prefix: &str) -> String {
    let mut hasher = DefaultHasher::new();
    prefix.hash(&mut hasher);
    now_millis().hash(&mut hasher);
    NAME_SEQ.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
    format!("{prefix}-{:016x}", hasher.finish())
}

/// Set a unit's name and keep its hostname label in step.
pub(crate) fn rename_unit(unit: &mut CapacityUnit, name: String) {
    if unit.labels.contains_key(labels::HOSTNAME) {
        unit.labels.insert(labels::HOSTNAME.to_string(), name.clone());
    }
    unit.name = name;
}

/// Identifies one trial within one scale-up round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialTag {
    pub round: String,
    pub trial_id: String,
}

impl TrialTag {
    pub fn new(round: &str, pool: &str) -> Self {
        Self {
            round: round.to_string(),
            trial_id: format!("{round}-{pool}"),
        }
    }

    /// Taint keeping ordinary workload off the trial unit.
    pub fn taint(&self) -> Taint {
        Taint {
            key: labels::TRIAL.to_string(),
            value: self.trial_id.clone(),
        }
    }

    /// Mark a unit as this trial's capacity.
    pub fn apply_to_unit(&self, unit: &mut CapacityUnit) {
        unit.labels.insert(labels::TRIAL.to_string(), self.trial_id.clone());
        unit.labels.insert(labels::ROUND.to_string(), self.round.clone());
        unit.taints.push(self.taint());
    }
}

/// Disjoint copies of `workload` pinned to the trial's unit.
///
/// Copies are submitted to `scheduler`, select the trial unit by label
/// and tolerate its taint. Resource requests and spread constraints are
/// kept unchanged.
pub fn trial_copies(workload: &[WorkloadUnit], tag: &TrialTag, scheduler: &str) -> Vec<WorkloadUnit> {
    let created_at = now_millis();
    workload
        .iter()
        .map(|w| {
            let mut copy = w.clone();
            copy.name = format!("{}-{}", w.name, tag.trial_id);
            copy.labels.insert(labels::TRIAL.to_string(), tag.trial_id.clone());
            copy.labels.insert(labels::ROUND.to_string(), tag.round.clone());
            copy.node_selector.insert(labels::TRIAL.to_string(), tag.trial_id.clone());
            copy.tolerations.push(Toleration {
                key: labels::TRIAL.to_string(),
                value: Some(tag.trial_id.clone()),
            });
            copy.scheduler_name = scheduler.to_string();
            copy.node_name = None;
            copy.created_at = created_at;
            copy
        })
        .collect()
}

/// Fresh, unassigned copies of workload leaving `unit`.
pub fn relocation_copies(workload: &[WorkloadUnit], unit: &str) -> Vec<WorkloadUnit> {
    let created_at = now_millis();
    workload
        .iter()
        .map(|w| {
            let mut copy = w.clone();
            copy.name = generate_name(&w.name);
            copy.labels.insert(labels::RELOCATED_FROM.to_string(), unit.to_string());
            copy.node_name = None;
            copy.created_at = created_at;
            copy
        })
        .collect()
}

/// The permanent unit committed for a winning trial.
pub fn permanent_unit(trial: &CapacityUnit) -> CapacityUnit {
    let mut unit = trial.clone();
    unit.labels.remove(labels::TRIAL);
    unit.labels.remove(labels::ROUND);
    unit.labels.remove(labels::PRE_EXISTING);
    unit.taints.retain(|t| t.key != labels::TRIAL);
    unit.unschedulable = false;
    unit.created_at = now_millis();
    rename_unit(&mut unit, generate_name(trial.pool().unwrap_or("unit")));
    unit
}

/// Deletes every unit and workload unit labelled `key=value` when purged
/// or dropped, and optionally uncordons one unit.
pub struct TrialGuard {
    store: Arc<dyn ClusterStore>,
    key: String,
    value: String,
    untaint: Option<String>,
    armed: bool,
}

impl TrialGuard {
    pub fn new(store: Arc<dyn ClusterStore>, key: &str, value: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
            value: value.to_string(),
            untaint: None,
            armed: true,
        }
    }

    /// Also uncordon `unit` when the guard fires.
    pub fn untaint_on_release(mut self, unit: &str) -> Self {
        self.untaint = Some(unit.to_string());
        self
    }

    /// Remove all tracked artifacts now, propagating store errors.
    ///
    /// Workload goes first so deleting trial units does not bounce
    /// pinned copies back to pending.
    pub fn purge(&mut self) -> StateResult<()> {
        let mut workload_removed = 0usize;
        for w in self.store.list_workload()? {
            if w.has_label(&self.key, &self.value) && self.store.delete_workload(&w.name)? {
                workload_removed += 1;
            }
        }

        let mut units_removed = 0usize;
        for u in self.store.list_units()? {
            if u.labels.get(&self.key).is_some_and(|v| *v == self.value)
                && self.store.delete_unit(&u.name)?
            {
                units_removed += 1;
            }
        }

        if let Some(unit) = &self.untaint {
            self.store.untaint_unit(unit)?;
        }

        self.armed = false;
        debug!(
            marker = %format!("{}={}", self.key, self.value),
            units_removed,
            workload_removed,
            "trial artifacts purged"
        );
        Ok(())
    }

    /// Keep the artifacts; nothing happens on drop.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.purge() {
            warn!(
                key = %self.key,
                value = %self.value,
                error = %e,
                "failed to clean up trial artifacts"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaleprobe_placement::{Placer, SimulatedCluster};
    use scaleprobe_state::Resources;
    use std::collections::BTreeMap;

    fn unit(name: &str) -> CapacityUnit {
        let mut unit_labels = BTreeMap::new();
        unit_labels.insert(labels::POOL.to_string(), "general".to_string());
        unit_labels.insert(labels::HOSTNAME.to_string(), name.to_string());
        unit_labels.insert(labels::PRE_EXISTING.to_string(), "true".to_string());
        CapacityUnit {
            name: name.to_string(),
            labels: unit_labels,
            allocatable: Resources::new(4000, 16 << 30),
            capacity: Resources::new(4000, 16 << 30),
            max_workload: 110,
            taints: Vec::new(),
            unschedulable: false,
            created_at: 0,
        }
    }

    #[test]
    fn generated_names_are_unique() {
        let a = generate_name("general");
        let b = generate_name("general");
        assert_ne!(a, b);
        assert!(a.starts_with("general-"));
        assert_eq!(a.len(), "general-".len() + 16);
    }

    #[test]
    fn trial_copies_are_pinned_and_tolerated() {
        let tag = TrialTag::new("run-r1", "general");
        let mut original = WorkloadUnit::pending("api-0", Resources::new(500, 1 << 30));
        original.node_selector.insert("disk".to_string(), "ssd".to_string());

        let copies = trial_copies(&[original], &tag, "trial-scheduler");
        let copy = &copies[0];
        assert_eq!(copy.name, "api-0-run-r1-general");
        assert!(copy.has_label(labels::ROUND, "run-r1"));
        assert!(copy.is_trial());
        assert_eq!(copy.node_selector.get("disk").map(String::as_str), Some("ssd"));
        assert_eq!(
            copy.node_selector.get(labels::TRIAL),
            Some(&tag.trial_id)
        );
        assert!(copy.tolerations.iter().any(|t| t.tolerates(&tag.taint())));
        assert_eq!(copy.scheduler_name, "trial-scheduler");
    }

    #[test]
    fn permanent_unit_drops_trial_markers() {
        let tag = TrialTag::new("run-r1", "general");
        let mut trial = unit("general-trial");
        trial.labels.remove(labels::PRE_EXISTING);
        tag.apply_to_unit(&mut trial);

        let permanent = permanent_unit(&trial);
        assert_ne!(permanent.name, trial.name);
        assert!(!permanent.is_trial());
        assert!(!permanent.labels.contains_key(labels::ROUND));
        assert!(permanent.taints.is_empty());
        assert_eq!(permanent.pool(), Some("general"));
        assert_eq!(
            permanent.labels.get(labels::HOSTNAME),
            Some(&permanent.name)
        );
    }

    #[test]
    fn relocation_copies_get_fresh_identities() {
        let mut w = WorkloadUnit::pending("api-0", Resources::new(500, 1 << 30));
        w.node_name = Some("n1".to_string());

        let copies = relocation_copies(&[w], "n1");
        assert_ne!(copies[0].name, "api-0");
        assert!(copies[0].has_label(labels::RELOCATED_FROM, "n1"));
        assert!(!copies[0].is_assigned());
    }

    #[test]
    fn dropped_guard_removes_marked_artifacts() {
        let cluster = Arc::new(SimulatedCluster::in_memory(Placer::new().serve_scheduler("t")).unwrap());
        let tag = TrialTag::new("run-r1", "general");

        let mut trial = unit("trial-1");
        tag.apply_to_unit(&mut trial);
        cluster.add_units(&[unit("keep"), trial]).unwrap();
        let original = WorkloadUnit::pending("api", Resources::new(100, 1 << 30));
        cluster
            .create_workload(&trial_copies(std::slice::from_ref(&original), &tag, "t"))
            .unwrap();
        cluster.create_workload(&[original]).unwrap();

        {
            let _guard = TrialGuard::new(cluster.clone(), labels::ROUND, "run-r1");
        }

        let units: Vec<_> = cluster.list_units().unwrap().into_iter().map(|u| u.name).collect();
        assert_eq!(units, vec!["keep"]);
        let workload = cluster.list_workload().unwrap();
        assert_eq!(workload.len(), 1);
        assert_eq!(workload[0].name, "api");
    }

    #[test]
    fn disarmed_guard_keeps_artifacts_and_taint() {
        let cluster = Arc::new(SimulatedCluster::in_memory(Placer::new()).unwrap());
        cluster.add_units(&[unit("n1")]).unwrap();
        cluster.taint_unit("n1").unwrap();

        let mut guard = TrialGuard::new(cluster.clone(), labels::RELOCATED_FROM, "n1")
            .untaint_on_release("n1");
        guard.disarm();
        drop(guard);
        assert!(cluster.list_units().unwrap()[0].unschedulable);

        let mut guard = TrialGuard::new(cluster.clone(), labels::RELOCATED_FROM, "n1")
            .untaint_on_release("n1");
        guard.purge().unwrap();
        assert!(!cluster.list_units().unwrap()[0].unschedulable);
    }
}
