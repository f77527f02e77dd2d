//! Convergence waiter — polls placement-failure events until workload settles.
//!
//! A workload unit counts as failing only when its latest failure event
//! is at or after `since` *and* it is still unassigned. Failure events
//! are never retracted, so a unit that failed once and was placed later
//! must not be counted again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use scaleprobe_state::{ClusterStore, WorkloadUnit};

use crate::context::RunContext;
use crate::error::{RecommendError, RecommendResult, StopCause};

/// Which workload units a wait observes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadScope {
    All,
    /// Only workload carrying `key=value`.
    Label { key: String, value: String },
}

impl WorkloadScope {
    pub fn label(key: &str, value: &str) -> Self {
        WorkloadScope::Label {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, workload: &WorkloadUnit) -> bool {
        match self {
            WorkloadScope::All => true,
            WorkloadScope::Label { key, value } => workload.has_label(key, value),
        }
    }
}

#[derive(Clone)]
pub struct ConvergenceWaiter {
    store: Arc<dyn ClusterStore>,
    poll_interval: Duration,
}

impl ConvergenceWaiter {
    pub fn new(store: Arc<dyn ClusterStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Count in-scope workload failing placement since `since` (ms).
    pub fn unscheduled_count(&self, since: u64, scope: &WorkloadScope) -> RecommendResult<usize> {
        let workload = self.store.list_workload()?;
        let by_name: HashMap<&str, &WorkloadUnit> =
            workload.iter().map(|w| (w.name.as_str(), w)).collect();

        let count = self
            .store
            .list_placement_failure_events()?
            .iter()
            .filter(|e| e.timestamp >= since)
            .filter(|e| {
                by_name
                    .get(e.workload.as_str())
                    .is_some_and(|w| !w.is_assigned() && scope.matches(w))
            })
            .count();
        Ok(count)
    }

    /// Poll every interval until no in-scope failures remain.
    ///
    /// The first poll happens one interval after the call so the
    /// placement engine gets a chance to react. Returns the count
    /// observed at convergence (always 0), or `Timeout` carrying the last
    /// count once `min(now + timeout, run deadline)` passes.
    pub async fn wait_for_convergence(
        &self,
        ctx: &RunContext,
        timeout: Duration,
        since: u64,
        scope: &WorkloadScope,
    ) -> RecommendResult<usize> {
        let (deadline, cause) = wait_deadline(ctx, timeout);

        let mut polls = 0u32;
        loop {
            self.pause(ctx, deadline).await?;

            polls += 1;
            let unscheduled = self.unscheduled_count(since, scope)?;
            if unscheduled == 0 {
                debug!(polls, ?scope, "workload converged");
                return Ok(0);
            }
            if Instant::now() >= deadline {
                warn!(polls, unscheduled, %cause, ?scope, "convergence wait timed out");
                return Err(RecommendError::Timeout { cause, unscheduled });
            }
            debug!(polls, unscheduled, "waiting for placement to settle");
        }
    }

    /// In-scope unassigned workload split into (not yet reported on,
    /// failing) relative to `since`.
    pub fn report_status(&self, since: u64, scope: &WorkloadScope) -> RecommendResult<(usize, usize)> {
        let reported: HashSet<String> = self
            .store
            .list_placement_failure_events()?
            .into_iter()
            .filter(|e| e.timestamp >= since)
            .map(|e| e.workload)
            .collect();

        let (mut unreported, mut failing) = (0, 0);
        for w in self.store.list_workload()? {
            if w.is_assigned() || !scope.matches(&w) {
                continue;
            }
            if reported.contains(&w.name) {
                failing += 1;
            } else {
                unreported += 1;
            }
        }
        Ok((unreported, failing))
    }

    /// Poll until the placement engine has acted on every in-scope unit:
    /// each one is either assigned or has failed placement since `since`.
    ///
    /// Returns how many are failing. Bounded like
    /// [`wait_for_convergence`](Self::wait_for_convergence); the timeout
    /// carries the number still unreported.
    pub async fn wait_until_reported(
        &self,
        ctx: &RunContext,
        timeout: Duration,
        since: u64,
        scope: &WorkloadScope,
    ) -> RecommendResult<usize> {
        let (deadline, cause) = wait_deadline(ctx, timeout);

        let mut polls = 0u32;
        loop {
            self.pause(ctx, deadline).await?;

            polls += 1;
            let (unreported, failing) = self.report_status(since, scope)?;
            if unreported == 0 {
                debug!(polls, failing, ?scope, "placement reported on all workload");
                return Ok(failing);
            }
            if Instant::now() >= deadline {
                warn!(polls, unreported, %cause, ?scope, "placement report wait timed out");
                return Err(RecommendError::Timeout {
                    cause,
                    unscheduled: unreported,
                });
            }
            debug!(polls, unreported, "waiting for placement to react");
        }
    }

    /// Sleep one interval (clamped to `deadline`) unless the run is cancelled.
    async fn pause(&self, ctx: &RunContext, deadline: Instant) -> RecommendResult<()> {
        let next = (Instant::now() + self.poll_interval).min(deadline);
        tokio::select! {
            _ = tokio::time::sleep_until(next) => Ok(()),
            _ = ctx.cancelled() => Err(RecommendError::Cancelled),
        }
    }
}

/// `min(now + timeout, run deadline)` and which of the two it is.
fn wait_deadline(ctx: &RunContext, timeout: Duration) -> (Instant, StopCause) {
    let wait_deadline = Instant::now() + timeout;
    if ctx.deadline() < wait_deadline {
        (ctx.deadline(), StopCause::RunDeadline)
    } else {
        (wait_deadline, StopCause::WaitDeadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scaleprobe_placement::{Placer, SimulatedCluster};
    use scaleprobe_state::*;
    use std::collections::BTreeMap;

    fn unit(name: &str, mem_gi: u64) -> CapacityUnit {
        CapacityUnit {
            name: name.to_string(),
            labels: BTreeMap::new(),
            allocatable: Resources::new(8000, mem_gi << 30),
            capacity: Resources::new(8000, mem_gi << 30),
            max_workload: 110,
            taints: Vec::new(),
            unschedulable: false,
            created_at: 0,
        }
    }

    fn pod(name: &str, mem_gi: u64, group: &str) -> WorkloadUnit {
        let mut w = WorkloadUnit::pending(name, Resources::new(100, mem_gi << 30));
        w.labels.insert("group".to_string(), group.to_string());
        w
    }

    fn setup() -> (Arc<SimulatedCluster>, ConvergenceWaiter) {
        let cluster = Arc::new(SimulatedCluster::in_memory(Placer::new()).unwrap());
        let waiter = ConvergenceWaiter::new(cluster.clone(), Duration::from_millis(5));
        (cluster, waiter)
    }

    fn ctx() -> RunContext {
        RunContext::with_timeout(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn converges_when_everything_fits() {
        let (cluster, waiter) = setup();
        cluster.add_units(&[unit("n1", 8)]).unwrap();
        let since = now_millis();
        cluster.create_workload(&[pod("a", 2, "x")]).unwrap();

        let n = waiter
            .wait_for_convergence(&ctx(), Duration::from_secs(1), since, &WorkloadScope::All)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn times_out_with_last_count() {
        let (cluster, waiter) = setup();
        cluster.add_units(&[unit("n1", 2)]).unwrap();
        let since = now_millis();
        cluster
            .create_workload(&[pod("a", 4, "x"), pod("b", 4, "x")])
            .unwrap();

        let err = waiter
            .wait_for_convergence(&ctx(), Duration::from_millis(30), since, &WorkloadScope::All)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecommendError::Timeout {
                cause: StopCause::WaitDeadline,
                unscheduled: 2
            }
        ));
    }

    #[tokio::test]
    async fn run_deadline_caps_the_wait() {
        let (cluster, waiter) = setup();
        cluster.create_workload(&[pod("a", 4, "x")]).unwrap();
        let short = RunContext::with_timeout(Duration::from_millis(20));

        let err = waiter
            .wait_for_convergence(&short, Duration::from_secs(30), 0, &WorkloadScope::All)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecommendError::Timeout {
                cause: StopCause::RunDeadline,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failures_before_since_are_ignored() {
        let (cluster, waiter) = setup();
        cluster.create_workload(&[pod("old", 4, "x")]).unwrap();
        let since = now_millis() + 1;

        assert_eq!(waiter.unscheduled_count(since, &WorkloadScope::All).unwrap(), 0);
        assert_eq!(waiter.unscheduled_count(0, &WorkloadScope::All).unwrap(), 1);
    }

    #[tokio::test]
    async fn placed_workload_is_not_double_counted() {
        let (cluster, waiter) = setup();
        cluster.create_workload(&[pod("a", 4, "x")]).unwrap();
        assert_eq!(waiter.unscheduled_count(0, &WorkloadScope::All).unwrap(), 1);

        // The failure event remains, but the workload is now placed.
        cluster.add_units(&[unit("n1", 8)]).unwrap();
        assert_eq!(cluster.list_placement_failure_events().unwrap().len(), 1);
        assert_eq!(waiter.unscheduled_count(0, &WorkloadScope::All).unwrap(), 0);
    }

    #[tokio::test]
    async fn scope_restricts_counted_workload() {
        let (cluster, waiter) = setup();
        cluster
            .create_workload(&[pod("a", 4, "x"), pod("b", 4, "y")])
            .unwrap();

        let only_y = WorkloadScope::label("group", "y");
        assert_eq!(waiter.unscheduled_count(0, &only_y).unwrap(), 1);
        assert_eq!(
            waiter
                .unscheduled_count(0, &WorkloadScope::label("group", "z"))
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn longer_timeout_never_reports_less_than_converged_value() {
        let (cluster, waiter) = setup();
        cluster.add_units(&[unit("n1", 4)]).unwrap();
        let since = now_millis();
        cluster
            .create_workload(&[pod("a", 2, "x"), pod("b", 3, "x")])
            .unwrap();

        let mut counts = Vec::new();
        for ms in [20, 60] {
            match waiter
                .wait_for_convergence(&ctx(), Duration::from_millis(ms), since, &WorkloadScope::All)
                .await
            {
                Err(RecommendError::Timeout { unscheduled, .. }) => counts.push(unscheduled),
                other => panic!("expected timeout, got {other:?}"),
            }
        }
        assert_eq!(counts, vec![1, 1]);
    }

    #[tokio::test]
    async fn shutdown_aborts_wait() {
        let (cluster, waiter) = setup();
        cluster.create_workload(&[pod("a", 4, "x")]).unwrap();
        let (tx, rx) = tokio::sync::watch::channel(false);
        let ctx = ctx().with_shutdown(rx);

        let wait = waiter.wait_for_convergence(&ctx, Duration::from_secs(30), 0, &WorkloadScope::All);
        tx.send(true).unwrap();
        assert!(matches!(wait.await, Err(RecommendError::Cancelled)));
    }

    #[tokio::test]
    async fn reported_failures_end_the_report_wait() {
        let (cluster, waiter) = setup();
        cluster.add_units(&[unit("n1", 4)]).unwrap();
        let since = now_millis();
        cluster
            .create_workload(&[pod("fits", 2, "x"), pod("too-big", 8, "x")])
            .unwrap();

        assert_eq!(waiter.report_status(since, &WorkloadScope::All).unwrap(), (0, 1));
        let failing = waiter
            .wait_until_reported(&ctx(), Duration::from_secs(1), since, &WorkloadScope::All)
            .await
            .unwrap();
        assert_eq!(failing, 1);
    }

    #[tokio::test]
    async fn unreported_workload_times_out_the_report_wait() {
        let (cluster, waiter) = setup();
        cluster.add_units(&[unit("n1", 4)]).unwrap();
        let since = now_millis();
        let mut ignored = pod("ignored", 1, "x");
        ignored.scheduler_name = "not-served".to_string();
        cluster.create_workload(&[ignored]).unwrap();

        assert_eq!(waiter.report_status(since, &WorkloadScope::All).unwrap(), (1, 0));
        let err = waiter
            .wait_until_reported(&ctx(), Duration::from_millis(30), since, &WorkloadScope::All)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecommendError::Timeout {
                cause: StopCause::WaitDeadline,
                unscheduled: 1
            }
        ));
    }
}
