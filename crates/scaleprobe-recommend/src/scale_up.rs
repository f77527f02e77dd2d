//! Scale-up recommender — trial-and-score rounds.
//!
//! Each round provisions one trial unit per eligible pool (concurrently),
//! submits a pinned copy of the unplaced workload to each, waits for the
//! round to settle, scores every trial and commits the best one as a
//! permanent unit. All trial artifacts of a round are removed before the
//! next round starts, on every exit path.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use scaleprobe_core::{EngineSettings, PriceTable};
use scaleprobe_state::{
    CapacityPool, CapacityUnit, ClusterStore, WorkloadUnit, labels, now_millis,
};

use crate::context::RunContext;
use crate::convergence::{ConvergenceWaiter, WorkloadScope};
use crate::error::{RecommendError, RecommendResult, StopCause};
use crate::pools::PoolEnumerator;
use crate::scorer::{OutcomeScorer, ScoreWeights, TrialOutcome, select_winner};
use crate::trial::{TrialGuard, TrialTag, generate_name, permanent_unit, trial_copies};

/// How a scale-up run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleUpOutcome {
    /// Nothing was unplaced when the run started.
    #[default]
    AlreadySatisfied,
    /// All workload placed after the recommended additions.
    Converged,
    /// No pool can grow any further.
    CapacityExhausted,
    /// A round ended with no trial absorbing any workload.
    NoWinner,
    /// `max_rounds` reached with workload still unplaced.
    RoundLimit,
}

/// Units to add, keyed by `pool/zone`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recommendation {
    pub additions: BTreeMap<String, u32>,
    pub outcome: ScaleUpOutcome,
    pub rounds: u32,
}

impl Recommendation {
    pub fn total(&self) -> u32 {
        self.additions.values().sum()
    }
}

struct Trial {
    unit: CapacityUnit,
    tag: TrialTag,
}

pub struct ScaleUpRecommender {
    store: Arc<dyn ClusterStore>,
    enumerator: PoolEnumerator,
    waiter: ConvergenceWaiter,
    scorer: OutcomeScorer,
    settings: EngineSettings,
}

impl ScaleUpRecommender {
    pub fn new(store: Arc<dyn ClusterStore>, prices: Arc<PriceTable>, settings: EngineSettings) -> Self {
        Self {
            enumerator: PoolEnumerator::new(store.clone()),
            waiter: ConvergenceWaiter::new(store.clone(), settings.poll_interval()),
            scorer: OutcomeScorer::new(prices),
            store,
            settings,
        }
    }

    /// Run rounds until all workload is placed or no round can help.
    ///
    /// Trial provisioning runs on blocking tasks that cannot be stopped
    /// once started, so this future must be driven to completion; callers
    /// that may go away use [`Recommender::run_scale_up`](crate::Recommender::run_scale_up).
    pub async fn run(
        &self,
        ctx: &RunContext,
        weights: &ScoreWeights,
        pools: &[CapacityPool],
    ) -> RecommendResult<Recommendation> {
        let mut recommendation = Recommendation::default();
        let mut unplaced = self.unplaced()?;
        if unplaced.is_empty() {
            info!("no unplaced workload, nothing to recommend");
            return Ok(recommendation);
        }

        let run_id = generate_name("run");
        info!(run = %run_id, unplaced = unplaced.len(), pools = pools.len(), "scale-up run started");

        for round_no in 1..=self.settings.max_rounds {
            ctx.check()?;
            recommendation.rounds = round_no;

            let eligible = self.enumerator.eligible_pools(pools)?;
            if eligible.is_empty() {
                info!(run = %run_id, round = round_no, "no eligible pools left");
                recommendation.outcome = ScaleUpOutcome::CapacityExhausted;
                return Ok(recommendation);
            }

            let round = format!("{run_id}-r{round_no}");
            let mut guard = TrialGuard::new(self.store.clone(), labels::ROUND, &round);
            let since = now_millis();

            let trials = self.fan_out(&eligible, &round, unplaced).await?;
            if trials.is_empty() {
                info!(run = %run_id, round = round_no, "no pool could provision a trial unit");
                guard.purge()?;
                recommendation.outcome = ScaleUpOutcome::CapacityExhausted;
                return Ok(recommendation);
            }
            info!(round = %round, trials = trials.len(), "trial units submitted");

            self.await_round(ctx, &round, since, !recommendation.additions.is_empty())
                .await?;

            let outcomes = self.score_round(weights, pools, &round, &trials)?;
            let Some(winner) = select_winner(&outcomes) else {
                info!(round = %round, "no trial absorbed any workload");
                guard.purge()?;
                recommendation.outcome = ScaleUpOutcome::NoWinner;
                return Ok(recommendation);
            };

            let permanent = trials
                .iter()
                .find(|t| t.unit.name == winner.unit)
                .map(|t| permanent_unit(&t.unit))
                .ok_or_else(|| RecommendError::Task(format!("winning unit {} vanished", winner.unit)))?;

            guard.purge()?;
            let committed_at = now_millis();
            self.store.add_units(std::slice::from_ref(&permanent))?;
            *recommendation
                .additions
                .entry(winner.pool_zone.clone())
                .or_insert(0) += 1;
            info!(
                round = %round,
                pool_zone = %winner.pool_zone,
                unit = %permanent.name,
                score = winner.cumulative_score,
                "trial committed"
            );

            self.await_commit(ctx, committed_at).await?;
            unplaced = self.unplaced()?;
            if unplaced.is_empty() {
                recommendation.outcome = ScaleUpOutcome::Converged;
                info!(run = %run_id, added = recommendation.total(), "scale-up converged");
                return Ok(recommendation);
            }
            debug!(round = %round, remaining = unplaced.len(), "workload still unplaced");
        }

        warn!(run = %run_id, max_rounds = self.settings.max_rounds, "round limit reached");
        recommendation.outcome = ScaleUpOutcome::RoundLimit;
        Ok(recommendation)
    }

    /// Unassigned, non-trial workload.
    fn unplaced(&self) -> RecommendResult<Vec<WorkloadUnit>> {
        Ok(self
            .store
            .list_workload()?
            .into_iter()
            .filter(|w| !w.is_assigned() && !w.is_trial())
            .collect())
    }

    /// Provision and submit one trial per pool; all tasks are joined
    /// before returning, and the first hard error wins.
    async fn fan_out(
        &self,
        eligible: &[CapacityPool],
        round: &str,
        unplaced: Vec<WorkloadUnit>,
    ) -> RecommendResult<Vec<Trial>> {
        let unplaced = Arc::new(unplaced);
        let mut tasks = JoinSet::new();

        for (index, pool) in eligible.iter().cloned().enumerate() {
            let enumerator = self.enumerator.clone();
            let store = self.store.clone();
            let unplaced = unplaced.clone();
            let scheduler = self.settings.trial_scheduler.clone();
            let tag = TrialTag::new(round, &pool.name);

            tasks.spawn_blocking(move || -> RecommendResult<Option<(usize, Trial)>> {
                let zone = enumerator.least_loaded_zone(&pool)?;
                let unit = match enumerator.provision_trial_unit(&pool, zone.as_deref(), &tag) {
                    Ok(Some(unit)) => unit,
                    Ok(None) => return Ok(None),
                    Err(RecommendError::NoTemplate(name)) => {
                        warn!(pool = %name, "pool has no template unit, skipping");
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                };
                store.create_workload(&trial_copies(&unplaced, &tag, &scheduler))?;
                Ok(Some((index, Trial { unit, tag })))
            });
        }

        let mut trials = Vec::new();
        let mut first_error: Option<RecommendError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Some(trial))) => trials.push(trial),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "trial provisioning failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(RecommendError::Task(e.to_string()));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        trials.sort_by_key(|(index, _)| *index);
        Ok(trials.into_iter().map(|(_, trial)| trial).collect())
    }

    /// Wait for the round's copies to settle.
    ///
    /// A round timeout is tolerated once anything has been placed, either
    /// in this round or by an earlier commit; partial scores are then
    /// still meaningful.
    async fn await_round(
        &self,
        ctx: &RunContext,
        round: &str,
        since: u64,
        committed_before: bool,
    ) -> RecommendResult<()> {
        let scope = WorkloadScope::label(labels::ROUND, round);
        let result = self
            .waiter
            .wait_for_convergence(ctx, self.settings.scale_up_round_timeout(), since, &scope)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(RecommendError::Timeout {
                cause: StopCause::WaitDeadline,
                unscheduled,
            }) => {
                let placed_this_round = self
                    .store
                    .list_workload()?
                    .iter()
                    .any(|w| w.has_label(labels::ROUND, round) && w.is_assigned());
                if placed_this_round || committed_before {
                    warn!(%round, unscheduled, "round timed out, scoring partial placement");
                    Ok(())
                } else {
                    Err(RecommendError::Timeout {
                        cause: StopCause::WaitDeadline,
                        unscheduled,
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Wait until the placement engine has reacted to a committed unit,
    /// so remaining workload is measured against the grown cluster.
    ///
    /// Timing out is tolerated: whatever is still pending is trialled in
    /// the next round.
    async fn await_commit(&self, ctx: &RunContext, since: u64) -> RecommendResult<()> {
        let result = self
            .waiter
            .wait_until_reported(ctx, self.settings.scale_up_round_timeout(), since, &WorkloadScope::All)
            .await;

        match result {
            Ok(failing) => {
                debug!(failing, "placement settled after commit");
                Ok(())
            }
            Err(RecommendError::Timeout {
                cause: StopCause::WaitDeadline,
                unscheduled,
            }) => {
                warn!(unreported = unscheduled, "placement did not settle after commit");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn score_round(
        &self,
        weights: &ScoreWeights,
        pools: &[CapacityPool],
        round: &str,
        trials: &[Trial],
    ) -> RecommendResult<Vec<TrialOutcome>> {
        let round_workload: Vec<WorkloadUnit> = self
            .store
            .list_workload()?
            .into_iter()
            .filter(|w| w.has_label(labels::ROUND, round))
            .collect();

        trials
            .iter()
            .map(|trial| {
                let own: Vec<WorkloadUnit> = round_workload
                    .iter()
                    .filter(|w| w.has_label(labels::TRIAL, &trial.tag.trial_id))
                    .cloned()
                    .collect();
                self.scorer.score(weights, &trial.unit, &own, pools)
            })
            .collect()
    }
}
