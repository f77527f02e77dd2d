//! Run context — deadline and shutdown signal for one recommendation run.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{RecommendError, RecommendResult, StopCause};

/// Governs early termination of a run.
///
/// Every convergence wait is bounded by the run deadline, and a `true`
/// on the shutdown channel aborts the run at the next suspension point.
/// So does the caller going away while the run continues on its own task.
#[derive(Debug, Clone)]
pub struct RunContext {
    deadline: Instant,
    shutdown: Option<watch::Receiver<bool>>,
    abandoned: Option<watch::Receiver<bool>>,
}

impl RunContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            shutdown: None,
            abandoned: None,
        }
    }

    /// Abort the run when `true` is sent on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Also abort when the caller drops the paired [`AbandonGuard`].
    pub(crate) fn with_abandon(mut self, abandoned: watch::Receiver<bool>) -> Self {
        self.abandoned = Some(abandoned);
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        [&self.shutdown, &self.abandoned]
            .into_iter()
            .flatten()
            .any(|rx| *rx.borrow())
    }

    /// Fail fast if the run was cancelled or has run out of time.
    pub fn check(&self) -> RecommendResult<()> {
        if self.is_cancelled() {
            return Err(RecommendError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(RecommendError::Timeout {
                cause: StopCause::RunDeadline,
                unscheduled: 0,
            });
        }
        Ok(())
    }

    /// Resolves once shutdown or abandonment is signalled.
    pub async fn cancelled(&self) {
        tokio::select! {
            _ = signalled(self.shutdown.clone()) => {}
            _ = signalled(self.abandoned.clone()) => {}
        }
    }
}

/// Resolves when `true` is seen; never resolves without a channel.
async fn signalled(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: the signal can no longer be sent.
            return std::future::pending().await;
        }
    }
}

/// Held by the caller of a detached run; dropping it cancels the run.
pub(crate) struct AbandonGuard(watch::Sender<bool>);

impl AbandonGuard {
    pub(crate) fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), rx)
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let _ = self.0.send(true);
    }
}
