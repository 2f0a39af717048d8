//! The fetch-verify-execute-finalize loop.
//!
//! One [`QueryLoop::run`] call is one attempt under the retry policy. Each
//! run starts from fresh [`LoopState`], spawns its own execution worker and
//! destination probe, and tears the worker down before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::Result;

use super::execution_worker::ExecutionWorker;
use super::statement_processor::StatementProcessor;
use super::verification::VerificationCache;
use super::ExecutionContext;

/// Why a loop run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// No work arrived within the inactivity window.
    Idle,
    /// Another owner has taken the session; the early-exit flag is set.
    OwnershipLost,
}

/// Mutable state owned by one loop run.
pub struct LoopState {
    /// Last time a statement finished (or the run started).
    pub last_activity: Instant,
    /// When ownership was last evaluated against the store.
    pub last_ownership_check: Option<Instant>,
    /// Outcome of the last ownership evaluation.
    pub owns_session: bool,
    /// Destination-ready cache for this run.
    pub verification: VerificationCache,
    /// Cleared when the loop must stop regardless of pending work.
    pub can_continue: bool,
}

impl LoopState {
    /// Initial state: active now, ownership unchecked, verification pending.
    #[must_use]
    pub fn new(verification: VerificationCache) -> Self {
        Self {
            last_activity: Instant::now(),
            last_ownership_check: None,
            owns_session: true,
            verification,
            can_continue: true,
        }
    }
}

/// Drives statements for one session until idle or superseded.
pub struct QueryLoop<'a> {
    ctx: &'a ExecutionContext,
    metrics: &'a Metrics,
    early_exit: &'a AtomicBool,
}

impl<'a> QueryLoop<'a> {
    /// Create a loop over `ctx`, flagging `early_exit` on ownership loss.
    #[must_use]
    pub fn new(ctx: &'a ExecutionContext, metrics: &'a Metrics, early_exit: &'a AtomicBool) -> Self {
        Self {
            ctx,
            metrics,
            early_exit,
        }
    }

    /// Run the loop once.
    ///
    /// # Errors
    ///
    /// Returns any session-scoped error (store failures while fetching,
    /// checking ownership, or finalizing a statement). The execution worker
    /// is shut down on every path.
    pub async fn run(self) -> Result<LoopExit> {
        let worker = ExecutionWorker::spawn(Arc::clone(&self.ctx.engine));
        let mut state = LoopState::new(VerificationCache::start(Arc::clone(&self.ctx.writer)));

        let outcome = self.drive(&worker, &mut state).await;
        worker.shutdown().await;

        match &outcome {
            Ok(exit) => info!(session_id = %self.ctx.session_id, ?exit, "query loop finished"),
            Err(err) => warn!(session_id = %self.ctx.session_id, %err, "query loop aborted"),
        }
        outcome
    }

    async fn drive(&self, worker: &ExecutionWorker, state: &mut LoopState) -> Result<LoopExit> {
        let processor = StatementProcessor::new(self.ctx, worker, self.metrics);

        while state.can_continue && state.last_activity.elapsed() <= self.ctx.inactivity_limit {
            loop {
                if !self.check_ownership(state).await? {
                    self.early_exit.store(true, Ordering::SeqCst);
                    state.can_continue = false;
                    warn!(
                        session_id = %self.ctx.session_id,
                        job_id = %self.ctx.job_id,
                        "session no longer owned by this job, exiting early"
                    );
                    return Ok(LoopExit::OwnershipLost);
                }

                let Some(mut statement) =
                    self.ctx.store.get_next_statement(&self.ctx.session_id).await?
                else {
                    break;
                };

                processor
                    .process(&mut statement, &mut state.verification)
                    .await?;
                state.last_activity = Instant::now();
            }

            tokio::time::sleep(self.ctx.poll_interval).await;
        }

        debug!(
            session_id = %self.ctx.session_id,
            idle_secs = state.last_activity.elapsed().as_secs(),
            "inactivity limit reached"
        );
        Ok(LoopExit::Idle)
    }

    /// Re-evaluate ownership at most once per check interval.
    async fn check_ownership(&self, state: &mut LoopState) -> Result<bool> {
        let due = match state.last_ownership_check {
            Some(at) => at.elapsed() >= self.ctx.ownership_check_interval,
            None => true,
        };
        if !due {
            return Ok(state.owns_session);
        }

        let session = self.ctx.store.get_session(&self.ctx.session_id).await?;
        state.owns_session = session.is_some_and(|s| s.can_pick_next_statement(&self.ctx.job_id));
        state.last_ownership_check = Some(Instant::now());
        Ok(state.owns_session)
    }
}
