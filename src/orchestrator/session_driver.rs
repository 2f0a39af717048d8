//! Top-level session lifecycle.
//!
//! The driver claims the session, starts the heartbeat, runs the query loop
//! under the retry policy, and writes the terminal session state. The
//! heartbeat is stopped on every exit path. When the loop reports that
//! another owner took over, the terminal write is skipped entirely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};

use crate::metrics::{Metrics, SESSION_FAILED, SESSION_RETRY, SESSION_RUNNING, SESSION_SUCCESS};
use crate::models::session::Session;
use crate::store::UpdateMode;
use crate::Result;

use super::heartbeat::HeartbeatTask;
use super::query_loop::{LoopExit, QueryLoop};
use super::ExecutionContext;

/// How a session run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Loop went idle; session marked `Completed`.
    Completed,
    /// Loop aborted; session marked `Failed` with this reason.
    Failed(String),
    /// Another owner holds the session; no terminal state was written.
    Superseded,
}

/// Drives one session from claim to terminal state.
pub struct SessionDriver {
    ctx: Arc<ExecutionContext>,
    metrics: Arc<Metrics>,
    early_exit: Arc<AtomicBool>,
}

impl SessionDriver {
    /// Create a driver with its own counter set.
    #[must_use]
    pub fn new(ctx: Arc<ExecutionContext>) -> Self {
        Self::with_metrics(ctx, Arc::new(Metrics::new()))
    }

    /// Create a driver reporting into `metrics`.
    #[must_use]
    pub fn with_metrics(ctx: Arc<ExecutionContext>, metrics: Arc<Metrics>) -> Self {
        Self {
            ctx,
            metrics,
            early_exit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Counters updated by this driver and its components.
    #[must_use]
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Whether the last run detected that another owner took over or was
    /// not allowed to claim the session.
    #[must_use]
    pub fn early_exit(&self) -> bool {
        self.early_exit.load(Ordering::SeqCst)
    }

    /// Claim the session and drain its statements until idle or superseded.
    ///
    /// Loop failures are reported through [`SessionOutcome::Failed`], not as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the session cannot be claimed.
    pub async fn run(&self) -> Result<SessionOutcome> {
        let span = info_span!(
            "session",
            session_id = %self.ctx.session_id,
            job_id = %self.ctx.job_id
        );
        self.drive().instrument(span).await
    }

    async fn drive(&self) -> Result<SessionOutcome> {
        self.early_exit.store(false, Ordering::SeqCst);
        let Some(claimed) = self.claim().await? else {
            return Ok(SessionOutcome::Superseded);
        };

        self.metrics.increment(SESSION_RUNNING);
        let heartbeat = HeartbeatTask::new(
            Arc::clone(&self.ctx.store),
            self.ctx.session_id.clone(),
            self.ctx.heartbeat_interval,
            self.ctx.heartbeat_initial_delay,
            Arc::clone(&self.metrics),
        )
        .spawn();

        let looped = self
            .ctx
            .retry
            .run(|attempt| {
                if attempt > 1 {
                    self.metrics.increment(SESSION_RETRY);
                    info!(attempt, "restarting query loop");
                }
                QueryLoop::new(&self.ctx, &self.metrics, &self.early_exit).run()
            })
            .await;

        heartbeat.shutdown().await;
        self.metrics.decrement(SESSION_RUNNING);

        let outcome = self.finalize(claimed, looped).await;
        info!(?outcome, metrics = ?self.metrics.snapshot(), "session finished");
        Ok(outcome)
    }

    /// Load or create the session and mark it `Running` under this job.
    ///
    /// Returns `None` without writing when the stored session is already
    /// terminal or this job is excluded from it.
    async fn claim(&self) -> Result<Option<Session>> {
        let ctx = &self.ctx;
        if ctx.excluded_job_ids.contains(&ctx.job_id) {
            warn!("job is on its own exclusion list, not claiming");
            self.early_exit.store(true, Ordering::SeqCst);
            return Ok(None);
        }

        let mut session = match ctx.store.get_session(&ctx.session_id).await? {
            Some(existing) if existing.excluded_job_ids.contains(&ctx.job_id) => {
                warn!("job is excluded from this session, not claiming");
                self.early_exit.store(true, Ordering::SeqCst);
                return Ok(None);
            }
            Some(existing) => existing,
            None => Session::new(
                ctx.application_id.clone(),
                ctx.job_id.clone(),
                ctx.session_id.clone(),
            ),
        };

        if !session.claim(&ctx.application_id, &ctx.job_id, &ctx.excluded_job_ids) {
            warn!(
                state = session.state.as_str(),
                "session already finished, not claiming"
            );
            return Ok(None);
        }
        ctx.store.upsert_session(&session, UpdateMode::Upsert).await?;

        // Re-read so the terminal write is conditioned on the stored seq_no.
        let claimed = ctx.store.get_session(&ctx.session_id).await?.unwrap_or(session);
        info!(seq_no = claimed.seq_no, "session claimed");
        Ok(Some(claimed))
    }

    /// Write the terminal state unless another owner took over.
    async fn finalize(&self, mut session: Session, looped: Result<LoopExit>) -> SessionOutcome {
        if self.early_exit() || matches!(looped, Ok(LoopExit::OwnershipLost)) {
            info!("session superseded, skipping terminal write");
            return SessionOutcome::Superseded;
        }

        let outcome = match looped {
            Ok(_) => {
                session.complete();
                self.metrics.increment(SESSION_SUCCESS);
                SessionOutcome::Completed
            }
            Err(err) => {
                let reason = err.to_string();
                error!(%reason, "session failed");
                session.fail(reason.clone());
                self.metrics.increment(SESSION_FAILED);
                SessionOutcome::Failed(reason)
            }
        };

        match self
            .ctx
            .store
            .upsert_session(&session, UpdateMode::UpdateIfUnchanged)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("session record moved on, terminal state not written"),
            Err(err) => error!(%err, "failed to write terminal session state"),
        }
        outcome
    }
}
