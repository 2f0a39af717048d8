//! End-to-end processing of one statement.
//!
//! Each statement goes through: wait-limit check, destination verification,
//! bounded execution with cancellation on timeout, result formatting, and
//! finalization. Finalization always runs: it persists any result, settles
//! the terminal state, emits metrics, and pushes the record to the store.
//! A result that executes fine but fails to persist leaves the statement
//! `Failed`.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::engine::classify_error;
use crate::metrics::{Metrics, STATEMENT_FAILED, STATEMENT_RUNNING, STATEMENT_SUCCESS};
use crate::models::result::{FormattedResult, QueryResult};
use crate::models::statement::{Statement, StatementState};
use crate::{AppError, Result};

use super::execution_worker::ExecutionWorker;
use super::verification::{Readiness, VerificationCache};
use super::ExecutionContext;

/// Outcome of the verify-and-execute stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Engine returned a result.
    Ok(QueryResult),
    /// A bounded wait expired.
    TimedOut(String),
    /// Statement failed for any other reason.
    Failed(String),
}

/// Processes statements against one execution context.
pub struct StatementProcessor<'a> {
    ctx: &'a ExecutionContext,
    worker: &'a ExecutionWorker,
    metrics: &'a Metrics,
}

impl<'a> StatementProcessor<'a> {
    /// Create a processor submitting engine work through `worker`.
    #[must_use]
    pub fn new(ctx: &'a ExecutionContext, worker: &'a ExecutionWorker, metrics: &'a Metrics) -> Self {
        Self {
            ctx,
            worker,
            metrics,
        }
    }

    /// Process `statement` to a terminal state and return the result that
    /// was handed to the writer, if any.
    ///
    /// Statement-scoped failures are recorded on the statement, never
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the final statement record cannot be
    /// written; the loop treats that as session-scoped.
    pub async fn process(
        &self,
        statement: &mut Statement,
        verification: &mut VerificationCache,
    ) -> Result<Option<FormattedResult>> {
        statement.start();
        self.metrics.increment(STATEMENT_RUNNING);
        info!(
            statement_id = %statement.statement_id,
            query_id = %statement.query_id,
            "processing statement"
        );

        if let Err(err) = self.ctx.store.update_statement(statement).await {
            warn!(statement_id = %statement.statement_id, %err, "failed to record statement start");
        }

        let outcome = self.verify_and_execute(statement, verification).await;
        let result = match outcome {
            ExecutionOutcome::Ok(raw) => match self.ctx.writer.format(raw, statement) {
                Ok(formatted) => Some(formatted),
                Err(err) => {
                    error!(statement_id = %statement.statement_id, %err, "failed to format result");
                    statement.fail(format!("Failed to format query result: {err}"));
                    None
                }
            },
            ExecutionOutcome::TimedOut(reason) | ExecutionOutcome::Failed(reason) => {
                error!(statement_id = %statement.statement_id, %reason, "statement failed");
                statement.fail(reason);
                None
            }
        };

        self.finalize(statement, result.as_ref()).await?;
        Ok(result)
    }

    /// Steps before finalization: wait limit, verification, execution.
    async fn verify_and_execute(
        &self,
        statement: &Statement,
        verification: &mut VerificationCache,
    ) -> ExecutionOutcome {
        let waited = statement.waited(Utc::now());
        let wait_limit = chrono::Duration::from_std(self.ctx.query_wait_limit)
            .unwrap_or(chrono::Duration::MAX);
        if waited > wait_limit {
            return ExecutionOutcome::Failed(format!(
                "Statement wait timeout: waited {}s in the queue, exceeding the {}s limit",
                waited.num_seconds(),
                self.ctx.query_wait_limit.as_secs()
            ));
        }

        match verification.await_ready(self.ctx.verification_timeout).await {
            Readiness::Ready => self.execute(statement).await,
            Readiness::Rejected(reason) => ExecutionOutcome::Failed(reason),
            Readiness::Pending(reason) => ExecutionOutcome::TimedOut(reason),
        }
    }

    /// Run the query on the worker, bounded by the execution timeout.
    async fn execute(&self, statement: &Statement) -> ExecutionOutcome {
        let job_id = statement.query_id.clone();
        let reply = match self
            .worker
            .submit(statement.query.clone(), job_id.clone())
            .await
        {
            Ok(reply) => reply,
            Err(err) => return ExecutionOutcome::Failed(failure_message(&err)),
        };

        let bound = self.ctx.query_execution_timeout;
        match tokio::time::timeout(bound, reply).await {
            Err(_) => {
                self.cancel(&job_id, bound).await;
                ExecutionOutcome::TimedOut(format!(
                    "Executing query {job_id} timed out after {}s",
                    bound.as_secs()
                ))
            }
            Ok(Err(_)) => ExecutionOutcome::Failed(
                "Execution worker stopped before returning a result".into(),
            ),
            Ok(Ok(Err(err))) => ExecutionOutcome::Failed(failure_message(&err)),
            Ok(Ok(Ok(result))) => {
                debug!(%job_id, rows = result.row_count(), "query executed");
                ExecutionOutcome::Ok(result)
            }
        }
    }

    /// Best-effort cancellation; the statement fails either way.
    async fn cancel(&self, job_id: &str, bound: Duration) {
        warn!(%job_id, bound_secs = bound.as_secs(), "execution timed out, cancelling job");
        if let Err(err) = self.ctx.engine.cancel(job_id).await {
            warn!(%job_id, %err, "job cancellation failed");
        }
    }

    /// Persist the result, settle the terminal state, and write the record.
    async fn finalize(
        &self,
        statement: &mut Statement,
        result: Option<&FormattedResult>,
    ) -> Result<()> {
        if let Some(result) = result {
            if let Err(err) = self.ctx.writer.persist(result, statement).await {
                error!(statement_id = %statement.statement_id, %err, "failed to persist result");
                statement.fail(format!("Failed to write query result: {err}"));
            }
        }

        if !statement.state.is_terminal() {
            statement.complete();
        }

        self.metrics.decrement(STATEMENT_RUNNING);
        match statement.state {
            StatementState::Succeeded => self.metrics.increment(STATEMENT_SUCCESS),
            _ => self.metrics.increment(STATEMENT_FAILED),
        }

        let written = self.ctx.store.update_statement(statement).await;
        info!(
            statement_id = %statement.statement_id,
            state = statement.state.as_str(),
            error = statement.error.as_deref().unwrap_or(""),
            "statement finalized"
        );
        written
    }
}

fn failure_message(err: &AppError) -> String {
    match err {
        AppError::Engine(msg) => classify_error(msg),
        other => classify_error(&other.to_string()),
    }
}
