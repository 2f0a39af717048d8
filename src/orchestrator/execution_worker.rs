//! Dedicated single-worker execution context for engine calls.
//!
//! Every query submission goes through one long-lived task, so engine job
//! submission always happens from the same place. Cancellation by job id
//! may be issued from the query loop while the worker is busy; the job id
//! is what scopes the cancellation target.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::engine::QueryEngine;
use crate::models::result::QueryResult;
use crate::{AppError, Result};

const QUEUE_DEPTH: usize = 8;

/// Receiver for the outcome of one submitted execution.
pub type ExecutionReply = oneshot::Receiver<Result<QueryResult>>;

struct ExecutionRequest {
    query: String,
    job_id: String,
    reply: oneshot::Sender<Result<QueryResult>>,
}

/// Handle to the worker task.
pub struct ExecutionWorker {
    tx: mpsc::Sender<ExecutionRequest>,
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for ExecutionWorker {
    /// Stop the worker task when the handle is dropped.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ExecutionWorker {
    /// Spawn the worker task over `engine`.
    #[must_use]
    pub fn spawn(engine: Arc<dyn QueryEngine>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        let join_handle = tokio::spawn(
            Self::run(engine, rx, cancel.clone()).instrument(info_span!("execution_worker")),
        );
        Self {
            tx,
            cancel,
            join_handle: Some(join_handle),
        }
    }

    async fn run(
        engine: Arc<dyn QueryEngine>,
        mut rx: mpsc::Receiver<ExecutionRequest>,
        cancel: CancellationToken,
    ) {
        loop {
            let request = tokio::select! {
                () = cancel.cancelled() => break,
                maybe_request = rx.recv() => {
                    if let Some(request) = maybe_request { request } else { break }
                }
            };

            let ExecutionRequest {
                query,
                job_id,
                reply,
            } = request;
            debug!(%job_id, "execution started");

            let outcome = tokio::select! {
                () = cancel.cancelled() => {
                    Err(AppError::Engine(format!("job {job_id} abandoned at worker shutdown")))
                }
                outcome = engine.execute(query, job_id.clone()) => outcome,
            };

            // The submitter may have given up on a timeout already.
            if reply.send(outcome).is_err() {
                debug!(%job_id, "execution result discarded, submitter stopped waiting");
            }
        }
        debug!("execution worker stopped");
    }

    /// Queue `query` for execution under `job_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Engine` if the worker has stopped.
    pub async fn submit(&self, query: String, job_id: String) -> Result<ExecutionReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ExecutionRequest {
                query,
                job_id,
                reply,
            })
            .await
            .map_err(|_| AppError::Engine("execution worker is not running".into()))?;
        Ok(rx)
    }

    /// Stop accepting work, abandon the in-flight job, and wait for exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            if let Err(err) = handle.await {
                warn!(%err, "execution worker ended abnormally");
            }
        }
        info!("execution worker shut down");
    }
}
