//! Sticky verification cache around the one-shot destination probe.
//!
//! The probe is spawned once per loop run. Statements await it with a
//! bound; a timed-out wait leaves the cache `NotVerified` and the next
//! statement re-awaits the same in-flight probe rather than starting a
//! new one. Once an outcome is observed it never changes for the run.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::verification::VerificationResult;
use crate::writer::ResultWriter;
use crate::{AppError, Result};

/// What a statement should do after consulting the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Destination verified; execute.
    Ready,
    /// Destination broken; fail with this reason.
    Rejected(String),
    /// Probe still running after the bound; fail this statement as timed out.
    Pending(String),
}

/// Tri-state cache plus the handle of the in-flight probe.
pub struct VerificationCache {
    result: VerificationResult,
    probe: Option<JoinHandle<Result<()>>>,
}

impl VerificationCache {
    /// Spawn `writer.prepare()` as the run's probe.
    #[must_use]
    pub fn start(writer: Arc<dyn ResultWriter>) -> Self {
        let probe = tokio::spawn(async move { writer.prepare().await });
        Self::from_probe(probe)
    }

    /// Wrap an already-spawned probe.
    #[must_use]
    pub fn from_probe(probe: JoinHandle<Result<()>>) -> Self {
        Self {
            result: VerificationResult::NotVerified,
            probe: Some(probe),
        }
    }

    /// Current cached outcome.
    #[must_use]
    pub fn result(&self) -> &VerificationResult {
        &self.result
    }

    /// Fold an observed probe outcome into the cache. Has no effect once
    /// the cache is resolved.
    pub fn check(&mut self, outcome: Result<()>) -> &VerificationResult {
        if !self.result.is_resolved() {
            self.result = match outcome {
                Ok(()) => VerificationResult::VerifiedOk,
                Err(err) => VerificationResult::VerifiedError(rejection_reason(&err)),
            };
        }
        &self.result
    }

    /// Resolve readiness for the next statement, awaiting the probe for at
    /// most `bound` if its outcome is not known yet.
    pub async fn await_ready(&mut self, bound: Duration) -> Readiness {
        if !self.result.is_resolved() {
            let Some(probe) = self.probe.as_mut() else {
                return readiness(self.check(Err(AppError::Verification(
                    "destination probe was never started".into(),
                ))));
            };

            let Ok(joined) = tokio::time::timeout(bound, probe).await else {
                warn!(
                    bound_secs = bound.as_secs(),
                    "destination probe still running, failing statement"
                );
                return Readiness::Pending(format!(
                    "Timed out after {}s waiting for the result destination to be verified",
                    bound.as_secs()
                ));
            };

            self.probe = None;
            let outcome = joined.unwrap_or_else(|err| {
                Err(AppError::Verification(format!("destination probe aborted: {err}")))
            });
            match self.check(outcome) {
                VerificationResult::VerifiedError(reason) => {
                    warn!(%reason, "result destination verification failed");
                }
                _ => info!("result destination verified"),
            }
        }

        readiness(&self.result)
    }
}

fn readiness(result: &VerificationResult) -> Readiness {
    match result {
        VerificationResult::VerifiedOk => Readiness::Ready,
        VerificationResult::VerifiedError(reason) => Readiness::Rejected(reason.clone()),
        VerificationResult::NotVerified => {
            Readiness::Pending("result destination not verified yet".into())
        }
    }
}

fn rejection_reason(err: &AppError) -> String {
    match err {
        AppError::Verification(msg) => msg.clone(),
        other => other.to_string(),
    }
}
