//! Process-wide counters for session and statement outcomes.
//!
//! Counters are shared between the query loop and the heartbeat task, so
//! every field is atomic. A [`Metrics`] instance is owned by the session
//! driver and handed to collaborators explicitly.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;

/// Metric name for sessions currently being driven.
pub const SESSION_RUNNING: &str = "session.running.count";
/// Metric name for sessions that completed cleanly.
pub const SESSION_SUCCESS: &str = "session.success.count";
/// Metric name for sessions that ended failed.
pub const SESSION_FAILED: &str = "session.failed.count";
/// Metric name for statements currently executing.
pub const STATEMENT_RUNNING: &str = "statement.running.count";
/// Metric name for succeeded statements.
pub const STATEMENT_SUCCESS: &str = "statement.success.count";
/// Metric name for failed statements.
pub const STATEMENT_FAILED: &str = "statement.failed.count";
/// Metric name for heartbeat writes that raised.
pub const HEARTBEAT_FAILED: &str = "heartbeat.failed.count";
/// Metric name for query-loop restarts after connectivity failures.
pub const SESSION_RETRY: &str = "session.retry.count";

/// Atomic counter set.
#[derive(Debug, Default)]
pub struct Metrics {
    session_running: AtomicI64,
    session_success: AtomicI64,
    session_failed: AtomicI64,
    statement_running: AtomicI64,
    statement_success: AtomicI64,
    statement_failed: AtomicI64,
    heartbeat_failed: AtomicI64,
    session_retry: AtomicI64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// `session.running.count`
    pub session_running: i64,
    /// `session.success.count`
    pub session_success: i64,
    /// `session.failed.count`
    pub session_failed: i64,
    /// `statement.running.count`
    pub statement_running: i64,
    /// `statement.success.count`
    pub statement_success: i64,
    /// `statement.failed.count`
    pub statement_failed: i64,
    /// `heartbeat.failed.count`
    pub heartbeat_failed: i64,
    /// `session.retry.count`
    pub session_retry: i64,
}

impl Metrics {
    /// Create a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter registered under `name`. Unknown names are ignored.
    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    /// Decrement the counter registered under `name`. Unknown names are ignored.
    pub fn decrement(&self, name: &str) {
        self.add(name, -1);
    }

    /// Current value of the counter registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> i64 {
        self.counter(name)
            .map_or(0, |counter| counter.load(Ordering::SeqCst))
    }

    /// Copy every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            session_running: self.session_running.load(Ordering::SeqCst),
            session_success: self.session_success.load(Ordering::SeqCst),
            session_failed: self.session_failed.load(Ordering::SeqCst),
            statement_running: self.statement_running.load(Ordering::SeqCst),
            statement_success: self.statement_success.load(Ordering::SeqCst),
            statement_failed: self.statement_failed.load(Ordering::SeqCst),
            heartbeat_failed: self.heartbeat_failed.load(Ordering::SeqCst),
            session_retry: self.session_retry.load(Ordering::SeqCst),
        }
    }

    fn add(&self, name: &str, delta: i64) {
        if let Some(counter) = self.counter(name) {
            counter.fetch_add(delta, Ordering::SeqCst);
        } else {
            tracing::debug!(name, "ignoring unknown metric");
        }
    }

    fn counter(&self, name: &str) -> Option<&AtomicI64> {
        match name {
            SESSION_RUNNING => Some(&self.session_running),
            SESSION_SUCCESS => Some(&self.session_success),
            SESSION_FAILED => Some(&self.session_failed),
            STATEMENT_RUNNING => Some(&self.statement_running),
            STATEMENT_SUCCESS => Some(&self.statement_success),
            STATEMENT_FAILED => Some(&self.statement_failed),
            HEARTBEAT_FAILED => Some(&self.heartbeat_failed),
            SESSION_RETRY => Some(&self.session_retry),
            _ => None,
        }
    }
}
