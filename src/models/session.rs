//! Session model and lifecycle helpers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state for an interactive session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Record exists but no worker has claimed it yet.
    NotStarted,
    /// A worker is draining the statement queue.
    Running,
    /// Worker exited cleanly.
    Completed,
    /// Worker exited on an unrecoverable error.
    Failed,
}

impl SessionState {
    /// Whether no further transitions are permitted.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Session domain entity persisted in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Application the session belongs to.
    pub application_id: String,
    /// Job id of the worker that last claimed the session.
    pub job_id: String,
    /// Unique session identifier.
    pub session_id: String,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Creation timestamp.
    pub create_time: DateTime<Utc>,
    /// Last write timestamp; heartbeats advance it.
    pub last_update_time: DateTime<Utc>,
    /// Failure reason for `Failed` sessions.
    pub error: Option<String>,
    /// Job ids that must not drive this session.
    pub excluded_job_ids: BTreeSet<String>,
    /// Write sequence number; bumped by every non-heartbeat write.
    pub seq_no: i64,
}

impl Session {
    /// Construct a fresh, unclaimed session record.
    #[must_use]
    pub fn new(application_id: String, job_id: String, session_id: String) -> Self {
        let now = Utc::now();
        Self {
            application_id,
            job_id,
            session_id,
            state: SessionState::NotStarted,
            create_time: now,
            last_update_time: now,
            error: None,
            excluded_job_ids: BTreeSet::new(),
            seq_no: 0,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    ///
    /// `Running -> Running` is a re-claim by a new owner.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self.state, next),
            (
                SessionState::NotStarted | SessionState::Running,
                SessionState::Running
            ) | (
                SessionState::Running,
                SessionState::Completed | SessionState::Failed
            )
        )
    }

    /// Whether the worker identified by `job_id` may dequeue statements.
    ///
    /// Fails if another job is recorded as owner, or if `job_id` has been
    /// placed on the exclusion list.
    #[must_use]
    pub fn can_pick_next_statement(&self, job_id: &str) -> bool {
        if !self.job_id.is_empty() && self.job_id != job_id {
            return false;
        }
        !self.excluded_job_ids.contains(job_id)
    }

    /// Claim the session for `job_id`, recording the exclusion list.
    ///
    /// Returns `false` and leaves the record untouched once it is terminal.
    pub fn claim(&mut self, application_id: &str, job_id: &str, excluded: &[String]) -> bool {
        if !self.can_transition_to(SessionState::Running) {
            return false;
        }
        self.application_id = application_id.to_owned();
        self.job_id = job_id.to_owned();
        self.state = SessionState::Running;
        self.error = None;
        self.excluded_job_ids = excluded.iter().cloned().collect();
        self.last_update_time = Utc::now();
        true
    }

    /// Mark the session completed; ignored unless running.
    pub fn complete(&mut self) {
        if self.can_transition_to(SessionState::Completed) {
            self.state = SessionState::Completed;
            self.last_update_time = Utc::now();
        }
    }

    /// Mark the session failed with `reason`; ignored unless running.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.can_transition_to(SessionState::Failed) {
            self.state = SessionState::Failed;
            self.error = Some(reason.into());
            self.last_update_time = Utc::now();
        }
    }
}
