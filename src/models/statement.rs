//! Statement model: one submitted query and its execution state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state for a statement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatementState {
    /// Queued, not yet dispatched.
    Waiting,
    /// Dispatched to this worker.
    Running,
    /// Executed and its result persisted.
    Succeeded,
    /// Failed for any reason; `error` carries it.
    Failed,
}

impl StatementState {
    /// Whether no further transitions are permitted.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Statement domain entity persisted in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Statement {
    /// Unique statement identifier.
    pub statement_id: String,
    /// Session whose queue the statement sits in.
    pub session_id: String,
    /// Engine job id used to execute and cancel this statement.
    pub query_id: String,
    /// Query text.
    pub query: String,
    /// Current lifecycle state.
    pub state: StatementState,
    /// When the statement was submitted.
    pub submit_time: DateTime<Utc>,
    /// When this worker started processing it.
    pub query_start_time: Option<DateTime<Utc>>,
    /// Failure reason for `Failed` statements.
    pub error: Option<String>,
}

impl Statement {
    /// Construct a new waiting statement with generated identifiers.
    #[must_use]
    pub fn new(session_id: String, query: String) -> Self {
        Self {
            statement_id: Uuid::new_v4().to_string(),
            session_id,
            query_id: Uuid::new_v4().to_string(),
            query,
            state: StatementState::Waiting,
            submit_time: Utc::now(),
            query_start_time: None,
            error: None,
        }
    }

    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: StatementState) -> bool {
        matches!(
            (self.state, next),
            (
                StatementState::Waiting | StatementState::Running,
                StatementState::Running | StatementState::Failed
            ) | (StatementState::Running, StatementState::Succeeded)
        )
    }

    /// Record that processing started now.
    pub fn start(&mut self) {
        if self.can_transition_to(StatementState::Running) {
            self.state = StatementState::Running;
        }
        self.query_start_time = Some(Utc::now());
    }

    /// Mark succeeded; ignored once terminal.
    pub fn complete(&mut self) {
        if self.can_transition_to(StatementState::Succeeded) {
            self.state = StatementState::Succeeded;
        }
    }

    /// Mark failed with `reason`; ignored once terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.can_transition_to(StatementState::Failed) {
            self.state = StatementState::Failed;
            self.error = Some(reason.into());
        }
    }

    /// Time spent in the queue as of `now`.
    #[must_use]
    pub fn waited(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.submit_time
    }
}
