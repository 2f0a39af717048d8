//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Identity of the session this worker drives.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Application the session belongs to.
    pub application_id: String,
    /// Job id of this worker process; recorded as the session owner.
    pub job_id: String,
    /// Logical interactive session to drain.
    pub session_id: String,
    /// Data source statements run against; recorded with every result.
    pub data_source: String,
    /// Job ids that must not drive this session.
    #[serde(default)]
    pub excluded_job_ids: Vec<String>,
}

/// Time bounds for the query loop and statement execution.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Loop exits once idle this long.
    #[serde(default = "default_inactivity_limit")]
    pub inactivity_limit_seconds: u64,
    /// Bound on one statement's engine call.
    #[serde(default = "default_query_execution_timeout")]
    pub query_execution_timeout_seconds: u64,
    /// Statements older than this at dispatch are failed without execution.
    #[serde(default = "default_query_wait_limit")]
    pub query_wait_limit_seconds: u64,
    /// Sleep between idle loop iterations.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_millis: u64,
    /// Bound on awaiting the destination-ready probe per statement.
    #[serde(default = "default_verification_timeout")]
    pub verification_timeout_seconds: u64,
    /// Minimum spacing between ownership re-checks.
    #[serde(default = "default_ownership_check_interval")]
    pub ownership_check_interval_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            inactivity_limit_seconds: default_inactivity_limit(),
            query_execution_timeout_seconds: default_query_execution_timeout(),
            query_wait_limit_seconds: default_query_wait_limit(),
            poll_interval_millis: default_poll_interval(),
            verification_timeout_seconds: default_verification_timeout(),
            ownership_check_interval_seconds: default_ownership_check_interval(),
        }
    }
}

fn default_inactivity_limit() -> u64 {
    1800
}

fn default_query_execution_timeout() -> u64 {
    1800
}

fn default_query_wait_limit() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    100
}

fn default_verification_timeout() -> u64 {
    60
}

fn default_ownership_check_interval() -> u64 {
    60
}

/// Heartbeat schedule.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HeartbeatConfig {
    /// Period between liveness writes.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_seconds: u64,
    /// Delay before the first liveness write.
    #[serde(default = "default_heartbeat_initial_delay")]
    pub initial_delay_seconds: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_heartbeat_interval(),
            initial_delay_seconds: default_heartbeat_initial_delay(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_heartbeat_initial_delay() -> u64 {
    3
}

/// Session-level retry on connectivity failures.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles afterwards.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_millis: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_millis: default_initial_delay(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    2000
}

/// Registry keys selecting collaborator implementations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CollaboratorConfig {
    /// Query engine implementation key.
    #[serde(default = "default_collaborator")]
    pub engine: String,
    /// Result writer implementation key.
    #[serde(default = "default_collaborator")]
    pub result_writer: String,
    /// Metadata store implementation key.
    #[serde(default = "default_collaborator")]
    pub metadata_store: String,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            engine: default_collaborator(),
            result_writer: default_collaborator(),
            metadata_store: default_collaborator(),
        }
    }
}

fn default_collaborator() -> String {
    "sqlite".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` file holding session and statement records.
    pub metadata_db: PathBuf,
    /// `SQLite` file statements execute against and results land in.
    pub data_source_db: PathBuf,
    /// Session identity.
    pub session: SessionConfig,
    /// Loop and execution bounds.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Heartbeat schedule.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// Outer retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Collaborator implementation selection.
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loop exits once idle this long.
    #[must_use]
    pub fn inactivity_limit(&self) -> Duration {
        Duration::from_secs(self.timeouts.inactivity_limit_seconds)
    }

    /// Bound on one statement's engine call.
    #[must_use]
    pub fn query_execution_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.query_execution_timeout_seconds)
    }

    /// Maximum queueing age before a statement is failed unexecuted.
    #[must_use]
    pub fn query_wait_limit(&self) -> Duration {
        Duration::from_secs(self.timeouts.query_wait_limit_seconds)
    }

    /// Sleep between idle loop iterations.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.poll_interval_millis)
    }

    /// Bound on awaiting the destination-ready probe.
    #[must_use]
    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.verification_timeout_seconds)
    }

    /// Minimum spacing between ownership re-checks.
    #[must_use]
    pub fn ownership_check_interval(&self) -> Duration {
        Duration::from_secs(self.timeouts.ownership_check_interval_seconds)
    }

    /// Period between liveness writes.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat.interval_seconds)
    }

    /// Delay before the first liveness write.
    #[must_use]
    pub fn heartbeat_initial_delay(&self) -> Duration {
        Duration::from_secs(self.heartbeat.initial_delay_seconds)
    }

    /// Backoff before the second loop attempt.
    #[must_use]
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry.initial_delay_millis)
    }

    /// Validate identities and bounds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        let ids = [
            ("session.application_id", &self.session.application_id),
            ("session.job_id", &self.session.job_id),
            ("session.session_id", &self.session.session_id),
            ("session.data_source", &self.session.data_source),
        ];
        for (name, value) in ids {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{name} must not be empty")));
            }
        }

        let bounds = [
            (
                "timeouts.inactivity_limit_seconds",
                self.timeouts.inactivity_limit_seconds,
            ),
            (
                "timeouts.query_execution_timeout_seconds",
                self.timeouts.query_execution_timeout_seconds,
            ),
            (
                "timeouts.query_wait_limit_seconds",
                self.timeouts.query_wait_limit_seconds,
            ),
            (
                "timeouts.poll_interval_millis",
                self.timeouts.poll_interval_millis,
            ),
            (
                "timeouts.verification_timeout_seconds",
                self.timeouts.verification_timeout_seconds,
            ),
            ("heartbeat.interval_seconds", self.heartbeat.interval_seconds),
        ];
        for (name, value) in bounds {
            if value == 0 {
                return Err(AppError::Config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.retry.max_retries == 0 {
            return Err(AppError::Config(
                "retry.max_retries must be greater than zero".into(),
            ));
        }

        if self
            .session
            .excluded_job_ids
            .iter()
            .any(|id| id == &self.session.job_id)
        {
            return Err(AppError::Config(
                "session.job_id is listed in session.excluded_job_ids".into(),
            ));
        }

        Ok(())
    }
}
