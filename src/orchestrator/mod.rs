//! Session orchestration modules.
//!
//! Covers session claiming and finalization, the statement query loop,
//! per-statement execution, destination verification, heartbeat liveness,
//! and the connectivity retry wrapper.

pub mod execution_worker;
pub mod heartbeat;
pub mod query_loop;
pub mod retry;
pub mod session_driver;
pub mod statement_processor;
pub mod verification;

use std::sync::Arc;
use std::time::Duration;

use crate::config::GlobalConfig;
use crate::engine::QueryEngine;
use crate::registry::Collaborators;
use crate::store::MetadataStore;
use crate::writer::ResultWriter;

use self::retry::RetryPolicy;

/// Immutable configuration and collaborator bundle shared by every
/// orchestrator component.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Query engine statements run on.
    pub engine: Arc<dyn QueryEngine>,
    /// Session and statement record storage.
    pub store: Arc<dyn MetadataStore>,
    /// Result formatting and persistence.
    pub writer: Arc<dyn ResultWriter>,
    /// Application the session belongs to.
    pub application_id: String,
    /// Session being driven.
    pub session_id: String,
    /// This worker's job id.
    pub job_id: String,
    /// Data source statements run against.
    pub data_source: String,
    /// Exclusion list recorded when the session is claimed.
    pub excluded_job_ids: Vec<String>,
    /// Bound on one statement's engine call.
    pub query_execution_timeout: Duration,
    /// Loop exits once idle this long.
    pub inactivity_limit: Duration,
    /// Maximum queueing age before a statement is failed unexecuted.
    pub query_wait_limit: Duration,
    /// Sleep between idle iterations.
    pub poll_interval: Duration,
    /// Bound on awaiting the destination-ready probe per statement.
    pub verification_timeout: Duration,
    /// Minimum spacing between ownership re-checks.
    pub ownership_check_interval: Duration,
    /// Period between heartbeats.
    pub heartbeat_interval: Duration,
    /// Delay before the first heartbeat.
    pub heartbeat_initial_delay: Duration,
    /// Outer retry policy around the query loop.
    pub retry: RetryPolicy,
}

impl ExecutionContext {
    /// Build a context from loaded configuration and resolved collaborators.
    #[must_use]
    pub fn from_config(config: &GlobalConfig, collaborators: Collaborators) -> Self {
        Self {
            engine: collaborators.engine,
            store: collaborators.store,
            writer: collaborators.writer,
            application_id: config.session.application_id.clone(),
            session_id: config.session.session_id.clone(),
            job_id: config.session.job_id.clone(),
            data_source: config.session.data_source.clone(),
            excluded_job_ids: config.session.excluded_job_ids.clone(),
            query_execution_timeout: config.query_execution_timeout(),
            inactivity_limit: config.inactivity_limit(),
            query_wait_limit: config.query_wait_limit(),
            poll_interval: config.poll_interval(),
            verification_timeout: config.verification_timeout(),
            ownership_check_interval: config.ownership_check_interval(),
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_initial_delay: config.heartbeat_initial_delay(),
            retry: RetryPolicy::new(config.retry.max_retries, config.retry_initial_delay()),
        }
    }
}
