//! Query engine abstraction.
//!
//! The engine runs one query under a caller-chosen job id. The job id is the
//! only handle for cancellation, so it must be unique per execution.

pub mod sqlite_engine;

use std::future::Future;
use std::pin::Pin;

use crate::models::result::QueryResult;
use crate::Result;

/// Executes queries and cancels them by job id.
pub trait QueryEngine: Send + Sync {
    /// Run `query` under `job_id` and return its tabular output.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the query fails
    /// or is cancelled.
    fn execute(
        &self,
        query: String,
        job_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<QueryResult>> + Send + '_>>;

    /// Request best-effort cancellation of `job_id`.
    ///
    /// Idempotent: cancelling an unknown or finished job returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Implementations may surface transport failures.
    fn cancel<'a>(&'a self, job_id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Turn an engine failure into the message recorded on the statement.
#[must_use]
pub fn classify_error(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("syntax error") || lower.contains("incomplete input") {
        format!("Syntax error: {message}")
    } else if lower.contains("no such table")
        || lower.contains("no such column")
        || lower.contains("no such function")
    {
        format!("Fail to analyze query. Cause: {message}")
    } else {
        format!("Fail to run query. Cause: {message}")
    }
}
