//! Metadata store abstraction for session and statement records.
//!
//! The [`MetadataStore`] trait is the single serialization point between
//! this worker, its heartbeat task, and any other worker that touches the
//! same session. Conflicting writers rely on [`UpdateMode::UpdateIfUnchanged`]
//! to avoid clobbering each other.

use std::future::Future;
use std::pin::Pin;

use crate::models::session::Session;
use crate::models::statement::Statement;
use crate::Result;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// How a session write treats the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Insert or overwrite unconditionally.
    Upsert,
    /// Overwrite only if the stored record has not moved on since it was
    /// read; otherwise silently do nothing.
    UpdateIfUnchanged,
}

/// Durable storage for session and statement records.
pub trait MetadataStore: Send + Sync {
    /// Load a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connectivity`](crate::AppError::Connectivity) if the
    /// store is unreachable or [`AppError::Db`](crate::AppError::Db) on other
    /// storage failures.
    fn get_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<Session>>;

    /// Write a session record. Returns whether the write was applied; an
    /// `UpdateIfUnchanged` write against a record that moved on returns
    /// `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) on storage failures.
    fn upsert_session<'a>(&'a self, session: &'a Session, mode: UpdateMode)
        -> StoreFuture<'a, bool>;

    /// Claim the oldest waiting statement of `session_id`, if any. A
    /// statement is never handed out twice.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) on storage failures.
    fn get_next_statement<'a>(&'a self, session_id: &'a str)
        -> StoreFuture<'a, Option<Statement>>;

    /// Persist a statement's state, error, and timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Db`](crate::AppError::Db) on storage failures.
    fn update_statement<'a>(&'a self, statement: &'a Statement) -> StoreFuture<'a, ()>;

    /// Advance the session's liveness timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) if the session
    /// record does not exist.
    fn record_heartbeat<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()>;
}
