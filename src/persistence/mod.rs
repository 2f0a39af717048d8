//! Persistence layer modules.

pub mod db;
pub mod result_repo;
pub mod schema;
pub mod session_repo;
pub mod sqlite_store;
pub mod statement_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
