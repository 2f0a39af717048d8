//! `SQLite` connection pools and schema bootstrap.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::{AppError, Result};

use super::schema;

/// Alias for the shared metadata database pool.
pub type Database = SqlitePool;

const MAX_CONNECTIONS: u32 = 4;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a pool on the `SQLite` file at `path`, creating it if missing.
/// No schema is applied.
///
/// # Errors
///
/// Returns `AppError::Db` if the directory or pool cannot be created.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| AppError::Db(format!("failed to create db dir: {err}")))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Open a single-connection in-memory pool. No schema is applied.
///
/// The connection is never recycled, since an in-memory database lives
/// and dies with its connection.
///
/// # Errors
///
/// Returns `AppError::Db` if the pool cannot be created.
pub async fn open_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Open the metadata database at `path` and apply its schema.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect(path: &Path) -> Result<Database> {
    let pool = open(path).await?;
    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}

/// In-memory metadata database with schema applied; used by tests.
///
/// # Errors
///
/// Returns `AppError::Db` if the connection or schema application fails.
pub async fn connect_memory() -> Result<Database> {
    let pool = open_memory().await?;
    schema::bootstrap_schema(&pool).await?;
    Ok(pool)
}
