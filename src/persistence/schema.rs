//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so it is safe to
//! re-run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the session and statement tables to the metadata database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS session (
    session_id       TEXT PRIMARY KEY NOT NULL,
    application_id   TEXT NOT NULL,
    job_id           TEXT NOT NULL,
    state            TEXT NOT NULL CHECK(state IN ('not_started','running','completed','failed')),
    create_time      TEXT NOT NULL,
    last_update_time TEXT NOT NULL,
    error            TEXT,
    excluded_job_ids TEXT NOT NULL DEFAULT '[]',
    seq_no           INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS statement (
    statement_id     TEXT PRIMARY KEY NOT NULL,
    session_id       TEXT NOT NULL,
    query_id         TEXT NOT NULL,
    query            TEXT NOT NULL,
    state            TEXT NOT NULL CHECK(state IN ('waiting','running','succeeded','failed')),
    submit_time      TEXT NOT NULL,
    query_start_time TEXT,
    error            TEXT
);

CREATE INDEX IF NOT EXISTS idx_statement_queue ON statement(session_id, state, submit_time);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}

/// Apply the result table to a destination database.
///
/// # Errors
///
/// Returns `AppError::Db` if the DDL statement fails.
pub async fn bootstrap_result_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS statement_result (
    statement_id          TEXT PRIMARY KEY NOT NULL,
    query_id              TEXT NOT NULL,
    session_id            TEXT NOT NULL,
    data_source           TEXT NOT NULL,
    schema                TEXT NOT NULL,
    rows                  TEXT NOT NULL,
    status                TEXT NOT NULL,
    error                 TEXT,
    query_run_time_millis INTEGER NOT NULL,
    update_time           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_result_session ON statement_result(session_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
