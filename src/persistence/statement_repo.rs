//! Statement repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::statement::{Statement, StatementState};
use crate::{AppError, Result};

use super::db::Database;
use super::session_repo::parse_time;

/// Repository wrapper around `SQLite` for statement records.
#[derive(Clone)]
pub struct StatementRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct StatementRow {
    statement_id: String,
    session_id: String,
    query_id: String,
    query: String,
    state: String,
    submit_time: String,
    query_start_time: Option<String>,
    error: Option<String>,
}

impl StatementRow {
    /// Convert a database row into the domain model.
    fn into_statement(self) -> Result<Statement> {
        let query_start_time = self
            .query_start_time
            .as_deref()
            .map(|raw| parse_time("query_start_time", raw))
            .transpose()?;

        Ok(Statement {
            statement_id: self.statement_id,
            session_id: self.session_id,
            query_id: self.query_id,
            query: self.query,
            state: parse_statement_state(&self.state)?,
            submit_time: parse_time("submit_time", &self.submit_time)?,
            query_start_time,
            error: self.error,
        })
    }
}

fn parse_statement_state(s: &str) -> Result<StatementState> {
    match s {
        "waiting" => Ok(StatementState::Waiting),
        "running" => Ok(StatementState::Running),
        "succeeded" => Ok(StatementState::Succeeded),
        "failed" => Ok(StatementState::Failed),
        other => Err(AppError::Db(format!("invalid statement state: {other}"))),
    }
}

/// Fixed-width UTC timestamps keep lexical and chronological order equal.
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl StatementRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Enqueue a statement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn submit(&self, statement: &Statement) -> Result<Statement> {
        sqlx::query(
            "INSERT INTO statement (statement_id, session_id, query_id, query, state,
                 submit_time, query_start_time, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&statement.statement_id)
        .bind(&statement.session_id)
        .bind(&statement.query_id)
        .bind(&statement.query)
        .bind(statement.state.as_str())
        .bind(format_time(statement.submit_time))
        .bind(statement.query_start_time.map(format_time))
        .bind(&statement.error)
        .execute(self.db.as_ref())
        .await?;
        Ok(statement.clone())
    }

    /// Atomically move the oldest waiting statement of `session_id` to
    /// `running` and return it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn claim_next(&self, session_id: &str) -> Result<Option<Statement>> {
        let row: Option<StatementRow> = sqlx::query_as(
            "UPDATE statement SET state = 'running'
             WHERE statement_id = (
                 SELECT statement_id FROM statement
                 WHERE session_id = ?1 AND state = 'waiting'
                 ORDER BY submit_time ASC, rowid ASC
                 LIMIT 1
             )
             RETURNING statement_id, session_id, query_id, query, state,
                 submit_time, query_start_time, error",
        )
        .bind(session_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(StatementRow::into_statement).transpose()
    }

    /// Overwrite state, error, and start time of a statement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the statement does not exist, or
    /// `AppError::Db` if the update fails.
    pub async fn update(&self, statement: &Statement) -> Result<()> {
        let result = sqlx::query(
            "UPDATE statement SET state = ?1, query_start_time = ?2, error = ?3
             WHERE statement_id = ?4",
        )
        .bind(statement.state.as_str())
        .bind(statement.query_start_time.map(format_time))
        .bind(&statement.error)
        .bind(&statement.statement_id)
        .execute(self.db.as_ref())
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "statement {} not found",
                statement.statement_id
            )));
        }
        Ok(())
    }

    /// Retrieve a statement by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is malformed.
    pub async fn get_by_id(&self, statement_id: &str) -> Result<Option<Statement>> {
        let row: Option<StatementRow> = sqlx::query_as(
            "SELECT statement_id, session_id, query_id, query, state,
                 submit_time, query_start_time, error
             FROM statement WHERE statement_id = ?1",
        )
        .bind(statement_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(StatementRow::into_statement).transpose()
    }

    /// List a session's statements in submit order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_session(&self, session_id: &str) -> Result<Vec<Statement>> {
        let rows: Vec<StatementRow> = sqlx::query_as(
            "SELECT statement_id, session_id, query_id, query, state,
                 submit_time, query_start_time, error
             FROM statement WHERE session_id = ?1
             ORDER BY submit_time ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(StatementRow::into_statement).collect()
    }
}
