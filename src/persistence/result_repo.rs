//! Statement result repository for the `SQLite` destination.

use std::sync::Arc;

use chrono::SecondsFormat;

use crate::models::result::{ColumnSchema, FormattedResult};
use crate::{AppError, Result};

use super::session_repo::parse_time;
use super::SqlitePool;

/// Repository wrapper around `SQLite` for stored statement results.
#[derive(Clone)]
pub struct ResultRepo {
    db: Arc<SqlitePool>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ResultRow {
    statement_id: String,
    query_id: String,
    session_id: String,
    data_source: String,
    schema: String,
    rows: String,
    status: String,
    error: Option<String>,
    query_run_time_millis: i64,
    update_time: String,
}

impl ResultRow {
    fn into_result(self) -> Result<FormattedResult> {
        let schema: Vec<ColumnSchema> = serde_json::from_str(&self.schema)
            .map_err(|e| AppError::Db(format!("invalid schema: {e}")))?;
        let rows: Vec<String> = serde_json::from_str(&self.rows)
            .map_err(|e| AppError::Db(format!("invalid rows: {e}")))?;

        Ok(FormattedResult {
            statement_id: self.statement_id,
            query_id: self.query_id,
            session_id: self.session_id,
            data_source: self.data_source,
            schema,
            rows,
            status: self.status,
            error: self.error,
            query_run_time_millis: self.query_run_time_millis,
            update_time: parse_time("update_time", &self.update_time)?,
        })
    }
}

impl ResultRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Store a result, replacing any earlier result for the same statement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn insert(&self, result: &FormattedResult) -> Result<()> {
        let schema = serde_json::to_string(&result.schema)?;
        let rows = serde_json::to_string(&result.rows)?;
        sqlx::query(
            "INSERT OR REPLACE INTO statement_result (statement_id, query_id, session_id,
                 data_source, schema, rows, status, error, query_run_time_millis, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&result.statement_id)
        .bind(&result.query_id)
        .bind(&result.session_id)
        .bind(&result.data_source)
        .bind(&schema)
        .bind(&rows)
        .bind(&result.status)
        .bind(&result.error)
        .bind(result.query_run_time_millis)
        .bind(result.update_time.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Fetch the stored result of a statement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is malformed.
    pub async fn get_by_statement(&self, statement_id: &str) -> Result<Option<FormattedResult>> {
        let row: Option<ResultRow> = sqlx::query_as(
            "SELECT statement_id, query_id, session_id, data_source, schema, rows,
                 status, error, query_run_time_millis, update_time
             FROM statement_result WHERE statement_id = ?1",
        )
        .bind(statement_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(ResultRow::into_result).transpose()
    }
}
