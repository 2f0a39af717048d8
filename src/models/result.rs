//! Engine output and the persistable form written by a result writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name and declared type of one result column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Column name as reported by the engine.
    pub name: String,
    /// Engine type name (`INTEGER`, `TEXT`, ...).
    pub data_type: String,
}

/// Tabular output of one query execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Result columns in order.
    pub columns: Vec<ColumnSchema>,
    /// Rows, each with one value per column.
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A statement's result in the shape the destination stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormattedResult {
    /// Statement the result belongs to.
    pub statement_id: String,
    /// Engine job id the result was produced under.
    pub query_id: String,
    /// Owning session.
    pub session_id: String,
    /// Data source the statement ran against.
    pub data_source: String,
    /// Result schema.
    pub schema: Vec<ColumnSchema>,
    /// Each row encoded as a JSON array, one value per `schema` entry.
    pub rows: Vec<String>,
    /// `SUCCESS` or `FAILED`.
    pub status: String,
    /// Failure reason, if any.
    pub error: Option<String>,
    /// Milliseconds between processing start and formatting.
    pub query_run_time_millis: i64,
    /// When the result was produced.
    pub update_time: DateTime<Utc>,
}
