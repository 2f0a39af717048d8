//! Built-in query engine executing statements against a `SQLite` data source.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::{Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Executor, Row, SqlitePool, Statement as _, TypeInfo, ValueRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::result::{ColumnSchema, QueryResult};
use crate::{AppError, Result};

use super::QueryEngine;

/// Running executions keyed by job id.
type RunningJobs = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Query engine backed by a `SQLite` connection pool.
#[derive(Clone)]
pub struct SqliteQueryEngine {
    pool: Arc<SqlitePool>,
    running: RunningJobs,
}

impl SqliteQueryEngine {
    /// Create an engine over `pool`.
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self {
            pool,
            running: RunningJobs::default(),
        }
    }

    /// Number of executions currently registered for cancellation.
    #[must_use]
    pub fn running_jobs(&self) -> usize {
        self.running.lock().map_or(0, |jobs| jobs.len())
    }

    fn register(&self, job_id: &str) -> Result<RegisteredJob> {
        let token = CancellationToken::new();
        let mut jobs = self
            .running
            .lock()
            .map_err(|_| AppError::Engine("job registry poisoned".into()))?;
        jobs.insert(job_id.to_owned(), token.clone());
        Ok(RegisteredJob {
            job_id: job_id.to_owned(),
            token,
            running: Arc::clone(&self.running),
        })
    }

    async fn run(&self, query: String, job_id: String) -> Result<QueryResult> {
        let job = self.register(&job_id)?;
        debug!(%job_id, "executing query");

        tokio::select! {
            () = job.token.cancelled() => Err(AppError::Engine(format!("job {job_id} cancelled"))),
            result = self.query(&query) => result,
        }
    }

    /// Prepare first so the schema is known even when no row comes back.
    async fn query(&self, query: &str) -> Result<QueryResult> {
        let statement = self.pool.as_ref().prepare(query).await.map_err(engine_error)?;
        let columns = statement
            .columns()
            .iter()
            .map(|column| ColumnSchema {
                name: column.name().to_owned(),
                data_type: column.type_info().name().to_owned(),
            })
            .collect::<Vec<_>>();

        let rows = statement
            .query()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(engine_error)?;
        to_query_result(columns, &rows)
    }
}

/// Registry entry removed when the execution finishes or is dropped.
struct RegisteredJob {
    job_id: String,
    token: CancellationToken,
    running: RunningJobs,
}

impl Drop for RegisteredJob {
    fn drop(&mut self) {
        if let Ok(mut jobs) = self.running.lock() {
            jobs.remove(&self.job_id);
        }
    }
}

impl QueryEngine for SqliteQueryEngine {
    fn execute(
        &self,
        query: String,
        job_id: String,
    ) -> Pin<Box<dyn Future<Output = Result<QueryResult>> + Send + '_>> {
        Box::pin(self.run(query, job_id))
    }

    fn cancel<'a>(&'a self, job_id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let token = self
                .running
                .lock()
                .map_err(|_| AppError::Engine("job registry poisoned".into()))?
                .get(job_id)
                .cloned();
            if let Some(token) = token {
                info!(%job_id, "cancelling job");
                token.cancel();
            } else {
                debug!(%job_id, "cancel requested for job that is not running");
            }
            Ok(())
        })
    }
}

/// Prefer the database's own message over sqlx's wrapper text.
fn engine_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(db_err) => AppError::Engine(db_err.message().to_owned()),
        other => AppError::Engine(other.to_string()),
    }
}

fn to_query_result(columns: Vec<ColumnSchema>, rows: &[SqliteRow]) -> Result<QueryResult> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(decode_value(row, idx)?);
        }
        out.push(values);
    }

    Ok(QueryResult { columns, rows: out })
}

/// Decode one cell by its runtime storage class.
fn decode_value(row: &SqliteRow, idx: usize) -> Result<Value> {
    let raw = row
        .try_get_raw(idx)
        .map_err(|err| AppError::Engine(err.to_string()))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_owned();

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(
            row.try_get::<i64, _>(idx)
                .map_err(|err| AppError::Engine(err.to_string()))?,
        ),
        "REAL" => {
            let float = row
                .try_get::<f64, _>(idx)
                .map_err(|err| AppError::Engine(err.to_string()))?;
            Number::from_f64(float).map_or(Value::Null, Value::Number)
        }
        "BLOB" => {
            let bytes = row
                .try_get::<Vec<u8>, _>(idx)
                .map_err(|err| AppError::Engine(err.to_string()))?;
            Value::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
        }
        _ => Value::String(
            row.try_get::<String, _>(idx)
                .map_err(|err| AppError::Engine(err.to_string()))?,
        ),
    };
    Ok(value)
}
