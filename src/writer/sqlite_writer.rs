//! Built-in result writer storing results in a `SQLite` destination table.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::models::result::{FormattedResult, QueryResult};
use crate::models::statement::Statement;
use crate::persistence::result_repo::ResultRepo;
use crate::persistence::{schema, SqlitePool};
use crate::{AppError, Result};

use super::ResultWriter;

/// Status recorded for results of successful executions.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Writes formatted results into the `statement_result` table.
#[derive(Clone)]
pub struct SqliteResultWriter {
    pool: Arc<SqlitePool>,
    repo: ResultRepo,
    data_source: String,
}

impl SqliteResultWriter {
    /// Create a writer for `data_source` over the destination `pool`.
    #[must_use]
    pub fn new(pool: Arc<SqlitePool>, data_source: String) -> Self {
        Self {
            repo: ResultRepo::new(Arc::clone(&pool)),
            pool,
            data_source,
        }
    }

    /// Stored-result repository for inspection.
    #[must_use]
    pub fn results(&self) -> &ResultRepo {
        &self.repo
    }
}

impl ResultWriter for SqliteResultWriter {
    fn prepare(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            schema::bootstrap_result_schema(&self.pool)
                .await
                .map_err(|err| AppError::Verification(format!("result table unavailable: {err}")))?;
            // A read against the table proves it is reachable, not just declared.
            sqlx::query("SELECT COUNT(*) FROM statement_result")
                .fetch_one(self.pool.as_ref())
                .await
                .map_err(|err| AppError::Verification(format!("result table unreadable: {err}")))?;
            info!(data_source = %self.data_source, "result destination ready");
            Ok(())
        })
    }

    fn format(&self, raw: QueryResult, statement: &Statement) -> Result<FormattedResult> {
        let mut rows = Vec::with_capacity(raw.rows.len());
        for values in raw.rows {
            if values.len() != raw.columns.len() {
                return Err(AppError::Persistence(format!(
                    "row has {} values for {} columns",
                    values.len(),
                    raw.columns.len()
                )));
            }
            // Positional: column names may repeat.
            let encoded = serde_json::to_string(&values)
                .map_err(|err| AppError::Persistence(format!("row encoding failed: {err}")))?;
            rows.push(encoded);
        }

        let now = Utc::now();
        let run_time = statement
            .query_start_time
            .map_or(0, |start| (now - start).num_milliseconds());

        debug!(
            statement_id = %statement.statement_id,
            rows = rows.len(),
            "formatted statement result"
        );

        Ok(FormattedResult {
            statement_id: statement.statement_id.clone(),
            query_id: statement.query_id.clone(),
            session_id: statement.session_id.clone(),
            data_source: self.data_source.clone(),
            schema: raw.columns,
            rows,
            status: STATUS_SUCCESS.into(),
            error: None,
            query_run_time_millis: run_time,
            update_time: now,
        })
    }

    fn persist<'a>(
        &'a self,
        result: &'a FormattedResult,
        _statement: &'a Statement,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.repo
                .insert(result)
                .await
                .map_err(|err| AppError::Persistence(format!("failed to write result: {err}")))
        })
    }
}
