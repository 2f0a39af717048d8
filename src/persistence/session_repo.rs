//! Session repository for `SQLite` persistence.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::session::{Session, SessionState};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    application_id: String,
    job_id: String,
    state: String,
    create_time: String,
    last_update_time: String,
    error: Option<String>,
    excluded_job_ids: String,
    seq_no: i64,
}

impl SessionRow {
    /// Convert a database row into the domain model.
    fn into_session(self) -> Result<Session> {
        let excluded_job_ids: BTreeSet<String> = serde_json::from_str(&self.excluded_job_ids)
            .map_err(|e| AppError::Db(format!("invalid excluded_job_ids: {e}")))?;

        Ok(Session {
            application_id: self.application_id,
            job_id: self.job_id,
            session_id: self.session_id,
            state: parse_session_state(&self.state)?,
            create_time: parse_time("create_time", &self.create_time)?,
            last_update_time: parse_time("last_update_time", &self.last_update_time)?,
            error: self.error,
            excluded_job_ids,
            seq_no: self.seq_no,
        })
    }
}

pub(super) fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

fn parse_session_state(s: &str) -> Result<SessionState> {
    match s {
        "not_started" => Ok(SessionState::NotStarted),
        "running" => Ok(SessionState::Running),
        "completed" => Ok(SessionState::Completed),
        "failed" => Ok(SessionState::Failed),
        other => Err(AppError::Db(format!("invalid session state: {other}"))),
    }
}

const SELECT_COLUMNS: &str = "SELECT session_id, application_id, job_id, state, create_time, \
     last_update_time, error, excluded_job_ids, seq_no FROM session";

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Retrieve a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or the row is malformed.
    pub async fn get_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE session_id = ?1"))
                .bind(session_id)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Insert or overwrite a session, bumping its sequence number.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn upsert(&self, session: &Session) -> Result<()> {
        let excluded = serde_json::to_string(&session.excluded_job_ids)?;
        sqlx::query(
            "INSERT INTO session (session_id, application_id, job_id, state, create_time,
                 last_update_time, error, excluded_job_ids, seq_no)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9 + 1)
             ON CONFLICT(session_id) DO UPDATE SET
                 application_id = excluded.application_id,
                 job_id = excluded.job_id,
                 state = excluded.state,
                 last_update_time = excluded.last_update_time,
                 error = excluded.error,
                 excluded_job_ids = excluded.excluded_job_ids,
                 seq_no = session.seq_no + 1",
        )
        .bind(&session.session_id)
        .bind(&session.application_id)
        .bind(&session.job_id)
        .bind(session.state.as_str())
        .bind(session.create_time.to_rfc3339())
        .bind(session.last_update_time.to_rfc3339())
        .bind(&session.error)
        .bind(&excluded)
        .bind(session.seq_no)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Overwrite a session only if nobody wrote it since `session.seq_no`
    /// was read. Returns whether the row was updated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn update_if_unchanged(&self, session: &Session) -> Result<bool> {
        let excluded = serde_json::to_string(&session.excluded_job_ids)?;
        let result = sqlx::query(
            "UPDATE session SET
                 application_id = ?2,
                 job_id = ?3,
                 state = ?4,
                 last_update_time = ?5,
                 error = ?6,
                 excluded_job_ids = ?7,
                 seq_no = seq_no + 1
             WHERE session_id = ?1 AND seq_no = ?8",
        )
        .bind(&session.session_id)
        .bind(&session.application_id)
        .bind(&session.job_id)
        .bind(session.state.as_str())
        .bind(session.last_update_time.to_rfc3339())
        .bind(&session.error)
        .bind(&excluded)
        .bind(session.seq_no)
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Advance `last_update_time` without touching the sequence number.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist, or
    /// `AppError::Db` if the update fails.
    pub async fn touch(&self, session_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE session SET last_update_time = ?1 WHERE session_id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(self.db.as_ref())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("session {session_id} not found")));
        }
        Ok(())
    }

    /// Replace the exclusion list; used by supervisors handing a session to
    /// a new job.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session does not exist, or
    /// `AppError::Db` if the update fails.
    pub async fn set_excluded_job_ids(
        &self,
        session_id: &str,
        excluded: &BTreeSet<String>,
    ) -> Result<()> {
        let encoded = serde_json::to_string(excluded)?;
        let result = sqlx::query(
            "UPDATE session SET excluded_job_ids = ?1, seq_no = seq_no + 1 WHERE session_id = ?2",
        )
        .bind(&encoded)
        .bind(session_id)
        .execute(self.db.as_ref())
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("session {session_id} not found")));
        }
        Ok(())
    }
}
