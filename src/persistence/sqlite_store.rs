//! `SQLite`-backed [`MetadataStore`].

use std::sync::Arc;

use tracing::debug;

use crate::models::session::Session;
use crate::models::statement::Statement;
use crate::store::{MetadataStore, StoreFuture, UpdateMode};

use super::db::Database;
use super::session_repo::SessionRepo;
use super::statement_repo::StatementRepo;

/// Metadata store composed of the session and statement repositories.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    sessions: SessionRepo,
    statements: StatementRepo,
}

impl SqliteMetadataStore {
    /// Create a store over an initialized metadata database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            sessions: SessionRepo::new(Arc::clone(&db)),
            statements: StatementRepo::new(db),
        }
    }

    /// Session repository for direct access.
    #[must_use]
    pub fn sessions(&self) -> &SessionRepo {
        &self.sessions
    }

    /// Statement repository for direct access (producers, inspection).
    #[must_use]
    pub fn statements(&self) -> &StatementRepo {
        &self.statements
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn get_session<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Option<Session>> {
        Box::pin(self.sessions.get_by_id(session_id))
    }

    fn upsert_session<'a>(
        &'a self,
        session: &'a Session,
        mode: UpdateMode,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            match mode {
                UpdateMode::Upsert => {
                    self.sessions.upsert(session).await?;
                    Ok(true)
                }
                UpdateMode::UpdateIfUnchanged => {
                    let applied = self.sessions.update_if_unchanged(session).await?;
                    if !applied {
                        debug!(
                            session_id = %session.session_id,
                            seq_no = session.seq_no,
                            "session moved on, conditional write skipped"
                        );
                    }
                    Ok(applied)
                }
            }
        })
    }

    fn get_next_statement<'a>(
        &'a self,
        session_id: &'a str,
    ) -> StoreFuture<'a, Option<Statement>> {
        Box::pin(self.statements.claim_next(session_id))
    }

    fn update_statement<'a>(&'a self, statement: &'a Statement) -> StoreFuture<'a, ()> {
        Box::pin(self.statements.update(statement))
    }

    fn record_heartbeat<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(self.sessions.touch(session_id))
    }
}
