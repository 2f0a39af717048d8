//! Collaborator registry: maps configuration keys to constructors.
//!
//! Implementations are resolved once when the session driver is built.
//! An empty key selects [`DEFAULT_KEY`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{CollaboratorConfig, GlobalConfig};
use crate::engine::sqlite_engine::SqliteQueryEngine;
use crate::engine::QueryEngine;
use crate::persistence::sqlite_store::SqliteMetadataStore;
use crate::persistence::{db, SqlitePool};
use crate::store::MetadataStore;
use crate::writer::sqlite_writer::SqliteResultWriter;
use crate::writer::ResultWriter;
use crate::{AppError, Result};

/// Key of the built-in implementations.
pub const DEFAULT_KEY: &str = "sqlite";

/// Shared handles factories build collaborators from.
#[derive(Clone)]
pub struct Resources {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Metadata database with schema applied.
    pub metadata_db: Arc<SqlitePool>,
    /// Data source database statements run against.
    pub data_source_db: Arc<SqlitePool>,
}

impl Resources {
    /// Open both databases named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either database cannot be opened.
    pub async fn open(config: Arc<GlobalConfig>) -> Result<Self> {
        let metadata_db = Arc::new(db::connect(&config.metadata_db).await?);
        let data_source_db = Arc::new(db::open(&config.data_source_db).await?);
        Ok(Self {
            config,
            metadata_db,
            data_source_db,
        })
    }
}

/// Constructor for a query engine.
pub type EngineFactory = fn(&Resources) -> Result<Arc<dyn QueryEngine>>;
/// Constructor for a result writer.
pub type WriterFactory = fn(&Resources) -> Result<Arc<dyn ResultWriter>>;
/// Constructor for a metadata store.
pub type StoreFactory = fn(&Resources) -> Result<Arc<dyn MetadataStore>>;

/// Resolved collaborator set.
#[derive(Clone)]
pub struct Collaborators {
    /// Query engine.
    pub engine: Arc<dyn QueryEngine>,
    /// Result writer.
    pub writer: Arc<dyn ResultWriter>,
    /// Metadata store.
    pub store: Arc<dyn MetadataStore>,
}

/// Key-to-constructor tables for each collaborator kind.
pub struct Registry {
    engines: HashMap<String, EngineFactory>,
    writers: HashMap<String, WriterFactory>,
    stores: HashMap<String, StoreFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Registry {
    /// Registry with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
            writers: HashMap::new(),
            stores: HashMap::new(),
        }
    }

    /// Registry with the built-in `SQLite` implementations under [`DEFAULT_KEY`].
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_engine(DEFAULT_KEY, sqlite_engine);
        registry.register_writer(DEFAULT_KEY, sqlite_writer);
        registry.register_store(DEFAULT_KEY, sqlite_store);
        registry
    }

    /// Register (or replace) an engine constructor.
    pub fn register_engine(&mut self, key: &str, factory: EngineFactory) {
        self.engines.insert(key.to_owned(), factory);
    }

    /// Register (or replace) a result writer constructor.
    pub fn register_writer(&mut self, key: &str, factory: WriterFactory) {
        self.writers.insert(key.to_owned(), factory);
    }

    /// Register (or replace) a metadata store constructor.
    pub fn register_store(&mut self, key: &str, factory: StoreFactory) {
        self.stores.insert(key.to_owned(), factory);
    }

    /// Build the collaborators selected by `selection`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a key has no registered constructor, or
    /// whatever the constructor itself returns.
    pub fn resolve(
        &self,
        selection: &CollaboratorConfig,
        resources: &Resources,
    ) -> Result<Collaborators> {
        let engine_key = key_or_default(&selection.engine);
        let writer_key = key_or_default(&selection.result_writer);
        let store_key = key_or_default(&selection.metadata_store);

        let build_engine = lookup(&self.engines, "engine", engine_key)?;
        let build_writer = lookup(&self.writers, "result_writer", writer_key)?;
        let build_store = lookup(&self.stores, "metadata_store", store_key)?;

        let engine = build_engine(resources)?;
        let writer = build_writer(resources)?;
        let store = build_store(resources)?;

        info!(
            engine = engine_key,
            result_writer = writer_key,
            metadata_store = store_key,
            "collaborators resolved"
        );

        Ok(Collaborators {
            engine,
            writer,
            store,
        })
    }
}

fn key_or_default(key: &str) -> &str {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        DEFAULT_KEY
    } else {
        trimmed
    }
}

fn lookup<F: Copy>(table: &HashMap<String, F>, kind: &str, key: &str) -> Result<F> {
    table
        .get(key)
        .copied()
        .ok_or_else(|| AppError::Config(format!("no {kind} registered under '{key}'")))
}

#[allow(clippy::unnecessary_wraps)] // Must match `EngineFactory`.
fn sqlite_engine(resources: &Resources) -> Result<Arc<dyn QueryEngine>> {
    Ok(Arc::new(SqliteQueryEngine::new(Arc::clone(
        &resources.data_source_db,
    ))))
}

#[allow(clippy::unnecessary_wraps)] // Must match `WriterFactory`.
fn sqlite_writer(resources: &Resources) -> Result<Arc<dyn ResultWriter>> {
    Ok(Arc::new(SqliteResultWriter::new(
        Arc::clone(&resources.data_source_db),
        resources.config.session.data_source.clone(),
    )))
}

#[allow(clippy::unnecessary_wraps)] // Must match `StoreFactory`.
fn sqlite_store(resources: &Resources) -> Result<Arc<dyn MetadataStore>> {
    Ok(Arc::new(SqliteMetadataStore::new(Arc::clone(
        &resources.metadata_db,
    ))))
}
