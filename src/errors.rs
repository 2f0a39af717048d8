//! Error types shared across the application.

use std::fmt::{Display, Formatter};
use std::io::ErrorKind;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with the metadata store.
    Db(String),
    /// Transient inability to reach the metadata store.
    Connectivity(String),
    /// Result destination is not ready to receive writes.
    Verification(String),
    /// A bounded wait (probe or execution) exceeded its deadline.
    Timeout(String),
    /// Query engine rejected or failed the query.
    Engine(String),
    /// Result formatting or persistence failure.
    Persistence(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Record was claimed or finalized by another owner.
    Conflict(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error belongs to the transient connectivity class that
    /// the session-level retry policy is allowed to retry.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Connectivity(msg) => write!(f, "connectivity: {msg}"),
            Self::Verification(msg) => write!(f, "verification: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Engine(msg) => write!(f, "engine: {msg}"),
            Self::Persistence(msg) => write!(f, "persistence: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(format!("invalid json: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(io) if is_connection_refused(io.kind()) => {
                Self::Connectivity(err.to_string())
            }
            sqlx::Error::PoolTimedOut => Self::Connectivity(err.to_string()),
            _ => Self::Db(err.to_string()),
        }
    }
}

/// The fixed set of I/O failures treated as "could not reach the store".
fn is_connection_refused(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
    )
}
