//! Result destination abstraction.
//!
//! A [`ResultWriter`] turns raw engine output into the stored shape and
//! persists it. [`ResultWriter::prepare`] is the destination-ready probe run
//! once per loop run before any statement result is written.

pub mod sqlite_writer;

use std::future::Future;
use std::pin::Pin;

use crate::models::result::{FormattedResult, QueryResult};
use crate::models::statement::Statement;
use crate::Result;

/// Formats and persists statement results.
pub trait ResultWriter: Send + Sync {
    /// Check that the destination can accept writes, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Verification`](crate::AppError::Verification) if the
    /// destination is not usable.
    fn prepare(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Convert raw engine output for `statement` into its stored form.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`](crate::AppError::Persistence) if the
    /// output cannot be encoded.
    fn format(&self, raw: QueryResult, statement: &Statement) -> Result<FormattedResult>;

    /// Persist a formatted result.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Persistence`](crate::AppError::Persistence) if the
    /// write fails.
    fn persist<'a>(
        &'a self,
        result: &'a FormattedResult,
        statement: &'a Statement,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
