//! Sticky destination-readiness outcome.

use serde::{Deserialize, Serialize};

/// Whether the result destination is ready to receive writes.
///
/// Moves only `NotVerified -> VerifiedOk | VerifiedError` within one loop
/// run and never back.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum VerificationResult {
    /// Probe outcome not yet observed.
    #[default]
    NotVerified,
    /// Destination is ready.
    VerifiedOk,
    /// Destination is broken; every statement fails with this reason.
    VerifiedError(String),
}

impl VerificationResult {
    /// Whether the probe outcome has been observed.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::NotVerified)
    }
}
