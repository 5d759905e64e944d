//! Reconciliation error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors aborting a reconciliation run.
///
/// These are fatal to the run that hit them - a silent guess would corrupt
/// the tax balance - and are never retried automatically. They require an
/// upstream correction, e.g. a missing payment complement arriving in a
/// later batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// One or more ledger records could not be classified into a settlement
    /// regime.
    #[error("Inconsistent ledger: {} record(s) with unclassifiable regime", uuids.len())]
    InconsistentLedger {
        /// Offending document UUIDs, sorted for deterministic reporting.
        uuids: Vec<Uuid>,
    },
}

impl ReconcileError {
    /// Returns the stable error code for failure reports.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InconsistentLedger { .. } => "INCONSISTENT_LEDGER",
        }
    }
}
