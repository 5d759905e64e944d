//! Pipeline error types.

use thiserror::Error;

use crate::reconcile::error::ReconcileError;

/// Errors aborting a whole pipeline run.
///
/// Per-document and per-sub-range failures are *not* errors here; they are
/// accumulated into the run report. Only reconciliation inconsistencies and
/// internal faults abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reconciliation refused to produce a balance.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// A stage failed in a way that is a bug, not a data condition.
    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns the stable error code for reports and logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Reconcile(e) => e.error_code(),
            Self::Internal(_) => "PIPELINE_INTERNAL",
        }
    }
}
