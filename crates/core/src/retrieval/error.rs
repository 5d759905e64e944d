//! Retrieval error types.
//!
//! Every failure carries the originating date sub-range so the caller can
//! resubmit it; resubmission is always a caller decision, never automatic.

use serde::Serialize;
use thiserror::Error;

use super::types::{DateRange, RequestState};

/// Errors terminating one retrieval sub-range.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RetrievalError {
    /// The registry rejected the request outright. Implies a parameter
    /// error, not a transient fault: resubmitting unchanged will not help.
    #[error("Request for {range} rejected by registry: {reason}")]
    Rejected {
        /// The sub-range the request covered.
        range: DateRange,
        /// Rejection reason reported by the registry.
        reason: String,
    },

    /// The request failed after acceptance. Retryable by submitting a
    /// brand-new request for the same sub-range.
    #[error("Request for {range} errored: {detail}")]
    Errored {
        /// The sub-range the request covered.
        range: DateRange,
        /// Failure detail.
        detail: String,
    },

    /// The request passed its 72-hour expiry without completing.
    #[error("Request for {range} expired before completion")]
    Expired {
        /// The sub-range the request covered.
        range: DateRange,
    },

    /// A package download kept failing after bounded retries.
    #[error("Download of package {package} failed after {attempts} attempts: {detail}")]
    DownloadFailed {
        /// Registry handle of the package.
        package: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Last failure detail.
        detail: String,
    },

    /// The caller cancelled the sub-range before it completed.
    #[error("Request for {range} cancelled by caller")]
    Cancelled {
        /// The sub-range the request covered.
        range: DateRange,
    },

    /// A package archive could not be decoded.
    #[error("Package archive error: {0}")]
    Archive(String),

    /// A state transition would have moved backward.
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: RequestState,
        /// Attempted next state.
        to: RequestState,
    },
}

impl RetrievalError {
    /// Returns the stable error code for failure reports.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "REJECTED",
            Self::Errored { .. } => "ERRORED",
            Self::Expired { .. } => "EXPIRED",
            Self::DownloadFailed { .. } => "DOWNLOAD_FAILED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Archive(_) => "ARCHIVE_ERROR",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }
}
