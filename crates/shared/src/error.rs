//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
///
/// Domain crates define their own error enums (flattening, retrieval,
/// reconciliation, store, registry); this type is the coarse application
/// wrapper used at the binary boundary and in run summaries.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document retrieval failed.
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Document flattening failed.
    #[error("Flattening error: {0}")]
    Flatten(String),

    /// Reconciliation failed.
    #[error("Reconciliation error: {0}")]
    Reconcile(String),

    /// Table store or artifact export failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Remote registry rejected or failed a call.
    #[error("Registry error: {0}")]
    Registry(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the stable error code for reports and logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Retrieval(_) => "RETRIEVAL_ERROR",
            Self::Flatten(_) => "FLATTEN_ERROR",
            Self::Reconcile(_) => "RECONCILE_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::Registry(_) => "REGISTRY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
