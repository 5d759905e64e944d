//! Store error types.

use thiserror::Error;

/// Errors from table export.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure while writing artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    /// Returns the stable error code for reports and logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "STORE_IO",
            Self::Csv(_) => "STORE_CSV",
        }
    }
}
