//! Flattening error types.

use thiserror::Error;

/// Errors produced while flattening a single document.
///
/// All of these are per-document: a failed document is collected into the
/// batch outcome and never aborts sibling documents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    /// The document structure could not be parsed.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The document (or complement) format version is not in the supported set.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    /// A complement node is present without its required parent fields.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl FlattenError {
    /// Returns the stable error code for failure reports.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedDocument(_) => "MALFORMED_DOCUMENT",
            Self::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            Self::SchemaMismatch(_) => "SCHEMA_MISMATCH",
        }
    }
}
