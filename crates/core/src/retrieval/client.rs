//! Remote-registry boundary.
//!
//! The registry is consumed, not reimplemented: this module defines only the
//! calls the state machine needs. Implementations must be object-safe-free
//! (`Send + Sync`) so multiple sub-range tasks can share one client.

use async_trait::async_trait;
use std::fmt;

use tributo_shared::types::RequestId;

use crate::cfdi::Direction;

use super::types::{ContentKind, DateRange, PackageArchive, PackageHandle, RegistryStatus};

/// Errors a [`RegistryClient`] implementation may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCallError {
    /// Network or transport failure.
    Transport(String),
    /// The registry returned an application-level error.
    Api {
        /// Registry status code, when one was returned.
        code: Option<i64>,
        /// Registry message.
        message: String,
    },
    /// A response payload could not be decoded.
    Decode(String),
}

impl fmt::Display for RegistryCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Api {
                code: Some(c),
                message,
            } => write!(f, "registry api error code={c}: {message}"),
            Self::Api {
                code: None,
                message,
            } => write!(f, "registry api error: {message}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for RegistryCallError {}

/// Parameters for one bulk-export submission.
#[derive(Debug, Clone)]
pub struct SubmitParams {
    /// RFC of the taxpayer the export is for.
    pub rfc: String,
    /// Date sub-range to export.
    pub range: DateRange,
    /// Requested content kind.
    pub content: ContentKind,
    /// Direction filter.
    pub direction: Direction,
}

/// Registry response to a submission.
#[derive(Debug, Clone)]
pub struct SubmitResponse {
    /// Request identifier, absent when the registry rejected the request.
    pub request_id: Option<RequestId>,
    /// Registry status code string.
    pub code: String,
    /// Registry message.
    pub message: String,
}

/// Registry response to a status poll.
#[derive(Debug, Clone)]
pub struct PollResponse {
    /// Reported request status.
    pub status: RegistryStatus,
    /// Registry message, when one was returned.
    pub message: Option<String>,
}

/// Remote bulk-download registry contract.
///
/// Session-token acquisition and request signing are the authentication
/// collaborator's responsibility; implementations attach the opaque token to
/// every call themselves.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Submits a bulk-export request for one date sub-range.
    async fn submit(&self, params: &SubmitParams) -> Result<SubmitResponse, RegistryCallError>;

    /// Polls the status of a previously submitted request.
    async fn poll(&self, id: &RequestId) -> Result<PollResponse, RegistryCallError>;

    /// Lists the package handles of a ready request.
    async fn list_packages(&self, id: &RequestId)
    -> Result<Vec<PackageHandle>, RegistryCallError>;

    /// Downloads one package archive.
    async fn download(
        &self,
        id: &RequestId,
        handle: &PackageHandle,
    ) -> Result<PackageArchive, RegistryCallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_display() {
        assert_eq!(
            RegistryCallError::Transport("connection refused".into()).to_string(),
            "transport error: connection refused"
        );
        assert_eq!(
            RegistryCallError::Api {
                code: Some(305),
                message: "bad certificate".into()
            }
            .to_string(),
            "registry api error code=305: bad certificate"
        );
        assert_eq!(
            RegistryCallError::Api {
                code: None,
                message: "throttled".into()
            }
            .to_string(),
            "registry api error: throttled"
        );
        assert_eq!(
            RegistryCallError::Decode("truncated envelope".into()).to_string(),
            "decode error: truncated envelope"
        );
    }
}
