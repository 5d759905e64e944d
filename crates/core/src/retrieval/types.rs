//! Retrieval domain types: requests, states, packages, raw documents.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;

use tributo_shared::types::RequestId;

use crate::cfdi::Direction;

use super::error::RetrievalError;

/// Hours a bulk-export request stays valid after creation.
pub const REQUEST_TTL_HOURS: i64 = 72;

/// An inclusive date sub-range covered by one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start date.
    pub start: NaiveDate,
    /// Inclusive end date.
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, swapping the bounds when given in reverse.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Number of days covered, inclusive.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Requested content kind for a bulk-export request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Metadata only: fast, higher record ceiling, not flattenable.
    Metadata,
    /// Full XML documents.
    Full,
}

impl ContentKind {
    /// Registry record ceiling per request for this content kind.
    #[must_use]
    pub const fn record_ceiling(&self) -> u32 {
        match self {
            Self::Metadata => 1_000_000,
            Self::Full => 200_000,
        }
    }

    /// Parses the configuration form of the content kind.
    #[must_use]
    pub fn from_config(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "metadata" => Some(Self::Metadata),
            "full" | "cfdi" | "xml" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Status code reported by the registry for an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryStatus {
    /// Code 1: accepted, not yet processing.
    Accepted,
    /// Code 2: processing.
    InProcess,
    /// Code 3: ready, packages available.
    Ready,
    /// Code 4: failed on the registry side.
    Errored,
    /// Code 5: rejected.
    Rejected,
}

impl RegistryStatus {
    /// Decodes the registry's numeric status code.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Accepted),
            2 => Some(Self::InProcess),
            3 => Some(Self::Ready),
            4 => Some(Self::Errored),
            5 => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Lifecycle state of a bulk-export request.
///
/// Transitions only ever move forward; see [`RequestState::can_advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Created locally, not yet acknowledged by the registry.
    Requested,
    /// Acknowledged by the registry.
    Accepted,
    /// Being assembled on the registry side.
    Processing,
    /// Packages available (terminal success once drained).
    Ready,
    /// Failed; retryable by issuing a brand-new request.
    Errored,
    /// Rejected at submission; not retryable without changing parameters.
    Rejected,
    /// Passed the 72-hour expiry without completing.
    Expired,
    /// Cancelled by the caller.
    Cancelled,
}

impl RequestState {
    /// Returns true for states that never change again.
    ///
    /// `Ready` is terminal *once drained*; while packages are still being
    /// downloaded a failure may yet move it to `Errored`, so it is not
    /// listed here.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Errored | Self::Rejected | Self::Expired | Self::Cancelled
        )
    }

    /// Whether a transition from `self` to `next` moves forward.
    #[must_use]
    pub const fn can_advance_to(&self, next: Self) -> bool {
        match self {
            Self::Requested => matches!(
                next,
                Self::Accepted | Self::Rejected | Self::Errored | Self::Expired | Self::Cancelled
            ),
            Self::Accepted => matches!(
                next,
                Self::Processing | Self::Ready | Self::Errored | Self::Expired | Self::Cancelled
            ),
            Self::Processing => matches!(
                next,
                Self::Ready | Self::Errored | Self::Expired | Self::Cancelled
            ),
            Self::Ready => matches!(next, Self::Errored | Self::Expired | Self::Cancelled),
            Self::Errored | Self::Rejected | Self::Expired | Self::Cancelled => false,
        }
    }
}

/// One bulk-export request against the remote registry.
///
/// Created by the pipeline coordinator; mutated only by the retrieval state
/// machine, and only ever forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Date sub-range the request covers.
    pub range: DateRange,
    /// Requested content kind.
    pub content: ContentKind,
    /// Direction filter.
    pub direction: Direction,
    /// Current lifecycle state.
    pub state: RequestState,
    /// Identifier assigned by the registry at submission.
    pub id: Option<RequestId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp (creation + 72 hours).
    pub expires_at: DateTime<Utc>,
    /// Last status message reported by the registry.
    pub message: Option<String>,
}

impl RetrievalRequest {
    /// Creates a new request in the `Requested` state.
    #[must_use]
    pub fn new(
        range: DateRange,
        content: ContentKind,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            range,
            content,
            direction,
            state: RequestState::Requested,
            id: None,
            created_at: now,
            expires_at: now + TimeDelta::hours(REQUEST_TTL_HOURS),
            message: None,
        }
    }

    /// Advances the state, enforcing forward-only transitions.
    ///
    /// Advancing to the current state is a no-op so repeated registry polls
    /// reporting the same code are harmless.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidTransition`] when the transition
    /// would move backward or leave a terminal state.
    pub fn advance(&mut self, next: RequestState) -> Result<(), RetrievalError> {
        if self.state == next {
            return Ok(());
        }
        if self.state.can_advance_to(next) {
            self.state = next;
            Ok(())
        } else {
            Err(RetrievalError::InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }

    /// Transitions to `Expired` when `now` is past the expiry timestamp.
    ///
    /// Returns true when the request is (now) expired. The check wins over
    /// whatever the registry last reported: a request stuck in `Processing`
    /// past its expiry is terminal.
    pub fn expire_if_past(&mut self, now: DateTime<Utc>) -> bool {
        if self.state == RequestState::Expired {
            return true;
        }
        if !self.state.is_terminal() && now > self.expires_at {
            self.state = RequestState::Expired;
            return true;
        }
        false
    }
}

/// Opaque handle of one downloadable package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageHandle(pub String);

impl std::fmt::Display for PackageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One downloaded package: a ZIP archive of raw documents.
#[derive(Debug, Clone)]
pub struct PackageArchive {
    /// Handle the archive was downloaded under.
    pub handle: PackageHandle,
    /// Raw archive bytes.
    pub data: Bytes,
}

impl PackageArchive {
    /// Extracts the raw XML documents contained in the archive.
    ///
    /// Non-XML entries (metadata listings) are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Archive`] when the archive or an entry
    /// cannot be read.
    pub fn documents(&self) -> Result<Vec<RawDocument>, RetrievalError> {
        let cursor = std::io::Cursor::new(self.data.as_ref());
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| RetrievalError::Archive(e.to_string()))?;

        let mut docs = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| RetrievalError::Archive(e.to_string()))?;
            let name = entry.name().to_string();
            if !name.to_ascii_lowercase().ends_with(".xml") {
                continue;
            }
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| RetrievalError::Archive(format!("{name}: {e}")))?;
            docs.push(RawDocument {
                package: self.handle.0.clone(),
                name,
                content,
            });
        }
        Ok(docs)
    }
}

/// One raw hierarchical document handed to the flattening engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Handle of the package the document came from.
    pub package: String,
    /// Entry name within the package.
    pub name: String,
    /// Raw XML content.
    pub content: String,
}
