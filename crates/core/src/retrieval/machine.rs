//! The polling state machine driving one request to a terminal state.
//!
//! One call to [`drive`] owns one request: submit, poll on a backoff
//! schedule (suspending between polls, never busy-waiting), and on `Ready`
//! drain every package into the flattening input channel. Expiry is checked
//! before honoring whatever the registry reports.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tributo_shared::config::RetryConfig;
use tributo_shared::types::RequestId;

use crate::cfdi::Direction;

use super::client::{RegistryClient, SubmitParams};
use super::error::RetrievalError;
use super::types::{
    ContentKind, DateRange, PackageArchive, PackageHandle, RawDocument, RegistryStatus,
    RequestState, RetrievalRequest,
};

/// Delay between retries of a failed package download.
const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Polling and download-retry limits for one request.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Maximum status polls before the request is marked errored.
    pub max_polls: u32,
    /// Base backoff between polls.
    pub backoff_base: Duration,
    /// Upper bound on the backoff interval.
    pub backoff_cap: Duration,
    /// Maximum download attempts per package.
    pub download_attempts: u32,
}

impl PollPolicy {
    /// Backoff before poll number `attempt` (1-based): exponential from the
    /// base, capped.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1_u32 << exponent)
            .min(self.backoff_cap)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for PollPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_polls: cfg.max_polls,
            backoff_base: Duration::from_secs(cfg.backoff_base_secs),
            backoff_cap: Duration::from_secs(cfg.backoff_cap_secs),
            download_attempts: cfg.download_attempts.max(1),
        }
    }
}

/// Completion-log entry for one driven sub-range.
#[derive(Debug, Clone, Serialize)]
pub struct SubRangeOutcome {
    /// The sub-range the request covered.
    pub range: DateRange,
    /// Requested content kind.
    pub content: ContentKind,
    /// Direction filter.
    pub direction: Direction,
    /// Registry-assigned request identifier, when one was obtained.
    pub request_id: Option<RequestId>,
    /// Final request state. `Ready` means fully drained.
    pub state: RequestState,
    /// Packages downloaded.
    pub packages: u32,
    /// Documents streamed to the flattening input.
    pub documents: u64,
    /// Failure detail for non-`Ready` terminal states.
    pub failure: Option<RetrievalError>,
}

impl SubRangeOutcome {
    fn new(request: &RetrievalRequest) -> Self {
        Self {
            range: request.range,
            content: request.content,
            direction: request.direction,
            request_id: None,
            state: request.state,
            packages: 0,
            documents: 0,
            failure: None,
        }
    }

    fn settle(mut self, request: &RetrievalRequest, failure: Option<RetrievalError>) -> Self {
        self.state = request.state;
        self.request_id = request.id.clone();
        self.failure = failure;
        self
    }

    /// Returns true when the sub-range was retrieved and drained completely.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RequestState::Ready && self.failure.is_none()
    }
}

/// Drives one retrieval request to a terminal state, streaming every raw
/// document to `sink`.
///
/// Never returns early on per-package trouble without first recording a
/// terminal state on the request; the caller decides about resubmission.
pub async fn drive<C: RegistryClient>(
    client: &C,
    rfc: &str,
    mut request: RetrievalRequest,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    sink: &mpsc::Sender<RawDocument>,
) -> SubRangeOutcome {
    let outcome = SubRangeOutcome::new(&request);
    let range = request.range;

    // --- Submission ---
    let params = SubmitParams {
        rfc: rfc.to_string(),
        range,
        content: request.content,
        direction: request.direction,
    };
    let id = match client.submit(&params).await {
        Ok(resp) => {
            request.message = Some(resp.message.clone());
            if let Some(id) = resp.request_id {
                advance(&mut request, RequestState::Accepted);
                request.id = Some(id.clone());
                info!(%range, request_id = %id, "bulk request accepted");
                id
            } else {
                advance(&mut request, RequestState::Rejected);
                warn!(%range, code = %resp.code, message = %resp.message, "bulk request rejected");
                return outcome.settle(
                    &request,
                    Some(RetrievalError::Rejected {
                        range,
                        reason: resp.message,
                    }),
                );
            }
        }
        Err(err) => {
            advance(&mut request, RequestState::Errored);
            return outcome.settle(
                &request,
                Some(RetrievalError::Errored {
                    range,
                    detail: err.to_string(),
                }),
            );
        }
    };

    // --- Polling ---
    let mut polls: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            advance(&mut request, RequestState::Cancelled);
            return outcome.settle(&request, Some(RetrievalError::Cancelled { range }));
        }
        if request.expire_if_past(Utc::now()) {
            warn!(%range, request_id = %id, "request expired before completion");
            return outcome.settle(&request, Some(RetrievalError::Expired { range }));
        }

        match client.poll(&id).await {
            Ok(resp) => {
                request.message = resp.message.clone();
                match resp.status {
                    RegistryStatus::Accepted => {
                        debug!(%range, request_id = %id, "request still queued");
                    }
                    RegistryStatus::InProcess => {
                        advance(&mut request, RequestState::Processing);
                        debug!(%range, request_id = %id, "request in process");
                    }
                    RegistryStatus::Ready => {
                        advance(&mut request, RequestState::Ready);
                        break;
                    }
                    RegistryStatus::Errored => {
                        advance(&mut request, RequestState::Errored);
                        return outcome.settle(
                            &request,
                            Some(RetrievalError::Errored {
                                range,
                                detail: resp.message.unwrap_or_else(|| "registry error".into()),
                            }),
                        );
                    }
                    RegistryStatus::Rejected => {
                        advance(&mut request, RequestState::Rejected);
                        return outcome.settle(
                            &request,
                            Some(RetrievalError::Rejected {
                                range,
                                reason: resp.message.unwrap_or_else(|| "rejected".into()),
                            }),
                        );
                    }
                }
            }
            Err(err) => {
                // Transient poll failure: consumes an attempt, nothing more.
                warn!(%range, request_id = %id, %err, "status poll failed");
            }
        }

        polls += 1;
        if polls >= policy.max_polls {
            advance(&mut request, RequestState::Errored);
            return outcome.settle(
                &request,
                Some(RetrievalError::Errored {
                    range,
                    detail: format!("poll budget exhausted after {polls} polls"),
                }),
            );
        }
        let delay = policy.backoff_delay(polls);
        tokio::select! {
            () = cancel.cancelled() => {
                advance(&mut request, RequestState::Cancelled);
                return outcome.settle(&request, Some(RetrievalError::Cancelled { range }));
            }
            () = tokio::time::sleep(delay) => {}
        }
    }

    // --- Drain ---
    let handles = match client.list_packages(&id).await {
        Ok(handles) => handles,
        Err(err) => {
            advance(&mut request, RequestState::Errored);
            return outcome.settle(
                &request,
                Some(RetrievalError::Errored {
                    range,
                    detail: format!("listing packages failed: {err}"),
                }),
            );
        }
    };
    info!(%range, request_id = %id, packages = handles.len(), "request ready");

    let mut outcome = outcome;
    for handle in handles {
        let archive = match download_package(client, &id, &handle, policy).await {
            Ok(archive) => archive,
            Err(failure) => {
                advance(&mut request, RequestState::Errored);
                return outcome.settle(&request, Some(failure));
            }
        };
        let docs = match archive.documents() {
            Ok(docs) => docs,
            Err(err) => {
                advance(&mut request, RequestState::Errored);
                return outcome.settle(&request, Some(err));
            }
        };
        for doc in docs {
            if sink.send(doc).await.is_err() {
                // The flattening side went away; treat as caller cancellation.
                advance(&mut request, RequestState::Cancelled);
                return outcome.settle(&request, Some(RetrievalError::Cancelled { range }));
            }
            outcome.documents += 1;
        }
        outcome.packages += 1;
    }

    info!(
        %range,
        request_id = %id,
        packages = outcome.packages,
        documents = outcome.documents,
        "sub-range drained"
    );
    outcome.settle(&request, None)
}

/// Downloads one package with bounded retries.
async fn download_package<C: RegistryClient>(
    client: &C,
    id: &RequestId,
    handle: &PackageHandle,
    policy: &PollPolicy,
) -> Result<PackageArchive, RetrievalError> {
    let mut last_error = String::new();
    for attempt in 1..=policy.download_attempts {
        match client.download(id, handle).await {
            Ok(archive) => return Ok(archive),
            Err(err) => {
                warn!(package = %handle, attempt, %err, "package download failed");
                last_error = err.to_string();
            }
        }
        if attempt < policy.download_attempts {
            tokio::time::sleep(DOWNLOAD_RETRY_DELAY.saturating_mul(attempt)).await;
        }
    }
    Err(RetrievalError::DownloadFailed {
        package: handle.0.clone(),
        attempts: policy.download_attempts,
        detail: last_error,
    })
}

/// Advances the request, logging (never honoring) a backward registry report.
fn advance(request: &mut RetrievalRequest, next: RequestState) {
    if let Err(err) = request.advance(next) {
        warn!(%err, "ignoring backward state transition");
    }
}
