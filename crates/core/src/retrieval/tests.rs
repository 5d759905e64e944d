//! State-machine tests against a scripted registry client.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tributo_shared::types::RequestId;

use crate::cfdi::Direction;

use super::client::{
    PollResponse, RegistryCallError, RegistryClient, SubmitParams, SubmitResponse,
};
use super::error::RetrievalError;
use super::machine::{PollPolicy, drive};
use super::types::{
    ContentKind, DateRange, PackageArchive, PackageHandle, RawDocument, RegistryStatus,
    RequestState, RetrievalRequest,
};

fn range() -> DateRange {
    DateRange::new(
        chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        chrono::NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
    )
}

fn policy() -> PollPolicy {
    PollPolicy {
        max_polls: 5,
        backoff_base: Duration::from_secs(1),
        backoff_cap: Duration::from_secs(4),
        download_attempts: 3,
    }
}

fn request() -> RetrievalRequest {
    RetrievalRequest::new(range(), ContentKind::Full, Direction::Received, Utc::now())
}

fn accepted_submit() -> Result<SubmitResponse, RegistryCallError> {
    Ok(SubmitResponse {
        request_id: Some(RequestId::new("req-001")),
        code: "5000".to_string(),
        message: "Solicitud Aceptada".to_string(),
    })
}

fn poll(status: RegistryStatus) -> Result<PollResponse, RegistryCallError> {
    Ok(PollResponse {
        status,
        message: None,
    })
}

/// Builds an uncompressed ZIP archive of named XML entries.
fn archive_bytes(entries: &[(&str, &str)]) -> Bytes {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    Bytes::from(cursor.into_inner())
}

/// Scripted in-process registry double.
struct ScriptedClient {
    submit_response: Result<SubmitResponse, RegistryCallError>,
    polls: Mutex<VecDeque<Result<PollResponse, RegistryCallError>>>,
    packages: Vec<PackageHandle>,
    archives: HashMap<String, Bytes>,
    failing_downloads: AtomicU32,
}

impl ScriptedClient {
    fn new(
        submit_response: Result<SubmitResponse, RegistryCallError>,
        polls: Vec<Result<PollResponse, RegistryCallError>>,
    ) -> Self {
        Self {
            submit_response,
            polls: Mutex::new(polls.into()),
            packages: Vec::new(),
            archives: HashMap::new(),
            failing_downloads: AtomicU32::new(0),
        }
    }

    fn with_package(mut self, handle: &str, archive: Bytes) -> Self {
        self.packages.push(PackageHandle(handle.to_string()));
        self.archives.insert(handle.to_string(), archive);
        self
    }

    fn with_failing_downloads(self, failures: u32) -> Self {
        self.failing_downloads.store(failures, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl RegistryClient for ScriptedClient {
    async fn submit(&self, _params: &SubmitParams) -> Result<SubmitResponse, RegistryCallError> {
        self.submit_response.clone()
    }

    async fn poll(&self, _id: &RequestId) -> Result<PollResponse, RegistryCallError> {
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| poll(RegistryStatus::InProcess))
    }

    async fn list_packages(
        &self,
        _id: &RequestId,
    ) -> Result<Vec<PackageHandle>, RegistryCallError> {
        Ok(self.packages.clone())
    }

    async fn download(
        &self,
        _id: &RequestId,
        handle: &PackageHandle,
    ) -> Result<PackageArchive, RegistryCallError> {
        if self
            .failing_downloads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RegistryCallError::Transport("connection reset".to_string()));
        }
        let data = self
            .archives
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| RegistryCallError::Api {
                code: Some(404),
                message: format!("unknown package {handle}"),
            })?;
        Ok(PackageArchive {
            handle: handle.clone(),
            data,
        })
    }
}

async fn drive_collecting(
    client: &ScriptedClient,
    req: RetrievalRequest,
) -> (super::machine::SubRangeOutcome, Vec<RawDocument>) {
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let outcome = drive(client, "XAXX010101000", req, &policy(), &cancel, &tx).await;
    drop(tx);
    let mut docs = Vec::new();
    while let Ok(doc) = rx.try_recv() {
        docs.push(doc);
    }
    (outcome, docs)
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_drains_all_documents() {
    let archive = archive_bytes(&[
        ("a.xml", "<doc>a</doc>"),
        ("b.xml", "<doc>b</doc>"),
        ("listing.txt", "not a document"),
    ]);
    let client = ScriptedClient::new(
        accepted_submit(),
        vec![poll(RegistryStatus::InProcess), poll(RegistryStatus::Ready)],
    )
    .with_package("pkg-1", archive);

    let (outcome, docs) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Ready);
    assert!(outcome.is_success());
    assert_eq!(outcome.packages, 1);
    assert_eq!(outcome.documents, 2);
    assert_eq!(outcome.request_id, Some(RequestId::new("req-001")));
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].name, "a.xml");
    assert_eq!(docs[0].package, "pkg-1");
}

#[tokio::test(start_paused = true)]
async fn test_submission_rejection_is_terminal_and_not_polled() {
    let client = ScriptedClient::new(
        Ok(SubmitResponse {
            request_id: None,
            code: "5002".to_string(),
            message: "Se agoto las solicitudes de por vida".to_string(),
        }),
        vec![],
    );

    let (outcome, docs) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Rejected);
    assert!(docs.is_empty());
    match outcome.failure {
        Some(RetrievalError::Rejected { reason, .. }) => {
            assert!(reason.contains("agoto"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_registry_error_code_terminates_subrange() {
    let client = ScriptedClient::new(
        accepted_submit(),
        vec![
            poll(RegistryStatus::InProcess),
            Ok(PollResponse {
                status: RegistryStatus::Errored,
                message: Some("Error no controlado".to_string()),
            }),
        ],
    );

    let (outcome, _) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Errored);
    assert!(matches!(
        outcome.failure,
        Some(RetrievalError::Errored { .. })
    ));
    // The failing sub-range is reported so the caller can resubmit it.
    assert_eq!(outcome.range, range());
}

#[tokio::test(start_paused = true)]
async fn test_poll_rejection_surfaces_reason() {
    let client = ScriptedClient::new(
        accepted_submit(),
        vec![Ok(PollResponse {
            status: RegistryStatus::Rejected,
            message: Some("RFC no corresponde".to_string()),
        })],
    );

    let (outcome, _) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Rejected);
    match outcome.failure {
        Some(RetrievalError::Rejected { reason, .. }) => {
            assert_eq!(reason, "RFC no corresponde");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stuck_processing_past_expiry_becomes_expired() {
    // The registry keeps reporting InProcess, but the request was created
    // past its 72-hour window: the next poll cycle must expire it without
    // honoring the remote code.
    let client = ScriptedClient::new(accepted_submit(), vec![]);
    let created = Utc::now() - TimeDelta::hours(73);
    let req = RetrievalRequest::new(range(), ContentKind::Full, Direction::Received, created);

    let (outcome, _) = drive_collecting(&client, req).await;

    assert_eq!(outcome.state, RequestState::Expired);
    assert!(matches!(
        outcome.failure,
        Some(RetrievalError::Expired { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_poll_budget_exhaustion_errors_the_request() {
    let client = ScriptedClient::new(accepted_submit(), vec![]);

    let (outcome, _) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Errored);
    match outcome.failure {
        Some(RetrievalError::Errored { detail, .. }) => {
            assert!(detail.contains("poll budget exhausted"));
        }
        other => panic!("expected Errored, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_download_retries_then_succeeds() {
    let archive = archive_bytes(&[("a.xml", "<doc/>")]);
    let client = ScriptedClient::new(accepted_submit(), vec![poll(RegistryStatus::Ready)])
        .with_package("pkg-1", archive)
        .with_failing_downloads(2);

    let (outcome, docs) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Ready);
    assert_eq!(docs.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_download_exhaustion_marks_request_errored() {
    let archive = archive_bytes(&[("a.xml", "<doc/>")]);
    let client = ScriptedClient::new(accepted_submit(), vec![poll(RegistryStatus::Ready)])
        .with_package("pkg-1", archive)
        .with_failing_downloads(10);

    let (outcome, docs) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Errored);
    assert!(docs.is_empty());
    match outcome.failure {
        Some(RetrievalError::DownloadFailed {
            package, attempts, ..
        }) => {
            assert_eq!(package, "pkg-1");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected DownloadFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_poll_failures_are_retried() {
    let archive = archive_bytes(&[("a.xml", "<doc/>")]);
    let client = ScriptedClient::new(
        accepted_submit(),
        vec![
            Err(RegistryCallError::Transport("timeout".to_string())),
            poll(RegistryStatus::Ready),
        ],
    )
    .with_package("pkg-1", archive);

    let (outcome, docs) = drive_collecting(&client, request()).await;

    assert_eq!(outcome.state, RequestState::Ready);
    assert_eq!(docs.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_before_ready() {
    let client = ScriptedClient::new(accepted_submit(), vec![]);
    let (tx, _rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = drive(&client, "XAXX010101000", request(), &policy(), &cancel, &tx).await;

    assert_eq!(outcome.state, RequestState::Cancelled);
    assert!(matches!(
        outcome.failure,
        Some(RetrievalError::Cancelled { .. })
    ));
}

#[test]
fn test_backoff_is_exponential_and_capped() {
    let policy = PollPolicy {
        max_polls: 10,
        backoff_base: Duration::from_secs(60),
        backoff_cap: Duration::from_secs(600),
        download_attempts: 3,
    };
    assert_eq!(policy.backoff_delay(1), Duration::from_secs(60));
    assert_eq!(policy.backoff_delay(2), Duration::from_secs(120));
    assert_eq!(policy.backoff_delay(3), Duration::from_secs(240));
    assert_eq!(policy.backoff_delay(4), Duration::from_secs(480));
    assert_eq!(policy.backoff_delay(5), Duration::from_secs(600));
    assert_eq!(policy.backoff_delay(9), Duration::from_secs(600));
}

#[test]
fn test_archive_extraction_skips_non_xml_entries() {
    let archive = PackageArchive {
        handle: PackageHandle("pkg-9".to_string()),
        data: archive_bytes(&[("one.xml", "<a/>"), ("two.XML", "<b/>"), ("meta.txt", "x")]),
    };
    let docs = archive.documents().unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.package == "pkg-9"));
}

#[test]
fn test_archive_garbage_is_an_error() {
    let archive = PackageArchive {
        handle: PackageHandle("pkg-9".to_string()),
        data: Bytes::from_static(b"definitely not a zip"),
    };
    assert!(matches!(
        archive.documents(),
        Err(RetrievalError::Archive(_))
    ));
}
