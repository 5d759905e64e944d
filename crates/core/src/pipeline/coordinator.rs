//! Stage sequencing across sub-ranges, flattening, and reconciliation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tributo_shared::AppError;
use tributo_shared::config::AppConfig;
use tributo_shared::types::{Period, RunId};

use crate::cfdi::Direction;
use crate::flatten::engine::flatten_batch;
use crate::reconcile::engine::reconcile;
use crate::reconcile::ledger::build_ledger;
use crate::retrieval::client::RegistryClient;
use crate::retrieval::machine::{PollPolicy, drive};
use crate::retrieval::sizing::split_range;
use crate::retrieval::types::{ContentKind, DateRange, RawDocument, RetrievalRequest};

use super::error::PipelineError;
use super::report::PipelineReport;
use super::sink::TableSink;

/// Capacity of the raw-document channel between retrieval and flattening.
const DOCUMENT_CHANNEL_CAPACITY: usize = 256;

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct RunParams {
    /// RFC of the taxpayer the retrieval is for.
    pub rfc: String,
    /// Full caller date range.
    pub range: DateRange,
    /// Direction filter.
    pub direction: Direction,
    /// Requested content kind.
    pub content: ContentKind,
    /// Sub-range width in days.
    pub window_days: u32,
    /// Flattening worker-pool size (0 = rayon default).
    pub workers: usize,
    /// Target reconciliation period.
    pub period: Period,
}

impl RunParams {
    /// Builds run parameters from the loaded application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when a filter or period value is outside
    /// its closed vocabulary.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let direction = Direction::from_config(&config.pipeline.direction).ok_or_else(|| {
            AppError::Config(format!(
                "unknown direction filter: {}",
                config.pipeline.direction
            ))
        })?;
        let content = ContentKind::from_config(&config.pipeline.content_kind).ok_or_else(|| {
            AppError::Config(format!(
                "unknown content kind: {}",
                config.pipeline.content_kind
            ))
        })?;
        let period: Period = config
            .pipeline
            .period
            .parse()
            .map_err(|e| AppError::Config(format!("{e}")))?;

        Ok(Self {
            rfc: config.registry.rfc.clone(),
            range: DateRange::new(config.pipeline.start_date, config.pipeline.end_date),
            direction,
            content,
            window_days: config.pipeline.window_days,
            workers: config.pipeline.workers,
            period,
        })
    }
}

/// Sequences the three pipeline stages over a shared client and sink.
pub struct Coordinator<C, S> {
    client: Arc<C>,
    sink: Arc<S>,
    policy: PollPolicy,
}

impl<C, S> Coordinator<C, S>
where
    C: RegistryClient + 'static,
    S: TableSink + 'static,
{
    /// Creates a coordinator over a registry client and a table sink.
    pub fn new(client: Arc<C>, sink: Arc<S>, policy: PollPolicy) -> Self {
        Self {
            client,
            sink,
            policy,
        }
    }

    /// Runs one full retrieve-flatten-reconcile cycle.
    ///
    /// Sub-ranges progress and fail independently; the retrieval stage is
    /// complete once every sub-range reached a terminal state. Rows from
    /// earlier runs stay in the sink, so re-running after a failed sub-range
    /// merges by key instead of duplicating.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Reconcile`] when the merged ledger cannot be
    /// reconciled; retrieval and flattening failures are reported in the
    /// [`PipelineReport`] instead.
    pub async fn run(
        &self,
        params: &RunParams,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let run = RunId::new();
        let ranges = split_range(params.range, params.window_days);
        info!(
            %run,
            range = %params.range,
            subranges = ranges.len(),
            direction = %params.direction,
            "starting pipeline run"
        );

        // --- Retrieval: one independent task per sub-range ---
        let (tx, mut rx) = mpsc::channel::<RawDocument>(DOCUMENT_CHANNEL_CAPACITY);
        let mut tasks = JoinSet::new();
        for range in ranges {
            let client = Arc::clone(&self.client);
            let policy = self.policy.clone();
            let rfc = params.rfc.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            let request =
                RetrievalRequest::new(range, params.content, params.direction, Utc::now());
            tasks.spawn(async move {
                drive(client.as_ref(), &rfc, request, &policy, &cancel, &tx).await
            });
        }
        drop(tx);

        // Drain documents as they stream in; the channel closes once every
        // sub-range task finished and dropped its sender.
        let mut raw_docs = Vec::new();
        while let Some(doc) = rx.recv().await {
            raw_docs.push(doc);
        }

        let mut subranges = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => subranges.push(outcome),
                Err(err) => {
                    return Err(PipelineError::Internal(format!(
                        "retrieval task failed: {err}"
                    )));
                }
            }
        }
        subranges.sort_by_key(|o| o.range);
        let failed = subranges.iter().filter(|o| !o.is_success()).count();
        if failed > 0 {
            warn!(%run, failed, "sub-ranges ended in a failure state");
        }

        // --- Flattening: pure computation on a worker pool ---
        let direction = params.direction;
        let workers = params.workers;
        let batch = tokio::task::spawn_blocking(move || {
            flatten_batch(&raw_docs, direction, workers)
        })
        .await
        .map_err(|err| PipelineError::Internal(format!("flattening stage failed: {err}")))?;

        let mut rows_upserted = 0;
        for flat in &batch.documents {
            rows_upserted += flat.row_count();
            self.sink.apply(flat);
        }

        // --- Reconciliation over the merged snapshot ---
        let snapshot = self.sink.snapshot();
        let (ledger, mut reconcile_warnings) = build_ledger(&snapshot.ledger_inputs());
        self.sink.apply_ledger(&ledger);
        let outcome = reconcile(&ledger, params.period)?;
        reconcile_warnings.extend(outcome.warnings);

        info!(
            %run,
            documents = batch.documents.len(),
            rows = rows_upserted,
            ledger = ledger.len(),
            net = %outcome.balance.net(),
            "pipeline run complete"
        );

        Ok(PipelineReport {
            run,
            period: params.period,
            subranges,
            flatten_failures: batch.failures,
            consistency_warnings: batch.warnings,
            reconcile_warnings,
            documents_flattened: batch.documents.len(),
            rows_upserted,
            ledger_records: ledger.len(),
            unmatched_deferred: outcome.unmatched_deferred,
            balance: outcome.balance,
        })
    }
}
