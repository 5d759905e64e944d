//! Structured run report.
//!
//! Everything the caller needs to decide what to resubmit: each sub-range's
//! terminal outcome, per-document flattening failures, consistency findings,
//! and the computed balance.

use serde::Serialize;

use tributo_shared::types::{Period, RunId};

use crate::flatten::engine::{ConsistencyWarning, FlattenFailure};
use crate::reconcile::types::{Balance, ReconcileWarning};
use crate::retrieval::machine::SubRangeOutcome;

/// The structured result of one pipeline run.
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    /// Identifier of this run.
    pub run: RunId,
    /// Period the balance was computed for.
    pub period: Period,
    /// Completion log: one terminal outcome per sub-range.
    pub subranges: Vec<SubRangeOutcome>,
    /// Per-document flattening failures.
    pub flatten_failures: Vec<FlattenFailure>,
    /// Tax-total consistency findings.
    pub consistency_warnings: Vec<ConsistencyWarning>,
    /// Reconciliation findings.
    pub reconcile_warnings: Vec<ReconcileWarning>,
    /// Documents flattened successfully this run.
    pub documents_flattened: usize,
    /// Rows upserted into the table store this run.
    pub rows_upserted: usize,
    /// Ledger records in the merged ledger.
    pub ledger_records: usize,
    /// Deferred issuances with no settlement anywhere in the data set.
    pub unmatched_deferred: usize,
    /// The reconciled balance.
    pub balance: Balance,
}

impl PipelineReport {
    /// Sub-ranges that did not drain successfully and are candidates for
    /// resubmission.
    pub fn failed_subranges(&self) -> impl Iterator<Item = &SubRangeOutcome> {
        self.subranges.iter().filter(|o| !o.is_success())
    }

    /// Returns true when every stage finished without a single failure or
    /// finding.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_subranges().next().is_none()
            && self.flatten_failures.is_empty()
            && self.consistency_warnings.is_empty()
            && self.reconcile_warnings.is_empty()
    }
}
