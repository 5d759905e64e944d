//! Parallel batch flattening.
//!
//! Documents are independent: per-document work is never split further, and
//! no document depends on another's result. The batch fans out over a rayon
//! worker pool and collects results in input order, so flattening the same
//! batch twice yields identical rows in identical order.

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use tributo_shared::types::BatchId;

use crate::cfdi::{Direction, TaxKind};
use crate::retrieval::types::RawDocument;

use super::error::FlattenError;
use super::parser::parse_document;
use super::rows::FlatDocument;

/// One per-document failure, reported in aggregate after the batch completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenFailure {
    /// Source entry name (package entry, usually `<uuid>.xml`).
    pub source: String,
    /// Document UUID when it could be recovered from the entry name.
    pub uuid: Option<Uuid>,
    /// Stable error code.
    pub code: String,
    /// Human-readable failure detail.
    pub message: String,
}

/// A declared-versus-computed tax total discrepancy.
///
/// Violations of the tax-total invariant are reported, never silently
/// corrected: the declared document rows are kept as parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyWarning {
    /// Document the discrepancy was found in.
    pub uuid: Uuid,
    /// Which side of the tax totals disagreed.
    pub kind: TaxKind,
    /// Total declared at document level.
    pub declared: Decimal,
    /// Sum of the concept-level details of the same kind.
    pub computed: Decimal,
}

/// Result of flattening one batch of raw documents.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Identifier of this batch.
    pub batch: BatchId,
    /// Successfully flattened documents, in input order.
    pub documents: Vec<FlatDocument>,
    /// Per-document failures, in input order.
    pub failures: Vec<FlattenFailure>,
    /// Tax-total consistency warnings.
    pub warnings: Vec<ConsistencyWarning>,
}

impl BatchOutcome {
    /// Returns true when every document flattened cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.warnings.is_empty()
    }
}

/// Flattens a batch of raw documents on a worker pool.
///
/// A failed document does not abort the batch; its error is collected into
/// the outcome keyed by source entry (and UUID when recoverable). `workers`
/// of zero uses rayon's global pool sizing.
#[must_use]
pub fn flatten_batch(docs: &[RawDocument], direction: Direction, workers: usize) -> BatchOutcome {
    let results: Vec<Result<FlatDocument, FlattenError>> = if workers == 0 {
        flatten_all(docs, direction)
    } else {
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| flatten_all(docs, direction)),
            Err(err) => {
                warn!(%err, "failed to size worker pool, using global pool");
                flatten_all(docs, direction)
            }
        }
    };

    let mut documents = Vec::new();
    let mut failures = Vec::new();
    let mut warnings = Vec::new();

    for (raw, result) in docs.iter().zip(results) {
        match result {
            Ok(flat) => {
                check_tax_totals(&flat, &mut warnings);
                documents.push(flat);
            }
            Err(err) => failures.push(FlattenFailure {
                source: raw.name.clone(),
                uuid: uuid_from_name(&raw.name),
                code: err.error_code().to_string(),
                message: err.to_string(),
            }),
        }
    }

    debug!(
        total = docs.len(),
        ok = documents.len(),
        failed = failures.len(),
        warnings = warnings.len(),
        "flattened batch"
    );

    BatchOutcome {
        batch: BatchId::new(),
        documents,
        failures,
        warnings,
    }
}

fn flatten_all(
    docs: &[RawDocument],
    direction: Direction,
) -> Vec<Result<FlatDocument, FlattenError>> {
    docs.par_iter()
        .map(|raw| parse_document(&raw.content, direction))
        .collect()
}

/// Checks the declared document-level tax totals against the sum of the
/// concept-level details of the same kind.
fn check_tax_totals(flat: &FlatDocument, warnings: &mut Vec<ConsistencyWarning>) {
    // A document may legitimately declare totals without concept-level
    // detail; only a present-but-disagreeing breakdown is a violation.
    if flat.concept_taxes.is_empty() {
        return;
    }
    for (kind, declared) in [
        (TaxKind::Transferred, flat.document.total_transferred),
        (TaxKind::Withheld, flat.document.total_withheld),
    ] {
        let Some(declared) = declared else { continue };
        let computed: Decimal = flat
            .concept_taxes
            .iter()
            .filter(|t| t.kind == kind)
            .filter_map(|t| t.amount)
            .sum();
        if computed != declared {
            warnings.push(ConsistencyWarning {
                uuid: flat.document.uuid,
                kind,
                declared,
                computed,
            });
        }
    }
}

/// Package entries are conventionally named `<uuid>.xml`; recover the UUID
/// from the name when a document fails before its timbre is parsed.
fn uuid_from_name(name: &str) -> Option<Uuid> {
    let stem = name.rsplit('/').next()?.strip_suffix(".xml")?;
    Uuid::parse_str(stem).ok()
}
