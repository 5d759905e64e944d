//! Balance computation over the unified ledger.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use tributo_shared::types::Period;

use crate::cfdi::Direction;

use super::error::ReconcileError;
use super::types::{Balance, EntryKind, LedgerRecord, ReconcileWarning, Regime};

/// Result of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    /// The computed balance.
    pub balance: Balance,
    /// Non-fatal findings, reported but never corrected.
    pub warnings: Vec<ReconcileWarning>,
    /// Records that accrued into the balance.
    pub counted: usize,
    /// Records accruing in a different period.
    pub out_of_period: usize,
    /// Deferred issuances with no settlement anywhere in the data set.
    /// Not an inconsistency: they simply accrue nothing yet.
    pub unmatched_deferred: usize,
}

/// Reconciles the full ledger into the balance for one period.
///
/// Aggregation is keyed, never order-dependent: permuting the input yields
/// an identical balance.
///
/// # Errors
///
/// Returns [`ReconcileError::InconsistentLedger`] when any record with a
/// VAT obligation cannot be classified into a settlement regime.
pub fn reconcile(
    records: &[LedgerRecord],
    period: Period,
) -> Result<ReconcileOutcome, ReconcileError> {
    // Refuse to guess before accruing anything.
    let mut unclassifiable: Vec<Uuid> = records
        .iter()
        .filter(|r| r.kind == EntryKind::Issuance && r.regime.is_none() && !r.vat.is_zero())
        .map(|r| r.key.uuid)
        .collect();
    if !unclassifiable.is_empty() {
        unclassifiable.sort_unstable();
        unclassifiable.dedup();
        return Err(ReconcileError::InconsistentLedger {
            uuids: unclassifiable,
        });
    }

    let issuances: HashMap<Uuid, &LedgerRecord> = records
        .iter()
        .filter(|r| r.kind == EntryKind::Issuance)
        .map(|r| (r.key.uuid, r))
        .collect();
    let settled: HashSet<Uuid> = records
        .iter()
        .filter(|r| r.kind == EntryKind::Settlement)
        .filter_map(|r| r.related_uuid)
        .collect();

    let mut balance = Balance::zero(period);
    let mut warnings = Vec::new();
    let mut counted = 0;
    let mut out_of_period = 0;
    let mut unmatched_deferred = 0;

    for record in records {
        match record.kind {
            EntryKind::Issuance => match record.regime {
                Some(Regime::Immediate) => {
                    if period.contains_date(record.accrual_date) {
                        accrue(&mut balance, record.direction, Regime::Immediate, record.vat);
                        counted += 1;
                    } else {
                        out_of_period += 1;
                    }
                }
                Some(Regime::Deferred) => {
                    // Accrues through its settlements, if any exist yet.
                    if !settled.contains(&record.key.uuid) {
                        unmatched_deferred += 1;
                    }
                }
                None => {} // zero-VAT record, nothing to accrue
            },
            EntryKind::Settlement => {
                if let Some(related) = record.related_uuid {
                    if let Some(issuance) = issuances.get(&related) {
                        if issuance.regime == Some(Regime::Immediate) {
                            warnings.push(ReconcileWarning::SettlementAgainstImmediate {
                                uuid: record.key.uuid,
                                related_uuid: related,
                            });
                            continue;
                        }
                    }
                }
                if period.contains_date(record.accrual_date) {
                    accrue(&mut balance, record.direction, Regime::Deferred, record.vat);
                    counted += 1;
                } else {
                    out_of_period += 1;
                }
            }
        }
    }

    Ok(ReconcileOutcome {
        balance,
        warnings,
        counted,
        out_of_period,
        unmatched_deferred,
    })
}

/// Adds one VAT contribution to the right of the four sums.
fn accrue(
    balance: &mut Balance,
    direction: Direction,
    regime: Regime,
    vat: rust_decimal::Decimal,
) {
    match (direction, regime) {
        (Direction::Issued, Regime::Immediate) => balance.owed_immediate += vat,
        (Direction::Issued, Regime::Deferred) => balance.owed_deferred += vat,
        (Direction::Received, Regime::Immediate) => balance.creditable_immediate += vat,
        (Direction::Received, Regime::Deferred) => balance.creditable_deferred += vat,
    }
}
