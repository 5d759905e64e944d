//! Ledger construction: merging flattened tables into reconciliation input.
//!
//! The ledger is rebuilt wholesale from the current table snapshot on every
//! run. Issuance entries come from taxable documents; settlement entries
//! come from payment pairings, with the VAT portion taken from the parsed
//! per-pairing detail when present and otherwise apportioned by the
//! amount-paid fraction of the related document.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::cfdi::{DocumentType, TaxKind, VAT_TAX_CODE};
use crate::flatten::rows::{ConceptTaxRow, DocTaxRow, DocumentRow, PaymentRow, RelatedDocRow};

use super::types::{EntryKind, LedgerKey, LedgerRecord, ReconcileWarning, Regime};

/// Borrowed slices of the flattened tables the ledger is built from.
#[derive(Debug, Clone, Copy)]
pub struct LedgerInputs<'a> {
    /// Document headers.
    pub documents: &'a [DocumentRow],
    /// Concept-level tax rows.
    pub concept_taxes: &'a [ConceptTaxRow],
    /// Document-level tax rows.
    pub doc_taxes: &'a [DocTaxRow],
    /// Payment rows.
    pub payments: &'a [PaymentRow],
    /// Related-document rows.
    pub related_docs: &'a [RelatedDocRow],
}

/// Builds the unified ledger from the flattened tables.
///
/// Output order is deterministic: issuance entries in document order, then
/// settlement entries sorted by (uuid, payment, related). Re-running over
/// the same snapshot yields identical records.
#[must_use]
pub fn build_ledger(inputs: &LedgerInputs<'_>) -> (Vec<LedgerRecord>, Vec<ReconcileWarning>) {
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    let vat_totals = vat_by_document(inputs);
    let documents: HashMap<Uuid, &DocumentRow> =
        inputs.documents.iter().map(|d| (d.uuid, d)).collect();

    // Issuance entries: one per taxable document, entry ordinal 0.
    for doc in inputs.documents {
        if !doc.doc_type.is_taxable() {
            continue;
        }
        let vat = vat_totals.get(&doc.uuid).copied().unwrap_or(Decimal::ZERO);
        let signed_vat = if doc.doc_type == DocumentType::Egreso {
            -vat
        } else {
            vat
        };
        records.push(LedgerRecord {
            key: LedgerKey {
                uuid: doc.uuid,
                entry: 0,
            },
            kind: EntryKind::Issuance,
            direction: doc.direction,
            doc_type: doc.doc_type,
            regime: Regime::from_method(doc.payment_method),
            accrual_date: doc.issue_date,
            amount: doc.total,
            vat: signed_vat,
            related_uuid: None,
        });
    }

    // Settlement entries: one per payment pairing, entry ordinals from 1 in
    // source order.
    let payments: HashMap<(Uuid, u32), &PaymentRow> = inputs
        .payments
        .iter()
        .map(|p| ((p.uuid, p.payment), p))
        .collect();
    let mut pairings_per_payment: HashMap<(Uuid, u32), u32> = HashMap::new();
    for row in inputs.related_docs {
        *pairings_per_payment
            .entry((row.uuid, row.payment))
            .or_insert(0) += 1;
    }

    let mut related: Vec<&RelatedDocRow> = inputs.related_docs.iter().collect();
    related.sort_by_key(|r| (r.uuid, r.payment, r.related));

    let mut next_entry: HashMap<Uuid, u32> = HashMap::new();
    for row in related {
        let Some(payment) = payments.get(&(row.uuid, row.payment)) else {
            continue;
        };
        let Some(payment_doc) = documents.get(&row.uuid) else {
            continue;
        };

        let amount_paid = row.amount_paid.or_else(|| {
            // A payment that settles exactly one document and omits the
            // per-document amount pays it in full.
            (pairings_per_payment.get(&(row.uuid, row.payment)) == Some(&1))
                .then_some(payment.amount)
        });

        let vat = row.vat_paid.or_else(|| {
            apportioned_vat(
                row.related_uuid,
                amount_paid,
                &documents,
                &vat_totals,
            )
        });
        let vat = match vat {
            Some(vat) => vat,
            None => {
                warnings.push(ReconcileWarning::UnderivableSettlementVat {
                    uuid: row.uuid,
                    payment: row.payment,
                    related: row.related,
                });
                Decimal::ZERO
            }
        };

        let entry = next_entry.entry(row.uuid).or_insert(0);
        *entry += 1;
        records.push(LedgerRecord {
            key: LedgerKey {
                uuid: row.uuid,
                entry: *entry,
            },
            kind: EntryKind::Settlement,
            direction: payment_doc.direction,
            doc_type: DocumentType::Pago,
            regime: Some(Regime::Deferred),
            accrual_date: payment.payment_date,
            amount: amount_paid.unwrap_or(Decimal::ZERO),
            vat,
            related_uuid: Some(row.related_uuid),
        });
    }

    (records, warnings)
}

/// VAT portion of a pairing derived from the related document: its VAT total
/// scaled by the amount-paid fraction, rounded half-even to centavos.
fn apportioned_vat(
    related_uuid: Uuid,
    amount_paid: Option<Decimal>,
    documents: &HashMap<Uuid, &DocumentRow>,
    vat_totals: &HashMap<Uuid, Decimal>,
) -> Option<Decimal> {
    let paid = amount_paid?;
    let related = documents.get(&related_uuid)?;
    if related.total.is_zero() {
        return None;
    }
    let vat = vat_totals.get(&related_uuid).copied().unwrap_or(Decimal::ZERO);
    Some((vat * paid / related.total).round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
}

/// Total transferred VAT per document: document-level detail when present,
/// concept-level sum otherwise. Unsigned; issuance entries apply the
/// credit-note sign.
fn vat_by_document(inputs: &LedgerInputs<'_>) -> HashMap<Uuid, Decimal> {
    let mut from_doc: HashMap<Uuid, Decimal> = HashMap::new();
    for tax in inputs.doc_taxes {
        if tax.kind == TaxKind::Transferred && tax.code == VAT_TAX_CODE {
            *from_doc.entry(tax.uuid).or_insert(Decimal::ZERO) += tax.amount;
        }
    }

    let mut from_concepts: HashMap<Uuid, Decimal> = HashMap::new();
    for tax in inputs.concept_taxes {
        if tax.kind == TaxKind::Transferred && tax.code == VAT_TAX_CODE {
            if let Some(amount) = tax.amount {
                *from_concepts.entry(tax.uuid).or_insert(Decimal::ZERO) += amount;
            }
        }
    }

    for (uuid, vat) in from_concepts {
        from_doc.entry(uuid).or_insert(vat);
    }
    from_doc
}
