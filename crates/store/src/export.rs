//! Delimited flat-file export of every table.
//!
//! One CSV per entity kind plus the unified ledger and the single balance
//! row. Rows are written in key order, so identical store contents export
//! byte-identical files.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use chrono::NaiveDate;
use uuid::Uuid;

use tributo_core::cfdi::{Direction, DocumentType};
use tributo_core::pipeline::sink::TableSink;
use tributo_core::reconcile::types::{Balance, EntryKind, LedgerRecord, Regime};

use crate::TableStore;
use crate::error::StoreError;

/// The balance artifact row: the four sums plus their derived totals.
#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    period: String,
    owed_immediate: &'a Decimal,
    owed_deferred: &'a Decimal,
    creditable_immediate: &'a Decimal,
    creditable_deferred: &'a Decimal,
    owed_total: Decimal,
    creditable_total: Decimal,
    net: Decimal,
}

/// Flat projection of a ledger record; CSV rows cannot nest the key struct.
#[derive(Debug, Serialize)]
struct LedgerCsvRow {
    uuid: Uuid,
    entry: u32,
    kind: EntryKind,
    direction: Direction,
    doc_type: DocumentType,
    regime: Option<Regime>,
    accrual_date: NaiveDate,
    amount: Decimal,
    vat: Decimal,
    related_uuid: Option<Uuid>,
}

impl From<&LedgerRecord> for LedgerCsvRow {
    fn from(r: &LedgerRecord) -> Self {
        Self {
            uuid: r.key.uuid,
            entry: r.key.entry,
            kind: r.kind,
            direction: r.direction,
            doc_type: r.doc_type,
            regime: r.regime,
            accrual_date: r.accrual_date,
            amount: r.amount,
            vat: r.vat,
            related_uuid: r.related_uuid,
        }
    }
}

/// Exports every table, the unified ledger, and the balance to `dir`.
///
/// # Errors
///
/// Returns [`StoreError`] on filesystem or serialization failure.
pub fn export_tables(store: &TableStore, dir: &Path, balance: &Balance) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir)?;

    let snapshot = store.snapshot();
    write_csv(&dir.join("documents.csv"), &snapshot.documents)?;
    write_csv(&dir.join("concepts.csv"), &snapshot.concepts)?;
    write_csv(&dir.join("concept_taxes.csv"), &snapshot.concept_taxes)?;
    write_csv(&dir.join("doc_taxes.csv"), &snapshot.doc_taxes)?;
    write_csv(&dir.join("local_taxes.csv"), &snapshot.local_taxes)?;
    write_csv(&dir.join("payments.csv"), &snapshot.payments)?;
    write_csv(&dir.join("related_docs.csv"), &snapshot.related_docs)?;
    let ledger: Vec<LedgerCsvRow> = store.ledger_records().iter().map(Into::into).collect();
    write_csv(&dir.join("ledger.csv"), &ledger)?;

    let row = BalanceRow {
        period: balance.period.to_string(),
        owed_immediate: &balance.owed_immediate,
        owed_deferred: &balance.owed_deferred,
        creditable_immediate: &balance.creditable_immediate,
        creditable_deferred: &balance.creditable_deferred,
        owed_total: balance.owed(),
        creditable_total: balance.creditable(),
        net: balance.net(),
    };
    write_csv(&dir.join("balance.csv"), std::slice::from_ref(&row))?;

    info!(dir = %dir.display(), rows = store.row_count(), "exported tables");
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
