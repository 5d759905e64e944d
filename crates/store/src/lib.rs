//! Keyed-upsert relational table store for Tributo.
//!
//! One concurrent map per table, keyed by composite identity (document UUID
//! plus ordinals). Upserting the same key replaces the prior row, so
//! re-ingesting a batch - after retrying a failed sub-range, or merging
//! partial runs - leaves the store identical to ingesting it once. No write
//! ever holds a lock longer than one row upsert.
//!
//! Snapshots and CSV exports are sorted by key, so identical store contents
//! always produce byte-identical artifacts.

pub mod error;
pub mod export;

pub use error::StoreError;
pub use export::export_tables;

use dashmap::DashMap;
use uuid::Uuid;

use tributo_core::flatten::rows::{
    ConceptRow, ConceptTaxRow, DocTaxRow, DocumentRow, FlatDocument, LocalTaxRow, PaymentRow,
    RelatedDocRow,
};
use tributo_core::pipeline::sink::{TableSink, TableSnapshot};
use tributo_core::reconcile::types::{LedgerKey, LedgerRecord};

/// The relational table model: one keyed map per entity kind.
#[derive(Debug, Default)]
pub struct TableStore {
    documents: DashMap<Uuid, DocumentRow>,
    concepts: DashMap<(Uuid, u32), ConceptRow>,
    concept_taxes: DashMap<(Uuid, u32, u32), ConceptTaxRow>,
    doc_taxes: DashMap<(Uuid, u32), DocTaxRow>,
    local_taxes: DashMap<(Uuid, u32), LocalTaxRow>,
    payments: DashMap<(Uuid, u32), PaymentRow>,
    related_docs: DashMap<(Uuid, u32, u32), RelatedDocRow>,
    ledger: DashMap<LedgerKey, LedgerRecord>,
}

impl TableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of document headers currently stored.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Total number of rows across all tables, ledger included.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.documents.len()
            + self.concepts.len()
            + self.concept_taxes.len()
            + self.doc_taxes.len()
            + self.local_taxes.len()
            + self.payments.len()
            + self.related_docs.len()
            + self.ledger.len()
    }

    /// The unified ledger, sorted by (uuid, entry) key.
    #[must_use]
    pub fn ledger_records(&self) -> Vec<LedgerRecord> {
        let mut records: Vec<LedgerRecord> =
            self.ledger.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.key);
        records
    }
}

impl TableSink for TableStore {
    fn apply(&self, document: &FlatDocument) {
        let doc = &document.document;
        self.documents.insert(doc.uuid, doc.clone());
        for row in &document.concepts {
            self.concepts.insert((row.uuid, row.concept), row.clone());
        }
        for row in &document.concept_taxes {
            self.concept_taxes
                .insert((row.uuid, row.concept, row.tax), row.clone());
        }
        for row in &document.doc_taxes {
            self.doc_taxes.insert((row.uuid, row.tax), row.clone());
        }
        for row in &document.local_taxes {
            self.local_taxes.insert((row.uuid, row.local), row.clone());
        }
        for row in &document.payments {
            self.payments.insert((row.uuid, row.payment), row.clone());
        }
        for row in &document.related_docs {
            self.related_docs
                .insert((row.uuid, row.payment, row.related), row.clone());
        }
    }

    fn apply_ledger(&self, records: &[LedgerRecord]) {
        for record in records {
            self.ledger.insert(record.key, record.clone());
        }
    }

    fn snapshot(&self) -> TableSnapshot {
        let mut snapshot = TableSnapshot {
            documents: self.documents.iter().map(|r| r.value().clone()).collect(),
            concepts: self.concepts.iter().map(|r| r.value().clone()).collect(),
            concept_taxes: self
                .concept_taxes
                .iter()
                .map(|r| r.value().clone())
                .collect(),
            doc_taxes: self.doc_taxes.iter().map(|r| r.value().clone()).collect(),
            local_taxes: self.local_taxes.iter().map(|r| r.value().clone()).collect(),
            payments: self.payments.iter().map(|r| r.value().clone()).collect(),
            related_docs: self
                .related_docs
                .iter()
                .map(|r| r.value().clone())
                .collect(),
        };
        snapshot.documents.sort_by_key(|r| r.uuid);
        snapshot.concepts.sort_by_key(|r| (r.uuid, r.concept));
        snapshot
            .concept_taxes
            .sort_by_key(|r| (r.uuid, r.concept, r.tax));
        snapshot.doc_taxes.sort_by_key(|r| (r.uuid, r.tax));
        snapshot.local_taxes.sort_by_key(|r| (r.uuid, r.local));
        snapshot.payments.sort_by_key(|r| (r.uuid, r.payment));
        snapshot
            .related_docs
            .sort_by_key(|r| (r.uuid, r.payment, r.related));
        snapshot
    }
}
