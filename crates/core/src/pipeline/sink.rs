//! The seam between the pipeline and the relational table store.
//!
//! The coordinator never talks to a concrete store; it feeds rows through
//! this trait and reads back merged snapshots. Implementations must make
//! `apply` a keyed upsert so re-ingesting a batch replaces rather than
//! duplicates.

use crate::flatten::rows::{
    ConceptRow, ConceptTaxRow, DocTaxRow, DocumentRow, FlatDocument, LocalTaxRow, PaymentRow,
    RelatedDocRow,
};
use crate::reconcile::ledger::LedgerInputs;
use crate::reconcile::types::LedgerRecord;

/// Keyed-upsert sink for flattened rows and ledger records.
pub trait TableSink: Send + Sync {
    /// Upserts every row of one flattened document by its composite key.
    fn apply(&self, document: &FlatDocument);

    /// Replaces ledger records by (uuid, entry) key.
    fn apply_ledger(&self, records: &[LedgerRecord]);

    /// An owned, deterministically ordered copy of every table, merged
    /// across all runs applied so far.
    fn snapshot(&self) -> TableSnapshot;
}

/// Owned copy of the flattened tables, rows sorted by composite key.
#[derive(Debug, Clone, Default)]
pub struct TableSnapshot {
    /// Document headers.
    pub documents: Vec<DocumentRow>,
    /// Concept rows.
    pub concepts: Vec<ConceptRow>,
    /// Concept-level tax rows.
    pub concept_taxes: Vec<ConceptTaxRow>,
    /// Document-level tax rows.
    pub doc_taxes: Vec<DocTaxRow>,
    /// Local-tax rows.
    pub local_taxes: Vec<LocalTaxRow>,
    /// Payment rows.
    pub payments: Vec<PaymentRow>,
    /// Related-document rows.
    pub related_docs: Vec<RelatedDocRow>,
}

impl TableSnapshot {
    /// The borrowed view the ledger builder consumes.
    #[must_use]
    pub fn ledger_inputs(&self) -> LedgerInputs<'_> {
        LedgerInputs {
            documents: &self.documents,
            concept_taxes: &self.concept_taxes,
            doc_taxes: &self.doc_taxes,
            payments: &self.payments,
            related_docs: &self.related_docs,
        }
    }
}
