//! Relational row types produced by the flattening engine.
//!
//! Every row carries the originating document UUID plus all ordinal indices
//! needed to reconstruct the exact source hierarchy. Downstream stages relate
//! tables only through these composite keys; nothing ever re-parses raw XML.
//!
//! Ordinal indices are 1-based and contiguous within their parent, in source
//! order. Rows are immutable once produced.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cfdi::{CfdiVersion, Direction, DocumentType, PaymentMethod, TaxKind};

/// One fiscal document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Fiscal folio UUID assigned by the stamping authority.
    pub uuid: Uuid,
    /// Document format version.
    pub version: CfdiVersion,
    /// Document type.
    pub doc_type: DocumentType,
    /// Which side of the taxpayer the document sits on.
    pub direction: Direction,
    /// Issue date (civil date of the document).
    pub issue_date: NaiveDate,
    /// Payment-method code, when declared.
    pub payment_method: Option<PaymentMethod>,
    /// Issuer RFC.
    pub issuer_rfc: String,
    /// Receiver RFC.
    pub receiver_rfc: String,
    /// Declared subtotal.
    pub subtotal: Decimal,
    /// Declared total.
    pub total: Decimal,
    /// Declared total of transferred taxes, when present.
    pub total_transferred: Option<Decimal>,
    /// Declared total of withheld taxes, when present.
    pub total_withheld: Option<Decimal>,
}

/// One taxable concept (line item) within a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRow {
    /// Owning document UUID.
    pub uuid: Uuid,
    /// 1-based concept index, contiguous within the document.
    pub concept: u32,
    /// Concept description.
    pub description: String,
    /// Concept amount before tax.
    pub amount: Decimal,
}

/// One tax charge or withholding attached to a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptTaxRow {
    /// Owning document UUID.
    pub uuid: Uuid,
    /// Owning concept index.
    pub concept: u32,
    /// 1-based tax index within the concept.
    pub tax: u32,
    /// Transferred or withheld.
    pub kind: TaxKind,
    /// Registry tax code (`002` = VAT).
    pub code: String,
    /// Taxable base, when declared.
    pub base: Option<Decimal>,
    /// Tax rate, when declared (absent for exempt factors).
    pub rate: Option<Decimal>,
    /// Tax amount, when declared.
    pub amount: Option<Decimal>,
}

/// One tax total attached at document level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocTaxRow {
    /// Owning document UUID.
    pub uuid: Uuid,
    /// 1-based tax index within the document totals block.
    pub tax: u32,
    /// Transferred or withheld.
    pub kind: TaxKind,
    /// Registry tax code.
    pub code: String,
    /// Tax rate, when declared.
    pub rate: Option<Decimal>,
    /// Tax amount.
    pub amount: Decimal,
}

/// One local-tax charge from the `ImpuestosLocales` complement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTaxRow {
    /// Owning document UUID.
    pub uuid: Uuid,
    /// 1-based local-tax index within the complement.
    pub local: u32,
    /// Transferred or withheld.
    pub kind: TaxKind,
    /// Local tax name as declared.
    pub name: String,
    /// Tax rate.
    pub rate: Decimal,
    /// Tax amount.
    pub amount: Decimal,
}

/// One payment inside a payment-complement document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRow {
    /// UUID of the payment-complement document.
    pub uuid: Uuid,
    /// 1-based payment index within the complement.
    pub payment: u32,
    /// Payment date.
    pub payment_date: NaiveDate,
    /// Total amount paid in this payment.
    pub amount: Decimal,
}

/// One settled document inside a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedDocRow {
    /// UUID of the payment-complement document.
    pub uuid: Uuid,
    /// Owning payment index.
    pub payment: u32,
    /// 1-based related-document index within the payment.
    pub related: u32,
    /// UUID of the document this payment settles.
    pub related_uuid: Uuid,
    /// Installment number, when declared.
    pub installment: Option<u32>,
    /// Amount paid against the related document, when declared.
    pub amount_paid: Option<Decimal>,
    /// VAT portion attributable to this pairing, when the complement
    /// version carries per-pairing tax detail.
    pub vat_paid: Option<Decimal>,
}

/// The complete relational projection of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatDocument {
    /// The document header row.
    pub document: DocumentRow,
    /// Concept rows in source order.
    pub concepts: Vec<ConceptRow>,
    /// Concept-level tax rows in source order.
    pub concept_taxes: Vec<ConceptTaxRow>,
    /// Document-level tax rows in source order.
    pub doc_taxes: Vec<DocTaxRow>,
    /// Local-tax rows in source order.
    pub local_taxes: Vec<LocalTaxRow>,
    /// Payment rows in source order.
    pub payments: Vec<PaymentRow>,
    /// Related-document rows in source order.
    pub related_docs: Vec<RelatedDocRow>,
}

impl FlatDocument {
    /// Total number of rows across all tables, header included.
    #[must_use]
    pub fn row_count(&self) -> usize {
        1 + self.concepts.len()
            + self.concept_taxes.len()
            + self.doc_taxes.len()
            + self.local_taxes.len()
            + self.payments.len()
            + self.related_docs.len()
    }
}
