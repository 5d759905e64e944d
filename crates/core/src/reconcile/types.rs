//! Ledger and balance types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tributo_shared::types::Period;

use crate::cfdi::{Direction, DocumentType, PaymentMethod};

/// Settlement regime a taxable record accrues under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    /// Tax accrues in the period of the document's own issue date.
    Immediate,
    /// Tax accrues in the period of each matched payment.
    Deferred,
}

impl Regime {
    /// Classifies a payment-method code into a regime.
    ///
    /// Returns `None` for absent or unrecognized codes - the record cannot
    /// be classified and reconciliation must refuse to guess.
    #[must_use]
    pub const fn from_method(method: Option<PaymentMethod>) -> Option<Self> {
        match method {
            Some(PaymentMethod::Pue) => Some(Self::Immediate),
            Some(PaymentMethod::Ppd) => Some(Self::Deferred),
            Some(PaymentMethod::Unknown) | None => None,
        }
    }
}

/// Whether a ledger record comes from a document or from a payment pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Entry 0: the document itself with its VAT totals.
    Issuance,
    /// Entries >= 1: one payment/related-document pairing.
    Settlement,
}

/// Composite key of a ledger record: document UUID plus entry ordinal.
///
/// Entry 0 is the issuance entry; settlement entries are numbered from 1 in
/// source order. Merging across runs upserts on this key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LedgerKey {
    /// Owning document UUID.
    pub uuid: Uuid,
    /// Entry ordinal within the document.
    pub entry: u32,
}

/// One unified ledger record - the sole input to reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Composite key.
    pub key: LedgerKey,
    /// Issuance or settlement.
    pub kind: EntryKind,
    /// Which side of the taxpayer the record sits on.
    pub direction: Direction,
    /// Type of the originating document.
    pub doc_type: DocumentType,
    /// Settlement regime, when classifiable.
    pub regime: Option<Regime>,
    /// Date the record accrues on: issue date for issuances, payment date
    /// for settlements.
    pub accrual_date: NaiveDate,
    /// Document total (issuance) or amount paid against the related
    /// document (settlement).
    pub amount: Decimal,
    /// Signed VAT contribution. Credit notes carry a negative sign.
    pub vat: Decimal,
    /// The settled document, for settlement entries.
    pub related_uuid: Option<Uuid>,
}

/// A non-fatal reconciliation finding, reported but never corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileWarning {
    /// A settlement pairing's VAT portion could not be derived from the
    /// complement, the payment, or the related document.
    UnderivableSettlementVat {
        /// Payment-complement document UUID.
        uuid: Uuid,
        /// Payment ordinal.
        payment: u32,
        /// Related-document ordinal.
        related: u32,
    },
    /// A payment complement references a document settled immediately; the
    /// issuance already accrued in full, so the settlement is excluded.
    SettlementAgainstImmediate {
        /// Payment-complement document UUID.
        uuid: Uuid,
        /// The immediately-settled document it references.
        related_uuid: Uuid,
    },
}

/// The reconciliation output: four summed quantities and the signed net.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Period the balance was computed for.
    pub period: Period,
    /// VAT owed on sales settled immediately.
    pub owed_immediate: Decimal,
    /// VAT owed on sales settled by matched payments.
    pub owed_deferred: Decimal,
    /// VAT creditable on purchases settled immediately.
    pub creditable_immediate: Decimal,
    /// VAT creditable on purchases settled by matched payments.
    pub creditable_deferred: Decimal,
}

impl Balance {
    /// An all-zero balance for the given period.
    #[must_use]
    pub const fn zero(period: Period) -> Self {
        Self {
            period,
            owed_immediate: Decimal::ZERO,
            owed_deferred: Decimal::ZERO,
            creditable_immediate: Decimal::ZERO,
            creditable_deferred: Decimal::ZERO,
        }
    }

    /// Total VAT owed on sales.
    #[must_use]
    pub fn owed(&self) -> Decimal {
        self.owed_immediate + self.owed_deferred
    }

    /// Total VAT creditable on purchases.
    #[must_use]
    pub fn creditable(&self) -> Decimal {
        self.creditable_immediate + self.creditable_deferred
    }

    /// Signed net result: positive means tax due, negative a refundable
    /// credit.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.owed() - self.creditable()
    }
}
