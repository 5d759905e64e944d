//! Closed domain vocabularies for CFDI documents.
//!
//! Every enum here is a closed set: the flattening engine refuses values
//! outside it rather than guessing, and the reconciliation engine can match
//! exhaustively.

use serde::{Deserialize, Serialize};

/// Fiscal document type (`TipoDeComprobante`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Income document (`I`) - a sale or service invoice.
    Ingreso,
    /// Expense document (`E`) - a credit note against a prior income document.
    Egreso,
    /// Transfer document (`T`) - goods movement, usually carries no tax data.
    Traslado,
    /// Payroll document (`N`) - wages, outside the VAT base.
    Nomina,
    /// Payment complement document (`P`) - settles deferred documents.
    Pago,
}

impl DocumentType {
    /// Decodes the single-letter code used in the source documents.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Self::Ingreso),
            "E" => Some(Self::Egreso),
            "T" => Some(Self::Traslado),
            "N" => Some(Self::Nomina),
            "P" => Some(Self::Pago),
            _ => None,
        }
    }

    /// Returns true if documents of this type can carry a VAT obligation.
    #[must_use]
    pub const fn is_taxable(&self) -> bool {
        matches!(self, Self::Ingreso | Self::Egreso)
    }
}

/// Payment-method code controlling the settlement regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// Single immediate payment - tax accrues at issuance.
    Pue,
    /// Deferred or installment payment - tax accrues at each matched payment.
    Ppd,
    /// A code outside the known set. Kept verbatim for reporting; documents
    /// carrying it cannot be classified into a regime.
    #[serde(rename = "unknown")]
    Unknown,
}

impl PaymentMethod {
    /// Decodes the payment-method attribute.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "PUE" => Self::Pue,
            "PPD" => Self::Ppd,
            _ => Self::Unknown,
        }
    }
}

/// Which side of the taxpayer a document sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Issued by the taxpayer (sales).
    Issued,
    /// Received by the taxpayer (purchases).
    Received,
}

impl Direction {
    /// Parses the configuration form of the direction filter.
    #[must_use]
    pub fn from_config(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "issued" | "emitidos" => Some(Self::Issued),
            "received" | "recibidos" => Some(Self::Received),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Issued => write!(f, "issued"),
            Self::Received => write!(f, "received"),
        }
    }
}

/// Kind of a tax charge attached to a concept or a document total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxKind {
    /// Tax transferred to the counterparty (`Traslado`).
    Transferred,
    /// Tax withheld from the counterparty (`Retencion`).
    Withheld,
}

/// The tax code the registry assigns to value-added tax.
pub const VAT_TAX_CODE: &str = "002";

/// Supported document format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CfdiVersion {
    /// CFDI 3.3.
    #[serde(rename = "3.3")]
    V33,
    /// CFDI 4.0.
    #[serde(rename = "4.0")]
    V40,
}

impl std::fmt::Display for CfdiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V33 => write!(f, "3.3"),
            Self::V40 => write!(f, "4.0"),
        }
    }
}

/// Supported payment-complement versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PagosVersion {
    /// Pagos 1.0 (no per-pairing tax detail).
    #[serde(rename = "1.0")]
    V10,
    /// Pagos 2.0 (per-pairing tax detail).
    #[serde(rename = "2.0")]
    V20,
}
