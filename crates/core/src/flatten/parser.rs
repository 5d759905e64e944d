//! Event-driven parser for one hierarchical fiscal document.
//!
//! The parser walks the XML once with `quick-xml`, matching on local element
//! names so namespace prefixes (`cfdi:`, `pago10:`, `pago20:`, `tfd:`,
//! `implocal:`) never matter. Context flags disambiguate nodes that share a
//! local name at different depths (`Traslado` appears at concept level,
//! document level, and inside payment complements).
//!
//! Version support is a closed dispatch table: a `Comprobante` or `Pagos`
//! version outside it fails with `UnsupportedVersion` before any rows are
//! produced.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::cfdi::{CfdiVersion, Direction, DocumentType, PagosVersion, PaymentMethod, TaxKind};

use super::error::FlattenError;
use super::rows::{
    ConceptRow, ConceptTaxRow, DocTaxRow, DocumentRow, FlatDocument, LocalTaxRow, PaymentRow,
    RelatedDocRow,
};

/// Supported `Comprobante` versions.
static DOCUMENT_VERSIONS: Lazy<HashMap<&'static str, CfdiVersion>> = Lazy::new(|| {
    HashMap::from([("3.3", CfdiVersion::V33), ("4.0", CfdiVersion::V40)])
});

/// Supported `Pagos` complement versions.
static PAGOS_VERSIONS: Lazy<HashMap<&'static str, PagosVersion>> = Lazy::new(|| {
    HashMap::from([("1.0", PagosVersion::V10), ("2.0", PagosVersion::V20)])
});

/// Parses one raw XML document into its relational projection.
///
/// The direction is not encoded in the document itself; it comes from the
/// retrieval request that produced it.
///
/// # Errors
///
/// Returns [`FlattenError::MalformedDocument`] for structural or value-level
/// parse failures, [`FlattenError::UnsupportedVersion`] for versions outside
/// the dispatch table, and [`FlattenError::SchemaMismatch`] when a complement
/// is missing required fields (or missing entirely where the document type
/// demands one).
pub fn parse_document(xml: &str, direction: Direction) -> Result<FlatDocument, FlattenError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::new(direction);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => state.on_open(&e, false)?,
            Ok(Event::Empty(e)) => state.on_open(&e, true)?,
            Ok(Event::End(e)) => state.on_close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FlattenError::MalformedDocument(e.to_string())),
        }
    }

    state.finish()
}

/// Header fields captured from the `Comprobante` root before the UUID is known.
struct Header {
    version: CfdiVersion,
    doc_type: DocumentType,
    issue_date: NaiveDate,
    payment_method: Option<PaymentMethod>,
    subtotal: Decimal,
    total: Decimal,
}

/// Single-pass parse state.
struct ParseState {
    direction: Direction,
    header: Option<Header>,
    uuid: Option<Uuid>,
    issuer_rfc: String,
    receiver_rfc: String,
    total_transferred: Option<Decimal>,
    total_withheld: Option<Decimal>,

    // Context flags for name disambiguation.
    in_conceptos: bool,
    in_concept: bool,
    in_complemento: bool,
    in_pagos: bool,
    in_payment: bool,

    // Running ordinals (1-based, contiguous in source order).
    concept_index: u32,
    concept_tax_index: u32,
    doc_tax_index: u32,
    local_tax_index: u32,
    payment_index: u32,
    related_index: u32,
    /// Index into `related_docs` of the `DoctoRelacionado` currently open,
    /// so `TrasladoDR` children can attach their VAT portion.
    open_related: Option<usize>,

    concepts: Vec<ConceptRow>,
    concept_taxes: Vec<ConceptTaxRow>,
    doc_taxes: Vec<DocTaxRow>,
    local_taxes: Vec<LocalTaxRow>,
    payments: Vec<PaymentRow>,
    related_docs: Vec<RelatedDocRow>,
}

impl ParseState {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            header: None,
            uuid: None,
            issuer_rfc: String::new(),
            receiver_rfc: String::new(),
            total_transferred: None,
            total_withheld: None,
            in_conceptos: false,
            in_concept: false,
            in_complemento: false,
            in_pagos: false,
            in_payment: false,
            concept_index: 0,
            concept_tax_index: 0,
            doc_tax_index: 0,
            local_tax_index: 0,
            payment_index: 0,
            related_index: 0,
            open_related: None,
            concepts: Vec::new(),
            concept_taxes: Vec::new(),
            doc_taxes: Vec::new(),
            local_taxes: Vec::new(),
            payments: Vec::new(),
            related_docs: Vec::new(),
        }
    }

    fn on_open(&mut self, e: &BytesStart<'_>, self_closing: bool) -> Result<(), FlattenError> {
        match e.local_name().as_ref() {
            b"Comprobante" => self.on_comprobante(e)?,
            b"Emisor" => self.issuer_rfc = attrs(e)?.remove("Rfc").unwrap_or_default(),
            b"Receptor" => self.receiver_rfc = attrs(e)?.remove("Rfc").unwrap_or_default(),
            b"Conceptos" => self.in_conceptos = true,
            b"Concepto" if self.in_conceptos => {
                self.on_concepto(e)?;
                // A self-closing concept carries no tax children; the
                // per-concept context must not leak into the next sibling.
                self.in_concept = !self_closing;
            }
            b"Impuestos" if !self.in_conceptos && !self.in_complemento => {
                let mut a = attrs(e)?;
                if let Some(v) = a.remove("TotalImpuestosTrasladados") {
                    self.total_transferred = Some(dec(&v)?);
                }
                if let Some(v) = a.remove("TotalImpuestosRetenidos") {
                    self.total_withheld = Some(dec(&v)?);
                }
            }
            b"Traslado" => self.on_tax(e, TaxKind::Transferred)?,
            b"Retencion" => self.on_tax(e, TaxKind::Withheld)?,
            b"Complemento" => self.in_complemento = true,
            b"TimbreFiscalDigital" => {
                let mut a = attrs(e)?;
                let raw = a.remove("UUID").ok_or_else(|| {
                    FlattenError::SchemaMismatch("TimbreFiscalDigital without UUID".to_string())
                })?;
                self.uuid = Some(Uuid::parse_str(&raw).map_err(|_| {
                    FlattenError::MalformedDocument(format!("invalid fiscal UUID: {raw}"))
                })?);
            }
            b"Pagos" if self.in_complemento => {
                let mut a = attrs(e)?;
                let version = a.remove("Version").ok_or_else(|| {
                    FlattenError::SchemaMismatch("Pagos complement without Version".to_string())
                })?;
                if !PAGOS_VERSIONS.contains_key(version.as_str()) {
                    return Err(FlattenError::UnsupportedVersion(format!("Pagos {version}")));
                }
                self.in_pagos = true;
            }
            b"Pago" if self.in_pagos => {
                self.on_pago(e)?;
                self.in_payment = !self_closing;
            }
            b"DoctoRelacionado" if self.in_payment => {
                self.on_docto_relacionado(e)?;
                if self_closing {
                    self.open_related = None;
                }
            }
            b"TrasladoDR" => self.on_pairing_tax(e)?,
            b"TrasladosLocales" if self.in_complemento => {
                self.on_local_tax(e, TaxKind::Transferred)?;
            }
            b"RetencionesLocales" if self.in_complemento => {
                self.on_local_tax(e, TaxKind::Withheld)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn on_close(&mut self, name: &[u8]) {
        match name {
            b"Conceptos" => self.in_conceptos = false,
            b"Concepto" => self.in_concept = false,
            b"Complemento" => self.in_complemento = false,
            b"Pagos" => self.in_pagos = false,
            b"Pago" => self.in_payment = false,
            b"DoctoRelacionado" => self.open_related = None,
            _ => {}
        }
    }

    fn on_comprobante(&mut self, e: &BytesStart<'_>) -> Result<(), FlattenError> {
        let mut a = attrs(e)?;
        let version_raw = a
            .remove("Version")
            .ok_or_else(|| FlattenError::MalformedDocument("Comprobante without Version".into()))?;
        let version = DOCUMENT_VERSIONS
            .get(version_raw.as_str())
            .copied()
            .ok_or(FlattenError::UnsupportedVersion(version_raw))?;

        let type_raw = required(&mut a, "TipoDeComprobante")?;
        let doc_type = DocumentType::from_code(&type_raw).ok_or_else(|| {
            FlattenError::MalformedDocument(format!("unknown TipoDeComprobante: {type_raw}"))
        })?;

        self.header = Some(Header {
            version,
            doc_type,
            issue_date: date(&required(&mut a, "Fecha")?)?,
            payment_method: a.remove("MetodoPago").map(|m| PaymentMethod::from_code(&m)),
            subtotal: dec(&required(&mut a, "SubTotal")?)?,
            total: dec(&required(&mut a, "Total")?)?,
        });
        Ok(())
    }

    fn on_concepto(&mut self, e: &BytesStart<'_>) -> Result<(), FlattenError> {
        let mut a = attrs(e)?;
        self.concept_index += 1;
        self.concept_tax_index = 0;
        self.concepts.push(ConceptRow {
            uuid: Uuid::nil(), // patched in finish() once the timbre is seen
            concept: self.concept_index,
            description: a.remove("Descripcion").unwrap_or_default(),
            amount: dec(&required(&mut a, "Importe")?)?,
        });
        Ok(())
    }

    fn on_tax(&mut self, e: &BytesStart<'_>, kind: TaxKind) -> Result<(), FlattenError> {
        let mut a = attrs(e)?;
        let code = a.remove("Impuesto").unwrap_or_default();
        let base = a.remove("Base").map(|v| dec(&v)).transpose()?;
        let rate = a.remove("TasaOCuota").map(|v| dec(&v)).transpose()?;
        let amount = a.remove("Importe").map(|v| dec(&v)).transpose()?;

        if self.in_concept {
            self.concept_tax_index += 1;
            self.concept_taxes.push(ConceptTaxRow {
                uuid: Uuid::nil(),
                concept: self.concept_index,
                tax: self.concept_tax_index,
                kind,
                code,
                base,
                rate,
                amount,
            });
        } else if !self.in_conceptos && !self.in_complemento {
            self.doc_tax_index += 1;
            self.doc_taxes.push(DocTaxRow {
                uuid: Uuid::nil(),
                tax: self.doc_tax_index,
                kind,
                code,
                rate,
                amount: amount.ok_or_else(|| {
                    FlattenError::MalformedDocument(
                        "document-level tax without Importe".to_string(),
                    )
                })?,
            });
        }
        // A bare Traslado/Retencion inside an unrecognized complement is
        // ignored rather than misfiled.
        Ok(())
    }

    fn on_pago(&mut self, e: &BytesStart<'_>) -> Result<(), FlattenError> {
        let mut a = attrs(e)?;
        self.payment_index += 1;
        self.related_index = 0;
        let fecha = a.remove("FechaPago").ok_or_else(|| {
            FlattenError::SchemaMismatch("Pago without FechaPago".to_string())
        })?;
        let monto = a.remove("Monto").ok_or_else(|| {
            FlattenError::SchemaMismatch("Pago without Monto".to_string())
        })?;
        self.payments.push(PaymentRow {
            uuid: Uuid::nil(),
            payment: self.payment_index,
            payment_date: date(&fecha)?,
            amount: dec(&monto)?,
        });
        Ok(())
    }

    fn on_docto_relacionado(&mut self, e: &BytesStart<'_>) -> Result<(), FlattenError> {
        let mut a = attrs(e)?;
        self.related_index += 1;
        let raw = a.remove("IdDocumento").ok_or_else(|| {
            FlattenError::SchemaMismatch("DoctoRelacionado without IdDocumento".to_string())
        })?;
        let related_uuid = Uuid::parse_str(&raw).map_err(|_| {
            FlattenError::SchemaMismatch(format!("DoctoRelacionado with non-UUID id: {raw}"))
        })?;
        let installment = a
            .remove("NumParcialidad")
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    FlattenError::MalformedDocument(format!("invalid NumParcialidad: {v}"))
                })
            })
            .transpose()?;
        self.related_docs.push(RelatedDocRow {
            uuid: Uuid::nil(),
            payment: self.payment_index,
            related: self.related_index,
            related_uuid,
            installment,
            amount_paid: a.remove("ImpPagado").map(|v| dec(&v)).transpose()?,
            vat_paid: None,
        });
        self.open_related = Some(self.related_docs.len() - 1);
        Ok(())
    }

    fn on_pairing_tax(&mut self, e: &BytesStart<'_>) -> Result<(), FlattenError> {
        let Some(idx) = self.open_related else {
            return Err(FlattenError::SchemaMismatch(
                "TrasladoDR outside DoctoRelacionado".to_string(),
            ));
        };
        let mut a = attrs(e)?;
        if a.remove("ImpuestoDR").as_deref() == Some(crate::cfdi::VAT_TAX_CODE) {
            if let Some(importe) = a.remove("ImporteDR") {
                let amount = dec(&importe)?;
                let row = &mut self.related_docs[idx];
                row.vat_paid = Some(row.vat_paid.unwrap_or(Decimal::ZERO) + amount);
            }
        }
        Ok(())
    }

    fn on_local_tax(&mut self, e: &BytesStart<'_>, kind: TaxKind) -> Result<(), FlattenError> {
        let mut a = attrs(e)?;
        let (name_attr, rate_attr) = match kind {
            TaxKind::Transferred => ("ImpLocTrasladado", "TasadeTraslado"),
            TaxKind::Withheld => ("ImpLocRetenido", "TasadeRetencion"),
        };
        self.local_tax_index += 1;
        self.local_taxes.push(LocalTaxRow {
            uuid: Uuid::nil(),
            local: self.local_tax_index,
            kind,
            name: a.remove(name_attr).unwrap_or_default(),
            rate: dec(&required(&mut a, rate_attr)?)?,
            amount: dec(&required(&mut a, "Importe")?)?,
        });
        Ok(())
    }

    fn finish(mut self) -> Result<FlatDocument, FlattenError> {
        let header = self.header.ok_or_else(|| {
            FlattenError::MalformedDocument("no Comprobante root element".to_string())
        })?;
        let uuid = self.uuid.ok_or_else(|| {
            FlattenError::SchemaMismatch("TimbreFiscalDigital complement missing".to_string())
        })?;

        if header.doc_type == DocumentType::Pago && self.payments.is_empty() {
            return Err(FlattenError::SchemaMismatch(
                "payment document without Pagos complement".to_string(),
            ));
        }
        if header.doc_type != DocumentType::Pago && !self.payments.is_empty() {
            return Err(FlattenError::SchemaMismatch(format!(
                "Pagos complement on a {:?} document",
                header.doc_type
            )));
        }

        // Rows are built before the timbre is seen (it is the last node in
        // the document); patch the owning UUID in now.
        for r in &mut self.concepts {
            r.uuid = uuid;
        }
        for r in &mut self.concept_taxes {
            r.uuid = uuid;
        }
        for r in &mut self.doc_taxes {
            r.uuid = uuid;
        }
        for r in &mut self.local_taxes {
            r.uuid = uuid;
        }
        for r in &mut self.payments {
            r.uuid = uuid;
        }
        for r in &mut self.related_docs {
            r.uuid = uuid;
        }

        Ok(FlatDocument {
            document: DocumentRow {
                uuid,
                version: header.version,
                doc_type: header.doc_type,
                direction: self.direction,
                issue_date: header.issue_date,
                payment_method: header.payment_method,
                issuer_rfc: self.issuer_rfc,
                receiver_rfc: self.receiver_rfc,
                subtotal: header.subtotal,
                total: header.total,
                total_transferred: self.total_transferred,
                total_withheld: self.total_withheld,
            },
            concepts: self.concepts,
            concept_taxes: self.concept_taxes,
            doc_taxes: self.doc_taxes,
            local_taxes: self.local_taxes,
            payments: self.payments,
            related_docs: self.related_docs,
        })
    }
}

/// Collects an element's attributes into a map keyed by local name.
fn attrs(e: &BytesStart<'_>) -> Result<HashMap<String, String>, FlattenError> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FlattenError::MalformedDocument(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| FlattenError::MalformedDocument(err.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

/// Removes a required attribute or fails with `MalformedDocument`.
fn required(a: &mut HashMap<String, String>, name: &str) -> Result<String, FlattenError> {
    a.remove(name)
        .ok_or_else(|| FlattenError::MalformedDocument(format!("missing attribute {name}")))
}

/// Parses a fixed-point decimal. Floats never appear in this pipeline.
fn dec(s: &str) -> Result<Decimal, FlattenError> {
    s.parse::<Decimal>()
        .map_err(|_| FlattenError::MalformedDocument(format!("invalid decimal: {s}")))
}

/// Parses a civil date from either a full timestamp or a bare date.
fn date(s: &str) -> Result<NaiveDate, FlattenError> {
    if let Ok(dt) = s.parse::<NaiveDateTime>() {
        return Ok(dt.date());
    }
    s.parse::<NaiveDate>()
        .map_err(|_| FlattenError::MalformedDocument(format!("invalid date: {s}")))
}
