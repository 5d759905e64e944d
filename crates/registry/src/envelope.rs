//! SOAP envelope construction and response extraction.
//!
//! The service speaks a small SOAP dialect: every response of interest is a
//! single result element whose payload lives in attributes, plus repeated
//! `IdsPaquetes` text children on the verify response and one base64
//! `Paquete` text child on the download response. Extraction matches on
//! local names, so envelope prefixes never matter.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use tributo_core::cfdi::Direction;
use tributo_core::retrieval::client::{RegistryCallError, SubmitParams};
use tributo_core::retrieval::types::ContentKind;

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SERVICE_NS: &str = "http://DescargaMasivaTerceros.sat.gob.mx";

fn decode(err: impl std::fmt::Display) -> RegistryCallError {
    RegistryCallError::Decode(err.to_string())
}

/// Builds the body of a bulk-export submission.
pub fn submit_envelope(params: &SubmitParams) -> Result<String, RegistryCallError> {
    let kind = match params.content {
        ContentKind::Metadata => "Metadata",
        ContentKind::Full => "CFDI",
    };
    let start = format!("{}T00:00:00", params.range.start);
    let end = format!("{}T23:59:59", params.range.end);

    let mut attributes: Vec<(&str, &str)> = vec![
        ("FechaInicial", start.as_str()),
        ("FechaFinal", end.as_str()),
        ("RfcSolicitante", params.rfc.as_str()),
        ("TipoSolicitud", kind),
    ];
    match params.direction {
        Direction::Issued => attributes.push(("RfcEmisor", params.rfc.as_str())),
        Direction::Received => attributes.push(("RfcReceptor", params.rfc.as_str())),
    }

    build_envelope("SolicitaDescarga", "solicitud", &attributes)
}

/// Builds the body of a status-verification call.
pub fn verify_envelope(rfc: &str, request_id: &str) -> Result<String, RegistryCallError> {
    build_envelope(
        "VerificaSolicitudDescarga",
        "solicitud",
        &[("IdSolicitud", request_id), ("RfcSolicitante", rfc)],
    )
}

/// Builds the body of a package-download call.
pub fn download_envelope(rfc: &str, package_id: &str) -> Result<String, RegistryCallError> {
    build_envelope(
        "PeticionDescargaMasivaTercerosEntrada",
        "peticionDescarga",
        &[("IdPaquete", package_id), ("RfcSolicitante", rfc)],
    )
}

fn build_envelope(
    operation: &str,
    request_node: &str,
    attributes: &[(&str, &str)],
) -> Result<String, RegistryCallError> {
    let mut writer = Writer::new(Vec::new());

    let mut envelope = BytesStart::new("s:Envelope");
    envelope.push_attribute(("xmlns:s", ENVELOPE_NS));
    envelope.push_attribute(("xmlns:des", SERVICE_NS));
    writer.write_event(Event::Start(envelope)).map_err(decode)?;
    writer
        .write_event(Event::Start(BytesStart::new("s:Header")))
        .map_err(decode)?;
    writer
        .write_event(Event::End(BytesStart::new("s:Header").to_end()))
        .map_err(decode)?;
    writer
        .write_event(Event::Start(BytesStart::new("s:Body")))
        .map_err(decode)?;

    let op = format!("des:{operation}");
    writer
        .write_event(Event::Start(BytesStart::new(op.as_str())))
        .map_err(decode)?;
    let mut request = BytesStart::new(format!("des:{request_node}"));
    for (name, value) in attributes {
        request.push_attribute(Attribute::from((*name, *value)));
    }
    writer.write_event(Event::Empty(request)).map_err(decode)?;
    writer
        .write_event(Event::End(BytesStart::new(op.as_str()).to_end()))
        .map_err(decode)?;

    writer
        .write_event(Event::End(BytesStart::new("s:Body").to_end()))
        .map_err(decode)?;
    writer
        .write_event(Event::End(BytesStart::new("s:Envelope").to_end()))
        .map_err(decode)?;

    String::from_utf8(writer.into_inner()).map_err(decode)
}

/// Attributes of the first element named `local_name`, or `None` when the
/// response carries no such element.
pub fn element_attributes(
    xml: &str,
    local_name: &str,
) -> Result<Option<HashMap<String, String>>, RegistryCallError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                if e.local_name().as_ref() == local_name.as_bytes() {
                    let mut map = HashMap::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(decode)?;
                        map.insert(
                            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                            attr.unescape_value().map_err(decode)?.into_owned(),
                        );
                    }
                    return Ok(Some(map));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(decode(e)),
        }
    }
}

/// Text contents of every element named `local_name`, in document order.
pub fn element_texts(xml: &str, local_name: &str) -> Result<Vec<String>, RegistryCallError> {
    let mut reader = Reader::from_str(xml);
    let mut texts = Vec::new();
    let mut capture: Option<String> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == local_name.as_bytes() => {
                capture = Some(String::new());
            }
            Ok(Event::Text(t)) => {
                if let Some(buf) = capture.as_mut() {
                    buf.push_str(&text_content(&t)?);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == local_name.as_bytes() => {
                if let Some(buf) = capture.take() {
                    texts.push(buf);
                }
            }
            Ok(Event::Eof) => return Ok(texts),
            Ok(_) => {}
            Err(e) => return Err(decode(e)),
        }
    }
}

fn text_content(t: &BytesText<'_>) -> Result<String, RegistryCallError> {
    Ok(t.unescape().map_err(decode)?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tributo_core::retrieval::types::DateRange;

    fn params() -> SubmitParams {
        SubmitParams {
            rfc: "XAXX010101000".to_string(),
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
            ),
            content: ContentKind::Full,
            direction: Direction::Received,
        }
    }

    #[test]
    fn test_submit_envelope_carries_range_and_filters() {
        let xml = submit_envelope(&params()).unwrap();
        assert!(xml.contains(r#"FechaInicial="2025-01-01T00:00:00""#));
        assert!(xml.contains(r#"FechaFinal="2025-01-07T23:59:59""#));
        assert!(xml.contains(r#"RfcSolicitante="XAXX010101000""#));
        assert!(xml.contains(r#"TipoSolicitud="CFDI""#));
        assert!(xml.contains(r#"RfcReceptor="XAXX010101000""#));
        assert!(!xml.contains("RfcEmisor"));
    }

    #[test]
    fn test_issued_direction_switches_the_party_filter() {
        let mut p = params();
        p.direction = Direction::Issued;
        p.content = ContentKind::Metadata;
        let xml = submit_envelope(&p).unwrap();
        assert!(xml.contains(r#"RfcEmisor="XAXX010101000""#));
        assert!(xml.contains(r#"TipoSolicitud="Metadata""#));
    }

    #[test]
    fn test_parses_submit_result_attributes() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
            <SolicitaDescargaResponse xmlns="http://DescargaMasivaTerceros.sat.gob.mx">
              <SolicitaDescargaResult IdSolicitud="4e80345d-917f-4bf0-a257-5a2902c03a7f" CodEstatus="5000" Mensaje="Solicitud Aceptada"/>
            </SolicitaDescargaResponse></s:Body></s:Envelope>"#;
        let attrs = element_attributes(xml, "SolicitaDescargaResult")
            .unwrap()
            .unwrap();
        assert_eq!(
            attrs.get("IdSolicitud").map(String::as_str),
            Some("4e80345d-917f-4bf0-a257-5a2902c03a7f")
        );
        assert_eq!(attrs.get("CodEstatus").map(String::as_str), Some("5000"));
    }

    #[test]
    fn test_parses_verify_result_with_package_ids() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
            <VerificaSolicitudDescargaResponse xmlns="http://DescargaMasivaTerceros.sat.gob.mx">
              <VerificaSolicitudDescargaResult CodEstatus="5000" EstadoSolicitud="3" CodigoEstadoSolicitud="5000" NumeroCFDIs="120" Mensaje="Solicitud Aceptada">
                <IdsPaquetes>PKG_01</IdsPaquetes>
                <IdsPaquetes>PKG_02</IdsPaquetes>
              </VerificaSolicitudDescargaResult>
            </VerificaSolicitudDescargaResponse></s:Body></s:Envelope>"#;
        let attrs = element_attributes(xml, "VerificaSolicitudDescargaResult")
            .unwrap()
            .unwrap();
        assert_eq!(attrs.get("EstadoSolicitud").map(String::as_str), Some("3"));

        let packages = element_texts(xml, "IdsPaquetes").unwrap();
        assert_eq!(packages, vec!["PKG_01".to_string(), "PKG_02".to_string()]);
    }

    #[test]
    fn test_missing_element_is_none_not_an_error() {
        assert_eq!(element_attributes("<a/>", "Missing").unwrap(), None);
        assert!(element_texts("<a/>", "Missing").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_response_is_a_decode_error() {
        assert!(element_attributes("<a", "X").is_err());
    }
}
