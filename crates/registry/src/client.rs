//! The reqwest-backed registry client.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use tributo_core::retrieval::client::{
    PollResponse, RegistryCallError, RegistryClient, SubmitParams, SubmitResponse,
};
use tributo_core::retrieval::types::{PackageArchive, PackageHandle, RegistryStatus};
use tributo_shared::config::RegistryConfig;
use tributo_shared::types::RequestId;

use crate::envelope;
use crate::token::TokenProvider;

const SOAP_ACTION_SUBMIT: &str = "http://DescargaMasivaTerceros.sat.gob.mx/ISolicitaDescargaService/SolicitaDescarga";
const SOAP_ACTION_VERIFY: &str = "http://DescargaMasivaTerceros.sat.gob.mx/IVerificaSolicitudDescargaService/VerificaSolicitudDescarga";
const SOAP_ACTION_DOWNLOAD: &str =
    "http://DescargaMasivaTerceros.sat.gob.mx/IDescargaMasivaTercerosService/Descargar";

fn transport(err: reqwest::Error) -> RegistryCallError {
    RegistryCallError::Transport(err.to_string())
}

/// HTTP implementation of the registry boundary.
pub struct HttpRegistryClient<T> {
    http: reqwest::Client,
    config: RegistryConfig,
    tokens: T,
}

impl<T: TokenProvider> HttpRegistryClient<T> {
    /// Creates a client over the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryCallError::Transport`] when the HTTP client cannot
    /// be constructed.
    pub fn new(config: RegistryConfig, tokens: T) -> Result<Self, RegistryCallError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Posts one SOAP body and returns the raw response text.
    async fn call(
        &self,
        url: &str,
        action: &str,
        body: String,
    ) -> Result<String, RegistryCallError> {
        let token = self.tokens.token().await?;
        let response = self
            .http
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", action)
            .header("Authorization", format!(r#"WRAP access_token="{token}""#))
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(RegistryCallError::Api {
                code: Some(i64::from(status.as_u16())),
                message: format!("HTTP {status}"),
            });
        }
        debug!(url, bytes = text.len(), "registry call complete");
        Ok(text)
    }

    /// Runs the verify operation and returns the raw response text; both
    /// status polls and package listing read from it.
    async fn verify(&self, id: &RequestId) -> Result<String, RegistryCallError> {
        let body = envelope::verify_envelope(&self.config.rfc, id.as_str())?;
        self.call(&self.config.verify_url, SOAP_ACTION_VERIFY, body)
            .await
    }
}

#[async_trait]
impl<T: TokenProvider> RegistryClient for HttpRegistryClient<T> {
    async fn submit(&self, params: &SubmitParams) -> Result<SubmitResponse, RegistryCallError> {
        let body = envelope::submit_envelope(params)?;
        let text = self
            .call(&self.config.request_url, SOAP_ACTION_SUBMIT, body)
            .await?;

        let attrs = envelope::element_attributes(&text, "SolicitaDescargaResult")?
            .ok_or_else(|| RegistryCallError::Decode("no SolicitaDescargaResult".to_string()))?;
        Ok(SubmitResponse {
            request_id: attrs.get("IdSolicitud").map(|id| RequestId::new(id.as_str())),
            code: attrs.get("CodEstatus").cloned().unwrap_or_default(),
            message: attrs.get("Mensaje").cloned().unwrap_or_default(),
        })
    }

    async fn poll(&self, id: &RequestId) -> Result<PollResponse, RegistryCallError> {
        let text = self.verify(id).await?;
        let attrs = envelope::element_attributes(&text, "VerificaSolicitudDescargaResult")?
            .ok_or_else(|| {
                RegistryCallError::Decode("no VerificaSolicitudDescargaResult".to_string())
            })?;

        let raw_state = attrs
            .get("EstadoSolicitud")
            .ok_or_else(|| RegistryCallError::Decode("no EstadoSolicitud".to_string()))?;
        let code: i32 = raw_state
            .parse()
            .map_err(|_| RegistryCallError::Decode(format!("bad EstadoSolicitud: {raw_state}")))?;
        let status = RegistryStatus::from_code(code).ok_or_else(|| {
            RegistryCallError::Decode(format!("unknown EstadoSolicitud: {code}"))
        })?;

        Ok(PollResponse {
            status,
            message: attrs.get("Mensaje").cloned(),
        })
    }

    async fn list_packages(
        &self,
        id: &RequestId,
    ) -> Result<Vec<PackageHandle>, RegistryCallError> {
        let text = self.verify(id).await?;
        Ok(envelope::element_texts(&text, "IdsPaquetes")?
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(PackageHandle)
            .collect())
    }

    async fn download(
        &self,
        _id: &RequestId,
        handle: &PackageHandle,
    ) -> Result<PackageArchive, RegistryCallError> {
        let body = envelope::download_envelope(&self.config.rfc, &handle.0)?;
        let text = self
            .call(&self.config.download_url, SOAP_ACTION_DOWNLOAD, body)
            .await?;

        let encoded = envelope::element_texts(&text, "Paquete")?
            .into_iter()
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RegistryCallError::Api {
                code: None,
                message: format!("package {handle} has no payload"),
            })?;
        let data = BASE64
            .decode(encoded.trim())
            .map_err(|e| RegistryCallError::Decode(format!("package base64: {e}")))?;

        Ok(PackageArchive {
            handle: handle.clone(),
            data: Bytes::from(data),
        })
    }
}
