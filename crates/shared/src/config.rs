//! Application configuration management.

use chrono::NaiveDate;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Remote registry configuration.
    pub registry: RegistryConfig,
    /// Pipeline run configuration.
    pub pipeline: PipelineConfig,
    /// Retry and backoff configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Output artifact configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Remote registry (SAT bulk-download service) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// RFC of the taxpayer whose documents are retrieved.
    pub rfc: String,
    /// Base URL of the request-submission endpoint.
    #[serde(default = "default_request_url")]
    pub request_url: String,
    /// Base URL of the status-verification endpoint.
    #[serde(default = "default_verify_url")]
    pub verify_url: String,
    /// Base URL of the package-download endpoint.
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_request_url() -> String {
    "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/SolicitaDescargaService.svc".to_string()
}

fn default_verify_url() -> String {
    "https://cfdidescargamasivasolicitud.clouda.sat.gob.mx/VerificaSolicitudDescargaService.svc"
        .to_string()
}

fn default_download_url() -> String {
    "https://cfdidescargamasiva.clouda.sat.gob.mx/DescargaMasivaService.svc".to_string()
}

fn default_http_timeout() -> u64 {
    60
}

/// Pipeline run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Inclusive start date of the retrieval range.
    pub start_date: NaiveDate,
    /// Inclusive end date of the retrieval range.
    pub end_date: NaiveDate,
    /// Which side of the documents to retrieve: "issued" or "received".
    #[serde(default = "default_direction")]
    pub direction: String,
    /// Requested content kind: "metadata" or "full".
    #[serde(default = "default_content_kind")]
    pub content_kind: String,
    /// Width of each retrieval sub-range in days.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Number of flattening workers (0 = available parallelism).
    #[serde(default)]
    pub workers: usize,
    /// Target reconciliation period as "YYYY-MM".
    pub period: String,
}

fn default_direction() -> String {
    "received".to_string()
}

fn default_content_kind() -> String {
    "full".to_string()
}

fn default_window_days() -> u32 {
    7
}

/// Retry and backoff configuration for registry polling and downloads.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of status polls per request before giving up.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Base backoff between polls in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Upper bound on the backoff interval in seconds.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
    /// Maximum download attempts per package.
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,
}

fn default_max_polls() -> u32 {
    30
}

fn default_backoff_base() -> u64 {
    60
}

fn default_backoff_cap() -> u64 {
    600
}

fn default_download_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_polls: default_max_polls(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
            download_attempts: default_download_attempts(),
        }
    }
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory the CSV tables and balance are exported to.
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

fn default_export_dir() -> String {
    "tables".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TRIBUTO").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
