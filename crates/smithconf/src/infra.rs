//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem locations the server reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where uploaded audio and generated `visualizer_variables<N>.js` live.
    /// Default: ./uploads
    pub upload_dir: PathBuf,

    /// Optional front-end assets, served at `/static` when present.
    /// Default: ./static
    pub static_dir: PathBuf,

    /// CSV of sensible tuning defaults, uploaded once to the model at startup.
    /// Default: ./assets/visualizer_defaults.csv
    pub defaults_table: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("static"),
            defaults_table: PathBuf::from("assets/visualizer_defaults.csv"),
        }
    }
}

/// Network bind address for the HTTP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Default: 0.0.0.0
    pub host: String,

    /// Default: 8000
    pub http_port: u16,
}

impl BindConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8000,
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Unset keeps logging local.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,

    /// Log filter directive (trace, debug, info, warn, error, or EnvFilter syntax).
    /// Default: info,tunesmith=debug
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: "info,tunesmith=debug".to_string(),
        }
    }
}

/// Everything fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraConfig {
    pub paths: PathsConfig,
    pub bind: BindConfig,
    pub telemetry: TelemetryConfig,
}
