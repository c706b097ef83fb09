//! Minimal configuration loading for Tunesmith.
//!
//! Configuration is split into two categories:
//!
//! - **Infrastructure** (`InfraConfig`): paths, bind address, telemetry.
//!   Fixed for the lifetime of the process.
//!
//! - **Bootstrap** (`BootstrapConfig`): model settings and the initial
//!   session values. These seed runtime state.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/tunesmith/config.toml` (system)
//! 2. `~/.config/tunesmith/config.toml` (user)
//! 3. `./tunesmith.toml` or the `--config` path (local override)
//! 4. Environment variables (`TUNESMITH_*`, `GEMINI_API_KEY`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! upload_dir = "~/.local/share/tunesmith/uploads"
//! defaults_table = "assets/visualizer_defaults.csv"
//!
//! [bind]
//! http_port = 8000
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//!
//! [bootstrap.model]
//! model = "gemini-2.5-flash"
//! timeout_secs = 90
//! max_attempts = 4
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{BootstrapConfig, ModelConfig, SessionConfig};
pub use infra::{BindConfig, InfraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Complete Tunesmith configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SmithConfig {
    #[serde(flatten)]
    pub infra: InfraConfig,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl SmithConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` replacing `./tunesmith.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and env vars contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);
        config.expand_paths();

        Ok((config, sources))
    }

    /// Expand `~` and `$VAR` prefixes in every configured path.
    pub fn expand_paths(&mut self) {
        let paths = &mut self.infra.paths;
        paths.upload_dir = loader::expand_path(&paths.upload_dir.to_string_lossy());
        paths.static_dir = loader::expand_path(&paths.static_dir.to_string_lossy());
        paths.defaults_table = loader::expand_path(&paths.defaults_table.to_string_lossy());
    }

    /// Serialize the effective config to TOML. The API key is never included.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(format!("# Tunesmith Configuration\n\n{body}"))
    }
}
