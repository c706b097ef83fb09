//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, SmithConfig};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/tunesmith/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("tunesmith/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("tunesmith.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key;
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table, filling gaps from compiled defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<SmithConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut SmithConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides using an arbitrary variable lookup.
pub fn apply_overrides_from<F>(config: &mut SmithConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut vars = EnvOverrides {
        lookup,
        applied: &mut sources.env_overrides,
    };

    // Paths
    if let Some(v) = vars.text("TUNESMITH_UPLOAD_DIR") {
        config.infra.paths.upload_dir = expand_path(&v);
    }
    if let Some(v) = vars.text("TUNESMITH_STATIC_DIR") {
        config.infra.paths.static_dir = expand_path(&v);
    }
    if let Some(v) = vars.text("TUNESMITH_DEFAULTS_TABLE") {
        config.infra.paths.defaults_table = expand_path(&v);
    }

    // Bind
    if let Some(v) = vars.text("TUNESMITH_HOST") {
        config.infra.bind.host = v;
    }
    if let Some(port) = vars.parsed("TUNESMITH_HTTP_PORT") {
        config.infra.bind.http_port = port;
    }

    // Telemetry
    if let Some(v) = vars.text("TUNESMITH_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = Some(v);
    }
    if let Some(v) = vars.text("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = Some(v);
    }
    if let Some(v) = vars.text("TUNESMITH_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
    }
    if let Some(v) = vars.text("RUST_LOG") {
        config.infra.telemetry.log_level = v;
    }

    // Model
    if let Some(v) = vars.text("TUNESMITH_API_BASE") {
        config.bootstrap.model.api_base = v;
    }
    if let Some(v) = vars.text("TUNESMITH_MODEL") {
        config.bootstrap.model.model = v;
    }
    if let Some(v) = vars.text("GEMINI_API_KEY") {
        config.bootstrap.model.api_key = Some(v);
    }
    if let Some(v) = vars.text("TUNESMITH_API_KEY") {
        config.bootstrap.model.api_key = Some(v);
    }
    if let Some(secs) = vars.parsed("TUNESMITH_MODEL_TIMEOUT_SECS") {
        config.bootstrap.model.timeout_secs = secs;
    }
    if let Some(n) = vars.parsed("TUNESMITH_MODEL_MAX_ATTEMPTS") {
        config.bootstrap.model.max_attempts = n;
    }

    // Session
    if let Some(v) = vars.text("TUNESMITH_PLACEHOLDER_AUDIO") {
        config.bootstrap.session.placeholder_audio = v;
    }
}

/// Variable lookup that records a name only once its value is applied.
struct EnvOverrides<'a, F> {
    lookup: F,
    applied: &'a mut Vec<String>,
}

impl<F> EnvOverrides<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn text(&mut self, key: &str) -> Option<String> {
        let value = (self.lookup)(key)?;
        self.applied.push(key.to_string());
        Some(value)
    }

    fn parsed<T: FromStr>(&mut self, key: &str) -> Option<T> {
        let value = (self.lookup)(key)?.parse().ok()?;
        self.applied.push(key.to_string());
        Some(value)
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        PathBuf::from(path)
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        match stripped.split_once('/') {
            Some((var_name, rest)) => match env::var(var_name) {
                Ok(value) => PathBuf::from(value).join(rest),
                Err(_) => PathBuf::from(path),
            },
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        }
    } else {
        PathBuf::from(path)
    }
}
