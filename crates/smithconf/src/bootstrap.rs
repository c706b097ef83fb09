//! Bootstrap configuration - seeds runtime state, then runtime owns it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hosted generative model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the Gemini REST API.
    pub api_base: String,

    /// Model used for both classification and tuning generation.
    pub model: String,

    /// API key. Never written back out; usually comes from `GEMINI_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Per-request timeout.
    pub timeout_secs: u64,

    /// Total attempts for transient failures (1 disables retry).
    pub max_attempts: u32,

    /// First backoff delay; doubles on each retry.
    pub initial_backoff_ms: u64,

    /// Upper bound on any single backoff delay, including `Retry-After`.
    pub max_backoff_ms: u64,
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            timeout_secs: 120,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// Initial values for the upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Audio file considered active before the first upload.
    pub placeholder_audio: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            placeholder_audio: "place.mp3".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub model: ModelConfig,
    pub session: SessionConfig,
}
