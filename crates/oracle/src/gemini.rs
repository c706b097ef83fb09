//! Gemini REST backend.
//!
//! Generation goes through `models/{model}:generateContent`; reference files
//! go through the resumable upload protocol on `upload/v1beta/files`.
//! Every call has a timeout and transient failures are retried with
//! exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use smithconf::ModelConfig;

use crate::backend::{FileRef, GenerateRequest, ModelBackend, Part};
use crate::error::{InferenceError, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub struct GeminiBackend {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiBackend {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(InferenceError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| InferenceError::Malformed(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/v1beta/files", self.api_base)
    }

    /// Send a request, retrying transient failures.
    ///
    /// `build` is called once per attempt. Non-success statuses that are not
    /// transient come back as `Rejected` straight away.
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let (message, delay) = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    let hinted = retry_after(resp.headers());
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<failed to read error body>".to_string());

                    if !is_transient(status) {
                        return Err(InferenceError::Rejected {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    (
                        format!("{what} returned {status}: {body}"),
                        hinted.unwrap_or_else(|| self.retry.backoff(attempt)),
                    )
                }
                Err(e) if e.is_builder() => {
                    return Err(InferenceError::Malformed(format!("{what}: {e}")));
                }
                Err(e) => {
                    let kind = if e.is_timeout() {
                        "timed out"
                    } else if e.is_connect() {
                        "connection failed"
                    } else {
                        "transport error"
                    };
                    (format!("{what} {kind}: {e}"), self.retry.backoff(attempt))
                }
            };

            if attempt >= self.retry.max_attempts {
                return Err(InferenceError::Unavailable {
                    attempts: attempt,
                    message,
                });
            }

            let delay = delay.min(self.retry.max_backoff);
            tracing::warn!(
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "{message}; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn part_json(part: &Part) -> serde_json::Value {
    match part {
        Part::Text(text) => json!({ "text": text }),
        Part::InlineData { mime_type, data } => json!({
            "inlineData": { "mimeType": mime_type, "data": BASE64.encode(data) }
        }),
        Part::File(file) => json!({
            "fileData": { "mimeType": file.mime_type, "fileUri": file.uri }
        }),
    }
}

/// Request body for `generateContent`.
pub fn request_body(request: &GenerateRequest) -> serde_json::Value {
    let parts: Vec<serde_json::Value> = request.parts.iter().map(part_json).collect();

    let mut generation_config = json!({
        "thinkingConfig": { "thinkingBudget": request.thinking_budget }
    });
    if let Some(temperature) = request.temperature {
        generation_config["temperature"] = json!(temperature);
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

/// Concatenate the visible text of the first candidate.
fn reply_text(response: GenerateResponse) -> Result<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let feedback = response
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "none".to_string());
        return Err(InferenceError::Malformed(format!(
            "no candidates in reply (prompt feedback: {feedback})"
        )));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(InferenceError::Malformed(format!(
            "empty reply (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    mime_type: Option<String>,
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    #[tracing::instrument(skip(self, request), fields(model = %self.model, parts = request.parts.len()))]
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let body = request_body(request);
        let url = self.generate_url();

        let resp = self
            .send_with_retry("generateContent", || {
                self.client
                    .post(&url)
                    .header(API_KEY_HEADER, &self.api_key)
                    .json(&body)
            })
            .await?;

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(format!("decoding generateContent reply: {e}")))?;
        reply_text(parsed)
    }

    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_reference(
        &self,
        display_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<FileRef> {
        let bytes = Bytes::from(bytes);
        let length = bytes.len().to_string();
        let start_url = self.upload_url();
        let metadata = json!({ "file": { "display_name": display_name } });

        let start = self
            .send_with_retry("file upload start", || {
                self.client
                    .post(&start_url)
                    .header(API_KEY_HEADER, &self.api_key)
                    .header("X-Goog-Upload-Protocol", "resumable")
                    .header("X-Goog-Upload-Command", "start")
                    .header("X-Goog-Upload-Header-Content-Length", &length)
                    .header("X-Goog-Upload-Header-Content-Type", mime_type)
                    .json(&metadata)
            })
            .await?;

        let session_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                InferenceError::Malformed("upload start reply had no x-goog-upload-url".to_string())
            })?;

        let finished = self
            .send_with_retry("file upload", || {
                self.client
                    .post(&session_url)
                    .header(reqwest::header::CONTENT_LENGTH, &length)
                    .header("X-Goog-Upload-Offset", "0")
                    .header("X-Goog-Upload-Command", "upload, finalize")
                    .body(bytes.clone())
            })
            .await?;

        let uploaded: UploadResponse = finished
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(format!("decoding upload reply: {e}")))?;

        tracing::info!(uri = %uploaded.file.uri, display_name, "uploaded reference file");
        Ok(FileRef {
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }
}
