//! Web endpoints for Tunesmith.
//!
//! Uploads are stored flat in the upload directory and served back under
//! `/uploads/` with caching disabled. Every successful upload gets a tuning
//! module generated next to it; the newest pair becomes the active one.

pub mod state;

use std::io;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use oracle::{AudioClip, InferenceError};
use serde::Serialize;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::instrument;

use crate::storage::{self, DeleteOutcome};
pub use state::{SessionSnapshot, SessionState, WebState};

/// Multipart field carrying the audio.
pub const UPLOAD_FIELD: &str = "music";

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, max-age=0";
const INDEX_HTML: &str = include_str!("web/index.html");

/// JSON `{"error": ...}` responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ApiError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        ApiError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Inference(e) => match e {
                InferenceError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InferenceError::Rejected { .. }
                | InferenceError::Malformed(_)
                | InferenceError::Validation { .. } => StatusCode::BAD_GATEWAY,
                InferenceError::MissingApiKey | InferenceError::Io { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: WebState) -> Router {
    let uploads = Router::new()
        .nest_service("/uploads", ServeDir::new(&state.upload_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ));

    let mut app = Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/get-preset", get(get_preset))
        .route("/get-script", get(get_preset))
        .route("/active-vars", get(active_vars))
        .route("/reset-flags", get(reset_flags))
        .route("/delete-temp", post(delete_temp))
        .route("/health", get(health));

    if let Some(dir) = &state.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.with_state(state)
        .merge(uploads)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub audio: String,
    pub vars: String,
}

struct IncomingFile {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Pull the `music` file part out of the form.
///
/// Parts without a filename are plain form fields and don't count.
async fn read_music_field(multipart: &mut Multipart) -> Result<Option<IncomingFile>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        return Ok(Some(IncomingFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

fn clip_for(file: IncomingFile) -> AudioClip {
    let mime_type = match file.content_type {
        Some(ct) if ct.starts_with("audio/") => ct,
        _ => oracle::audio::mime_for_extension(
            storage::extension_of(&file.filename).trim_start_matches('.'),
        )
        .to_string(),
    };
    AudioClip::new(mime_type, file.bytes)
}

#[instrument(skip_all, fields(seq = tracing::field::Empty))]
async fn upload(
    State(state): State<WebState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let file = read_music_field(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::BadRequest("No file part".to_string()))?;
    if file.filename.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }

    let seq = state.session.reserve();
    tracing::Span::current().record("seq", seq);

    let audio = storage::audio_filename(seq, &file.filename);
    let vars = storage::vars_filename(seq);
    let audio_path = state.upload_dir.join(&audio);

    if let Err(e) = storage::save(&state.upload_dir, &audio, &file.bytes).await {
        storage::discard(&audio_path).await;
        return Err(ApiError::io(format!("saving {audio}"), e));
    }

    let clip = clip_for(file);
    if let Err(e) = state
        .oracle
        .write_configuration(&clip, &state.upload_dir, &vars)
        .await
    {
        tracing::warn!(error = %e, %audio, "tuning generation failed, discarding upload");
        storage::discard(&audio_path).await;
        storage::discard(&state.upload_dir.join(&vars)).await;
        return Err(e.into());
    }

    if state.session.commit(seq, audio.clone(), vars.clone()) {
        tracing::info!(%audio, %vars, "upload is now active");
    } else {
        tracing::info!(%audio, "a newer upload is already active");
    }

    Ok(Json(UploadResponse { audio, vars }))
}

#[derive(Debug, Serialize)]
pub struct PresetResponse {
    pub script_path: String,
    pub label: String,
    pub recognized: bool,
}

/// Classify the active audio. Backs both `/get-preset` and `/get-script`.
#[instrument(skip_all, fields(audio = tracing::field::Empty))]
async fn get_preset(State(state): State<WebState>) -> Result<Json<PresetResponse>, ApiError> {
    let active = state.session.snapshot().active_audio;
    tracing::Span::current().record("audio", active.as_str());

    let clip = match AudioClip::from_path(&state.upload_dir.join(&active)).await {
        Ok(clip) => clip,
        Err(InferenceError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("active audio {active} not found")));
        }
        Err(e) => return Err(e.into()),
    };

    let choice = state.oracle.classify_preset(&clip).await?;
    Ok(Json(PresetResponse {
        script_path: choice.script_path(),
        recognized: choice.is_recognized(),
        label: choice.label,
    }))
}

async fn active_vars(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "vars": state.session.snapshot().active_vars }))
}

/// Kept for old clients; there are no flags left to reset.
async fn reset_flags() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "geminiFlag": false }))
}

#[instrument(skip_all)]
async fn delete_temp(State(state): State<WebState>) -> Result<Response, ApiError> {
    let outcome = storage::delete_temp(&state.upload_dir)
        .await
        .map_err(|e| ApiError::io(format!("deleting {}", storage::LEGACY_TEMP_FILE), e))?;

    let status = match outcome {
        DeleteOutcome::Locked => StatusCode::LOCKED,
        DeleteOutcome::Deleted | DeleteOutcome::NotFound => StatusCode::OK,
    };
    Ok((status, Json(serde_json::json!({ "status": outcome.as_str() }))).into_response())
}

async fn health(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": state.started.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "session": state.session.snapshot(),
    }))
}
