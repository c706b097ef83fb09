//! Oracle - asks a hosted generative model about a piece of audio.
//!
//! Two questions are supported:
//! - which visualizer [`Preset`] fits the audio best
//! - which [`TuningValues`] the visualizer should run with
//!
//! The model sits behind [`ModelBackend`]; [`GeminiBackend`] talks to the
//! Gemini REST API.

pub mod audio;
pub mod backend;
pub mod error;
pub mod gemini;
pub mod preset;
pub mod prompts;
pub mod tuning;

pub use audio::AudioClip;
pub use backend::{FileRef, GenerateRequest, ModelBackend, Part};
pub use error::{InferenceError, Result};
pub use gemini::{GeminiBackend, RetryPolicy};
pub use preset::{Preset, PresetChoice};
pub use tuning::{parse_tuning_reply, FieldKind, TuningValue, TuningValues, TUNING_FIELDS};

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Display name of the defaults table in the model's file store.
pub const DEFAULTS_TABLE_NAME: &str = "visualizer_defaults.csv";

/// Inference client shared by every request handler.
pub struct Oracle {
    backend: Arc<dyn ModelBackend>,
    /// Uploaded once, attached to every tuning request.
    defaults_table: Option<FileRef>,
}

impl Oracle {
    pub fn new(backend: Arc<dyn ModelBackend>, defaults_table: Option<FileRef>) -> Self {
        Self {
            backend,
            defaults_table,
        }
    }

    /// Upload the defaults table and build a client around it.
    pub async fn connect(backend: Arc<dyn ModelBackend>, defaults_table: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(defaults_table).await.map_err(|e| {
            InferenceError::io(
                format!("reading defaults table {}", defaults_table.display()),
                e,
            )
        })?;
        let file = backend
            .upload_reference(DEFAULTS_TABLE_NAME, "text/csv", bytes)
            .await?;
        Ok(Self::new(backend, Some(file)))
    }

    pub fn defaults_table(&self) -> Option<&FileRef> {
        self.defaults_table.as_ref()
    }

    /// Ask which preset fits the audio. The trimmed reply is kept verbatim.
    #[tracing::instrument(skip_all, fields(mime = %audio.mime_type, size = audio.bytes.len()))]
    pub async fn classify_preset(&self, audio: &AudioClip) -> Result<PresetChoice> {
        let request = GenerateRequest::new(prompts::preset_instruction())
            .with_part(inline(audio))
            .with_temperature(0.0);

        let reply = self.backend.generate(&request).await?;
        let choice = PresetChoice::from_reply(&reply);

        if choice.is_recognized() {
            tracing::info!(label = %choice.label, "model picked preset");
        } else {
            tracing::warn!(label = %choice.label, "model answered with an unknown preset");
        }
        Ok(choice)
    }

    /// Ask for the 18 tuning values and parse them strictly.
    #[tracing::instrument(skip_all, fields(mime = %audio.mime_type, size = audio.bytes.len()))]
    pub async fn generate_tuning_values(&self, audio: &AudioClip) -> Result<TuningValues> {
        let mut request =
            GenerateRequest::new(prompts::tuning_instruction()).with_part(inline(audio));
        if let Some(table) = &self.defaults_table {
            request = request.with_part(Part::File(table.clone()));
        }

        let reply = self.backend.generate(&request).await?;
        let values = parse_tuning_reply(&reply)?;

        let missing = values.missing();
        if !missing.is_empty() {
            tracing::warn!(?missing, "model omitted tuning fields");
        }
        Ok(values)
    }

    /// Generate tuning values and write them as `dir/filename`.
    ///
    /// The module is written to a temporary file in `dir` and renamed into
    /// place, so readers never see a partial file.
    pub async fn write_configuration(
        &self,
        audio: &AudioClip,
        dir: &Path,
        filename: &str,
    ) -> Result<PathBuf> {
        let values = self.generate_tuning_values(audio).await?;
        let target = dir.join(filename);
        write_atomic(dir, &target, values.render_module().as_bytes())?;
        tracing::info!(path = %target.display(), "wrote visualizer variables");
        Ok(target)
    }
}

fn inline(audio: &AudioClip) -> Part {
    Part::InlineData {
        mime_type: audio.mime_type.clone(),
        data: audio.bytes.clone(),
    }
}

fn write_atomic(dir: &Path, target: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| InferenceError::io(format!("creating temp file in {}", dir.display()), e))?;
    tmp.write_all(contents)
        .map_err(|e| InferenceError::io("writing visualizer variables", e))?;
    tmp.persist(target)
        .map_err(|e| InferenceError::io(format!("renaming into {}", target.display()), e.error))?;
    Ok(())
}
