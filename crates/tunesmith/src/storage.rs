//! Upload directory layout.
//!
//! Audio is stored as `tempFile<N><ext>` and its tuning module as
//! `visualizer_variables<N>.js`, both flat in one directory.

use std::io;
use std::path::{Path, PathBuf};

const AUDIO_PREFIX: &str = "tempFile";
const VARS_PREFIX: &str = "visualizer_variables";

/// Legacy fixed name targeted by `/delete-temp`.
pub const LEGACY_TEMP_FILE: &str = "tempFile.mp3";

/// Extension of the client's filename including the dot, or "" if none.
///
/// Only the final path component counts, so `../x.wav` yields `.wav` and a
/// dotfile like `.bashrc` has no extension.
pub fn extension_of(original: &str) -> &str {
    let name = original
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(original);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx..],
    }
}

pub fn audio_filename(seq: u64, original: &str) -> String {
    format!("{AUDIO_PREFIX}{seq}{}", extension_of(original))
}

pub fn vars_filename(seq: u64) -> String {
    format!("{VARS_PREFIX}{seq}.js")
}

/// Outcome of the startup sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Create `dir` if needed and remove leftovers from a previous run.
///
/// Only regular files whose names start with `tempFile` or
/// `visualizer_variables` are touched. A file that cannot be removed is
/// logged and skipped.
pub fn sweep(dir: &Path) -> io::Result<SweepReport> {
    std::fs::create_dir_all(dir)?;

    let mut report = SweepReport::default();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "could not read upload directory entry");
                report.failed += 1;
                continue;
            }
        };

        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !(name.starts_with(AUDIO_PREFIX) || name.starts_with(VARS_PREFIX)) {
            continue;
        }
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                tracing::debug!(file = name, "deleted leftover");
                report.deleted += 1;
            }
            Err(e) => {
                tracing::warn!(file = name, error = %e, "could not delete leftover");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Write an uploaded file into the upload directory.
pub async fn save(dir: &Path, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Best-effort removal used when an upload is abandoned.
pub async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "discarded"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not discard"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Locked,
    NotFound,
}

impl DeleteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteOutcome::Deleted => "deleted",
            DeleteOutcome::Locked => "locked",
            DeleteOutcome::NotFound => "not_found",
        }
    }
}

/// Delete the legacy `tempFile.mp3`.
///
/// Counter-named uploads such as `tempFile3.mp3` are never matched.
pub async fn delete_temp(dir: &Path) -> io::Result<DeleteOutcome> {
    let path = dir.join(LEGACY_TEMP_FILE);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(e) => match outcome_for_error(e.kind()) {
            Some(DeleteOutcome::Locked) => {
                tracing::warn!(path = %path.display(), error = %e, "file in use, not deleted");
                Ok(DeleteOutcome::Locked)
            }
            Some(outcome) => Ok(outcome),
            None => Err(e),
        },
    }
}

/// Failures that `/delete-temp` reports as an outcome rather than an error.
pub fn outcome_for_error(kind: io::ErrorKind) -> Option<DeleteOutcome> {
    match kind {
        io::ErrorKind::NotFound => Some(DeleteOutcome::NotFound),
        io::ErrorKind::PermissionDenied => Some(DeleteOutcome::Locked),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("song.mp3"), ".mp3");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("dir.v2/track"), "");
        assert_eq!(extension_of("C:\\music\\loop.WAV"), ".WAV");
    }

    #[test]
    fn test_filenames() {
        assert_eq!(audio_filename(3, "beat.flac"), "tempFile3.flac");
        assert_eq!(audio_filename(4, "beat"), "tempFile4");
        assert_eq!(vars_filename(3), "visualizer_variables3.js");
    }

    #[test]
    fn test_sweep_only_touches_prefixed_files() {
        let dir = TempDir::new().unwrap();
        for name in [
            "tempFile1.mp3",
            "tempFile.mp3",
            "visualizer_variables1.js",
            "visualizer_variables.js.tmp",
            "place.mp3",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("tempFileDir")).unwrap();

        let report = sweep(dir.path()).unwrap();
        assert_eq!(report, SweepReport { deleted: 4, failed: 0 });

        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec!["notes.txt", "place.mp3", "tempFileDir"]);
    }

    #[test]
    fn test_sweep_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        let report = sweep(&uploads).unwrap();
        assert_eq!(report, SweepReport::default());
        assert!(uploads.is_dir());
    }

    #[tokio::test]
    async fn test_delete_temp_outcomes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tempFile1.mp3"), b"x").unwrap();
        assert_eq!(delete_temp(dir.path()).await.unwrap(), DeleteOutcome::NotFound);

        std::fs::write(dir.path().join(LEGACY_TEMP_FILE), b"x").unwrap();
        assert_eq!(delete_temp(dir.path()).await.unwrap(), DeleteOutcome::Deleted);
        assert!(dir.path().join("tempFile1.mp3").exists());
    }

    #[test]
    fn test_outcome_for_error() {
        assert_eq!(
            outcome_for_error(io::ErrorKind::NotFound),
            Some(DeleteOutcome::NotFound)
        );
        assert_eq!(
            outcome_for_error(io::ErrorKind::PermissionDenied),
            Some(DeleteOutcome::Locked)
        );
        assert_eq!(outcome_for_error(io::ErrorKind::InvalidInput), None);
        assert_eq!(outcome_for_error(io::ErrorKind::Other), None);
        assert_eq!(DeleteOutcome::Locked.as_str(), "locked");
    }

    #[tokio::test]
    async fn test_discard_missing_is_quiet() {
        let dir = TempDir::new().unwrap();
        discard(&dir.path().join("tempFile9.mp3")).await;
    }
}
