use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use oracle::Oracle;
use serde::Serialize;

/// Which upload is active and how many have been handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub upload_counter: u64,
    pub active_audio: String,
    pub active_vars: Option<String>,
    pub committed_seq: u64,
}

/// Process-wide session, one lock around every field.
///
/// The lock is never held across an await.
#[derive(Debug)]
pub struct SessionState {
    inner: Mutex<SessionSnapshot>,
}

impl SessionState {
    pub fn new(placeholder_audio: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(SessionSnapshot {
                upload_counter: 0,
                active_audio: placeholder_audio.into(),
                active_vars: None,
                committed_seq: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionSnapshot> {
        // Updates never panic midway, so poisoned data is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand out the next upload number. Numbers are never reused.
    pub fn reserve(&self) -> u64 {
        let mut inner = self.lock();
        inner.upload_counter += 1;
        inner.upload_counter
    }

    /// Make `audio`/`vars` the active pair unless a newer upload already won.
    pub fn commit(&self, seq: u64, audio: String, vars: String) -> bool {
        let mut inner = self.lock();
        if seq < inner.committed_seq {
            return false;
        }
        inner.committed_seq = seq;
        inner.active_audio = audio;
        inner.active_vars = Some(vars);
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().clone()
    }
}

/// Shared state for web handlers
#[derive(Clone)]
pub struct WebState {
    pub oracle: Arc<Oracle>,
    pub session: Arc<SessionState>,
    pub upload_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub started: Instant,
}

impl WebState {
    pub fn new(oracle: Arc<Oracle>, upload_dir: PathBuf, placeholder_audio: &str) -> Self {
        Self {
            oracle,
            session: Arc::new(SessionState::new(placeholder_audio)),
            upload_dir,
            static_dir: None,
            started: Instant::now(),
        }
    }

    pub fn with_static_dir(mut self, dir: PathBuf) -> Self {
        self.static_dir = Some(dir);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let session = SessionState::new("place.mp3");
        let snap = session.snapshot();
        assert_eq!(snap.upload_counter, 0);
        assert_eq!(snap.active_audio, "place.mp3");
        assert_eq!(snap.active_vars, None);
    }

    #[test]
    fn test_reserve_is_monotonic() {
        let session = SessionState::new("place.mp3");
        assert_eq!(session.reserve(), 1);
        assert_eq!(session.reserve(), 2);
        assert_eq!(session.snapshot().upload_counter, 2);
    }

    #[test]
    fn test_older_commit_loses() {
        let session = SessionState::new("place.mp3");
        let first = session.reserve();
        let second = session.reserve();

        assert!(session.commit(second, "tempFile2.mp3".into(), "visualizer_variables2.js".into()));
        assert!(!session.commit(first, "tempFile1.mp3".into(), "visualizer_variables1.js".into()));

        let snap = session.snapshot();
        assert_eq!(snap.active_audio, "tempFile2.mp3");
        assert_eq!(snap.active_vars.as_deref(), Some("visualizer_variables2.js"));
        assert_eq!(snap.committed_seq, 2);
    }

    #[test]
    fn test_concurrent_reserve_never_repeats() {
        let session = Arc::new(SessionState::new("place.mp3"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || (0..100).map(|_| session.reserve()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800);
        assert_eq!(session.snapshot().upload_counter, 800);
    }
}
