//! Session registry: deterministic ids, lazy creation, idle reclaim.

pub mod lock;

use crate::document::Document;
use crate::error::{FolioError, Result};
use crate::history::History;
use crate::signal::SignalBus;
use lock::LockState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

/// Derive a stable, content-addressed session id for a workspace path. The
/// same path always maps to the same id across process restarts, so callers
/// don't need to persist a separate path-to-id table themselves.
///
/// Hashes the canonical path, not the caller's literal spelling, so
/// `doc.md` and `/workspace/doc.md` resolve to the same session when they
/// name the same file.
pub fn session_id_for_path(path: &Path) -> String {
    let canonical = crate::path_policy::canonical_for_identity(path);
    let normalized = canonical.to_string_lossy().replace('\\', "/");
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}

/// One live session: its document, undo history, lock state and signal bus.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: String,
    pub path: PathBuf,
    pub document: AsyncMutex<Document>,
    pub history: AsyncMutex<History>,
    pub lock: StdMutex<LockState>,
    pub signals: SignalBus,
    /// Content fingerprint from the last load/save, used to detect
    /// out-of-band modification before the next save lands.
    pub baseline: StdMutex<Option<crate::persistence::Baseline>>,
    last_active: StdMutex<Instant>,
}

impl SessionHandle {
    fn new(id: String, path: PathBuf, document: Document, history_depth: usize, max_queue_len: usize, payload_cap_bytes: usize) -> Self {
        let signals = SignalBus::new(id.clone(), max_queue_len, payload_cap_bytes);
        Self {
            id,
            path,
            document: AsyncMutex::new(document),
            history: AsyncMutex::new(History::new(history_depth)),
            lock: StdMutex::new(LockState::default()),
            signals,
            baseline: StdMutex::new(None),
            last_active: StdMutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_active.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_active.lock().unwrap().elapsed()
    }

    fn is_locked(&self) -> bool {
        self.lock.lock().unwrap().is_locked()
    }
}

/// In-memory registry of live sessions, keyed by deterministic session id.
pub struct SessionRegistry {
    sessions: StdMutex<HashMap<String, Arc<SessionHandle>>>,
    history_depth: usize,
    max_queue_len: usize,
    payload_cap_bytes: usize,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(history_depth: usize, max_queue_len: usize, payload_cap_bytes: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            history_depth,
            max_queue_len,
            payload_cap_bytes,
            idle_timeout,
        }
    }

    /// Look up an already-registered session by id.
    pub fn ensure_session(&self, id: &str) -> Result<Arc<SessionHandle>> {
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(id) {
            Some(handle) => {
                handle.touch();
                Ok(handle.clone())
            }
            None => Err(FolioError::not_found(format!("no session with id {id}"))),
        }
    }

    /// Look up or lazily create a session for `path`, seeding a fresh
    /// session with `initial` when it doesn't exist yet.
    pub fn ensure_session_by_path(&self, path: &Path, initial: Document) -> Arc<SessionHandle> {
        let id = session_id_for_path(path);
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(handle) = sessions.get(&id) {
            handle.touch();
            return handle.clone();
        }
        let handle = Arc::new(SessionHandle::new(
            id.clone(),
            path.to_path_buf(),
            initial,
            self.history_depth,
            self.max_queue_len,
            self.payload_cap_bytes,
        ));
        sessions.insert(id, handle.clone());
        handle
    }

    pub fn remove(&self, id: &str) {
        self.sessions.lock().unwrap().remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep and drop sessions idle longer than the configured timeout.
    /// Locked sessions are never reclaimed, even past the timeout, since an
    /// active lock implies an in-progress edit.
    pub fn reclaim_idle(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut reclaimed = Vec::new();
        sessions.retain(|id, handle| {
            let expired = handle.idle_for() >= self.idle_timeout;
            let keep = !expired || handle.is_locked();
            if !keep {
                reclaimed.push(id.clone());
            }
            keep
        });
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(50, 200, 16 * 1024, Duration::from_millis(20))
    }

    #[test]
    fn session_id_is_deterministic_for_the_same_path() {
        let a = session_id_for_path(Path::new("/workspace/doc.md"));
        let b = session_id_for_path(Path::new("/workspace/doc.md"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_produce_different_ids() {
        let a = session_id_for_path(Path::new("/workspace/a.md"));
        let b = session_id_for_path(Path::new("/workspace/b.md"));
        assert_ne!(a, b);
    }

    #[test]
    fn equivalent_spellings_of_the_same_file_share_a_session_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.md"), "hi").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let direct = dir.path().join("doc.md");
        let via_subdir = dir.path().join("sub").join("..").join("doc.md");

        assert_eq!(session_id_for_path(&direct), session_id_for_path(&via_subdir));
    }

    #[test]
    fn ensure_session_by_path_is_lazy_and_idempotent() {
        let reg = registry();
        let path = Path::new("/workspace/doc.md");
        let h1 = reg.ensure_session_by_path(path, Document::new("v1"));
        let h2 = reg.ensure_session_by_path(path, Document::new("should be ignored"));
        assert_eq!(h1.id, h2.id);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn ensure_session_unknown_id_is_not_found() {
        let reg = registry();
        let err = reg.ensure_session("missing").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::NotFound);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn idle_sessions_are_reclaimed_but_locked_ones_survive() {
        let reg = registry();
        let idle_path = Path::new("/workspace/idle.md");
        let locked_path = Path::new("/workspace/locked.md");
        let idle_handle = reg.ensure_session_by_path(idle_path, Document::new("a"));
        let locked_handle = reg.ensure_session_by_path(locked_path, Document::new("b"));
        locked_handle.lock.lock().unwrap().acquire("alice", None).unwrap();

        tokio::time::advance(Duration::from_millis(50)).await;

        let reclaimed = reg.reclaim_idle();
        assert_eq!(reclaimed, vec![idle_handle.id.clone()]);
        assert_eq!(reg.len(), 1);
        assert!(reg.ensure_session(&locked_handle.id).is_ok());
    }
}
