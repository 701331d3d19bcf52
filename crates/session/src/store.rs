//! Directory-per-session metadata store.
//!
//! Sessions are cached by normalized absolute working directory, so a
//! process holds at most one session per directory. Metadata is small and
//! written with plain `std::fs`; a corrupt record makes `load` return `None`
//! instead of failing.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use quill_core::error::SessionError;
use quill_core::session::Session;
use tracing::{debug, warn};

use crate::history::HistoryLog;

const METADATA_FILE: &str = "session.json";
const HISTORY_FILE: &str = "history.jsonl";

pub struct SessionStore {
    root: PathBuf,
    by_work_dir: Mutex<HashMap<PathBuf, Session>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            by_work_dir: Mutex::new(HashMap::new()),
        }
    }

    /// Default root: `~/.quill/sessions`
    pub fn default_root() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".quill").join("sessions")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// The history log belonging to session `id`.
    pub fn history_log(&self, id: &str) -> HistoryLog {
        HistoryLog::new(self.session_dir(id).join(HISTORY_FILE))
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<PathBuf, Session>> {
        self.by_work_dir.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create and persist a new session for `work_dir`.
    pub fn create(&self, work_dir: &Path) -> Result<Session, SessionError> {
        let work_dir = normalize(work_dir);
        let session = Session::new(work_dir.clone());
        self.save(&session)?;
        debug!(id = %session.id, work_dir = %work_dir.display(), "Session created");
        Ok(session)
    }

    /// Load a session's metadata. Missing or unreadable records yield `None`.
    pub fn load(&self, id: &str) -> Option<Session> {
        if !is_session_id(id) {
            return None;
        }
        let path = self.session_dir(id).join(METADATA_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted session record");
                None
            }
        }
    }

    /// Return the session for `work_dir`, checking the in-process cache,
    /// then persisted sessions, and creating one only if neither has it.
    pub fn get_or_create(&self, work_dir: &Path) -> Result<Session, SessionError> {
        let key = normalize(work_dir);
        if let Some(session) = self.cache().get(&key) {
            return Ok(session.clone());
        }

        let existing = self
            .list()
            .into_iter()
            .find(|s| normalize(&s.work_dir) == key);
        let session = match existing {
            Some(session) => {
                debug!(id = %session.id, "Resuming persisted session");
                session
            }
            None => self.create(&key)?,
        };

        // A racing caller may have won; keep the first entry.
        Ok(self.cache().entry(key).or_insert(session).clone())
    }

    /// Persist `session` and refresh the cache entry for its directory.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let dir = self.session_dir(&session.id);
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let json = serde_json::to_string_pretty(session).map_err(|e| SessionError::Encoding(e.to_string()))?;
        let path = dir.join(METADATA_FILE);
        std::fs::write(&path, json).map_err(|e| io_error(&path, e))?;

        self.cache().insert(normalize(&session.work_dir), session.clone());
        Ok(())
    }

    /// Remove a session directory and everything in it.
    pub fn delete(&self, id: &str) -> Result<(), SessionError> {
        let dir = self.session_dir(id);
        if !is_session_id(id) || !dir.is_dir() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        std::fs::remove_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        self.cache().retain(|_, s| s.id != id);
        debug!(id, "Session deleted");
        Ok(())
    }

    /// All readable sessions, most recently active first.
    pub fn list(&self) -> Vec<Session> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut sessions: Vec<Session> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| self.load(&entry.file_name().to_string_lossy()))
            .collect();
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        sessions
    }
}

fn io_error(path: &Path, e: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// An id must name exactly one directory directly under the root.
fn is_session_id(id: &str) -> bool {
    let mut components = Path::new(id).components();
    !id.contains(['/', '\\'])
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}

/// Absolute, canonical when the directory exists, otherwise lexically cleaned.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    if let Ok(canonical) = absolute.canonicalize() {
        return canonical;
    }

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
