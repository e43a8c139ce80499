//! Session persistence.
//!
//! # Design
//! A `Session` is what survives between client instances: the cookie file that
//! carries the ACS login cookie and the user that logged in. Where it lives is
//! the embedding application's business, expressed through `SessionStore`.
//! Two stores ship with the crate: `MemorySessionStore` for a single process,
//! and `JsonFileSessionStore` for sessions that must outlive it.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::types::User;

/// Key under which the client keeps its session.
pub const SESSION_KEY: &str = "AppceleratorCloudServices";

/// A resolved login: cookie file plus the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub cookie_jar: PathBuf,
    pub current_user: User,
}

/// Key/value storage for sessions.
///
/// Implementations synchronize internally; the client reads once at
/// construction and writes once after each successful login. A login only
/// succeeds if `put` does.
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<Session>;
    fn put(&self, key: &str, session: Session) -> Result<()>;
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Option<Session> {
        (**self).get(key)
    }

    fn put(&self, key: &str, session: Session) -> Result<()> {
        (**self).put(key, session)
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        // A poisoned map is still a valid map.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<Session> {
        self.lock().get(key).cloned()
    }

    fn put(&self, key: &str, session: Session) -> Result<()> {
        self.lock().insert(key.to_string(), session);
        Ok(())
    }
}

/// On-disk layout of `JsonFileSessionStore`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    sessions: HashMap<String, Session>,
}

/// Store keeping every session in one JSON file.
///
/// Each `put` reads the whole file and replaces it with a sibling temp file, so
/// other stores on the same path never observe a half-written document. An
/// unreadable or corrupt file reads as empty, which makes the next client log
/// in again.
#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> SessionFile {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt session file");
                SessionFile::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => SessionFile::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read session file");
                SessionFile::default()
            }
        }
    }

    fn save(&self, file: &SessionFile) -> io::Result<()> {
        let contents = serde_json::to_vec_pretty(file).map_err(io::Error::other)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&contents)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SessionStore for JsonFileSessionStore {
    fn get(&self, key: &str) -> Option<Session> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.load().sessions.remove(key)
    }

    fn put(&self, key: &str, session: Session) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = self.load();
        file.sessions.insert(key.to_string(), session);
        self.save(&file).inspect_err(|e| {
            warn!(path = %self.path.display(), error = %e, "cannot write session file");
        })?;
        Ok(())
    }
}
