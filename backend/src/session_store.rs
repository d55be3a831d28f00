//! Session storage owned by the auth adapter.
//!
//! The application holds identity only by reference; persisting the session
//! between launches is the auth client's job, the way a browser client keeps
//! it in local storage. The terminal front end uses [`FileSessionStore`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::BackendError;
use crate::types::Session;

/// Where a session survives between process launches.
pub trait SessionStore: Send + Sync {
    /// Stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::SessionStore`] when storage is unreadable.
    fn load(&self) -> Result<Option<Session>, BackendError>;

    /// Replace the stored session.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::SessionStore`] when storage is unwritable.
    fn save(&self, session: &Session) -> Result<(), BackendError>;

    /// Forget the stored session. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::SessionStore`] when storage is unwritable.
    fn clear(&self) -> Result<(), BackendError>;
}

/// Process-local store, used in tests and by callers that never persist.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self { inner: Mutex::new(Some(session)) }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, BackendError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| BackendError::SessionStore("session lock poisoned".to_owned()))?;
        Ok(guard.clone())
    }

    fn save(&self, session: &Session) -> Result<(), BackendError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| BackendError::SessionStore("session lock poisoned".to_owned()))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), BackendError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| BackendError::SessionStore("session lock poisoned".to_owned()))?;
        *guard = None;
        Ok(())
    }
}

/// JSON file holding one session.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `MARKS_SESSION_FILE`, else `$XDG_CONFIG_HOME/marks/session.json`,
    /// else `$HOME/.config/marks/session.json`, else `./.marks-session.json`.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(default_session_path())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn default_session_path() -> PathBuf {
    if let Some(path) = non_empty_env("MARKS_SESSION_FILE") {
        return PathBuf::from(path);
    }
    let config_dir = non_empty_env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty_env("HOME").map(|home| PathBuf::from(home).join(".config")));
    match config_dir {
        Some(dir) => dir.join("marks").join("session.json"),
        None => PathBuf::from(".marks-session.json"),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, BackendError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::SessionStore(format!("{}: {e}", self.path.display()))),
        };
        match serde_json::from_str::<Session>(&text) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupt file is an absent session, not a hard failure.
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BackendError::SessionStore(format!("{}: {e}", parent.display())))?;
        }
        let text = serde_json::to_string_pretty(session).map_err(|e| BackendError::SessionStore(e.to_string()))?;
        write_private(&self.path, &text).map_err(|e| BackendError::SessionStore(format!("{}: {e}", self.path.display())))
    }

    fn clear(&self) -> Result<(), BackendError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackendError::SessionStore(format!("{}: {e}", self.path.display()))),
        }
    }
}

/// Write `text` to `path`, readable by the owner only on unix. A file left
/// behind with wider permissions is tightened before it is rewritten.
fn write_private(path: &Path, text: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(text.as_bytes())
}

#[cfg(test)]
#[path = "session_store_test.rs"]
mod tests;
