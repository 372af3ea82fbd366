// Session persistence module
// Remembers the logged-in user between runs in a small JSON file

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Error types for persistence operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// File I/O error
    IoError(String),
    /// JSON serialization/deserialization error
    JsonError(String),
    /// Invalid data format
    InvalidData(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(msg) => write!(f, "IO Error: {}", msg),
            PersistenceError::JsonError(msg) => write!(f, "JSON Error: {}", msg),
            PersistenceError::InvalidData(msg) => write!(f, "Invalid Data: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {}

const SESSION_FORMAT_VERSION: u32 = 1;

/// Session identity stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// User id
    pub user_id: String,
    /// Conversation session id
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFileData {
    /// Version of the file format (for future migration support)
    version: u32,
    user_id: String,
    session_id: String,
}

/// Session file at a fixed path
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Session file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Where the file lives
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the session, creating parent directories as needed
    pub fn save(&self, session: &StoredSession) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::IoError(e.to_string()))?;
        }

        let data = SessionFileData {
            version: SESSION_FORMAT_VERSION,
            user_id: session.user_id.clone(),
            session_id: session.session_id.clone(),
        };
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| PersistenceError::JsonError(e.to_string()))?;

        fs::write(&self.path, json).map_err(|e| PersistenceError::IoError(e.to_string()))?;
        debug!(path = %self.path.display(), "Session saved");
        Ok(())
    }

    /// Read the session; a missing file means "not logged in"
    pub fn load(&self) -> Result<Option<StoredSession>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json =
            fs::read_to_string(&self.path).map_err(|e| PersistenceError::IoError(e.to_string()))?;
        let data: SessionFileData =
            serde_json::from_str(&json).map_err(|e| PersistenceError::JsonError(e.to_string()))?;

        if data.version != SESSION_FORMAT_VERSION {
            return Err(PersistenceError::InvalidData(format!(
                "Unsupported session file version: {}",
                data.version
            )));
        }
        if data.user_id.trim().is_empty() {
            return Err(PersistenceError::InvalidData(
                "Session file has an empty user id".to_string(),
            ));
        }

        Ok(Some(StoredSession {
            user_id: data.user_id,
            session_id: data.session_id,
        }))
    }

    /// Remove the file; already missing is fine
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::IoError(e.to_string())),
        }
    }

    /// Default location: the platform config dir, else the current directory
    pub fn default_path() -> PathBuf {
        match dirs::config_dir() {
            Some(mut path) => {
                path.push("centli");
                path.push("session.json");
                path
            }
            None => PathBuf::from("centli-session.json"),
        }
    }
}
