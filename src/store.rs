//! Conversation handle persistence
//!
//! The relay keeps exactly one assistant thread per deployment. Its id lives
//! in a small JSON record so restarts reattach to the same conversation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default file name of the persisted record
pub const THREAD_FILE: &str = "thread_id.json";

/// On-disk record shape
#[derive(Debug, Default, Serialize, Deserialize)]
struct ThreadRecord {
    #[serde(rename = "threadId", default, skip_serializing_if = "Option::is_none")]
    thread_id: Option<String>,
}

/// Loads and saves the conversation handle
#[derive(Debug, Clone)]
pub struct ConversationStore {
    path: PathBuf,
}

impl ConversationStore {
    /// Create a store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store at the default file name inside `data_dir`
    #[must_use]
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(THREAD_FILE))
    }

    /// Path of the persisted record
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored handle
    ///
    /// A missing file is not an error and yields `None`, as does a record
    /// without a (non-empty) `threadId`.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(&self) -> Result<Option<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: ThreadRecord = serde_json::from_str(&content).map_err(|e| {
            Error::Store(format!("failed to parse {}: {e}", self.path.display()))
        })?;

        Ok(record.thread_id.filter(|id| !id.is_empty()))
    }

    /// Overwrite the stored handle
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written
    pub fn save(&self, thread_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let record = ThreadRecord {
            thread_id: Some(thread_id.to_string()),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;

        tracing::debug!(path = %self.path.display(), thread_id, "saved conversation handle");
        Ok(())
    }
}
