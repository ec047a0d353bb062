//! Per-user JSON store for the message cache and recency map.
//!
//! Each logged-in user gets their own pair of files so switching users never
//! leaks one user's cache into another's view:
//!
//! - `messages-<userId>.json` — `conversationId -> [Message, ...]`
//! - `recency-<userId>.json`  — `conversationId -> epoch millis`

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use etschat_shared::dto::RawMessage;
use etschat_shared::types::Message;

use crate::error::{Result, StoreError};

/// Handle to one user's on-disk chat state.
pub struct ChatStore {
    dir: PathBuf,
    user_id: String,
}

impl ChatStore {
    /// Open (or create) the store in the platform data directory.
    ///
    /// - Linux:   `~/.local/share/etschat/`
    /// - macOS:   `~/Library/Application Support/com.etschat.etschat/`
    /// - Windows: `{FOLDERID_RoamingAppData}\etschat\etschat\data\`
    pub fn open(user_id: &str) -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "etschat", "etschat").ok_or(StoreError::NoDataDir)?;
        Self::open_at(project_dirs.data_dir(), user_id)
    }

    /// Open (or create) the store in an explicit directory.
    ///
    /// Useful for tests and for embedding inside custom layouts.
    pub fn open_at(dir: &Path, user_id: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        tracing::debug!(path = %dir.display(), user = %user_id, "opening chat store");
        Ok(Self {
            dir: dir.to_path_buf(),
            user_id: sanitize_key(user_id),
        })
    }

    fn messages_path(&self) -> PathBuf {
        self.dir.join(format!("messages-{}.json", self.user_id))
    }

    fn recency_path(&self) -> PathBuf {
        self.dir.join(format!("recency-{}.json", self.user_id))
    }

    /// Load the cached message map.
    ///
    /// Entries come back in the loose [`RawMessage`] shape so the caller can
    /// filter malformed records before merging. A missing or unreadable file
    /// degrades to an empty map.
    pub fn load_message_cache(&self) -> HashMap<String, Vec<RawMessage>> {
        load_json_map(&self.messages_path())
    }

    /// Persist the whole message cache map.
    pub fn save_message_cache(&self, cache: &HashMap<String, Vec<Message>>) -> Result<()> {
        self.write_atomic(&self.messages_path(), &serde_json::to_vec(cache)?)
    }

    /// Load the recency map, degrading to empty on any failure.
    pub fn load_recency(&self) -> HashMap<String, i64> {
        load_json_map(&self.recency_path())
    }

    /// Persist the whole recency map.
    pub fn save_recency(&self, recency: &HashMap<String, i64>) -> Result<()> {
        self.write_atomic(&self.recency_path(), &serde_json::to_vec(recency)?)
    }

    /// Write via a temp file in the same directory plus rename, so an
    /// interrupted write never leaves a truncated file behind.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn load_json_map<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read store file");
            return T::default();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "discarding corrupt store file");
            T::default()
        }
    }
}

/// User ids become file name components; keep them filesystem-safe.
fn sanitize_key(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
