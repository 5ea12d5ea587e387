//! # Storage Layer
//!
//! Everything codeloft persists goes through the [`KeyValueStore`] trait: workspace
//! files, the autosave session, chat sessions. The trait is deliberately tiny
//! (`get`/`set`/`delete`/`list`) so a backend can be a directory, a browser's
//! local storage, or a remote service without touching call sites.
//!
//! ## Implementations
//!
//! - [`fs::FileStore`]: one file per key inside a data directory
//!   - keys are percent-encoded into file names
//!   - writes are atomic (temp file + rename)
//!
//! - [`memory::MemoryStore`]: in-memory map for tests
//!   - can simulate write failures to exercise retry paths
//!
//! ## Key Layout
//!
//! ```text
//! workspace               # folders, open tabs, selection (JSON)
//! file:<filename>         # raw content of one workspace file
//! autoSave_session        # pending saves, conflicts and history (JSON)
//! chat-ai-sessions        # every chat session (JSON array)
//! current-chat-session    # id of the active session
//! chat-ai-history         # legacy flat message list, migrated on load
//! error-log               # recent error records (JSON array)
//! ```
//!
//! Methods take `&self`: backends own their interior mutability, the same way a
//! filesystem does.

use crate::error::Result;

pub mod fs;
pub mod memory;

pub const WORKSPACE_KEY: &str = "workspace";
pub const FILE_PREFIX: &str = "file:";
pub const SESSION_KEY: &str = "autoSave_session";
pub const CHAT_SESSIONS_KEY: &str = "chat-ai-sessions";
pub const CURRENT_CHAT_KEY: &str = "current-chat-session";
pub const LEGACY_CHAT_KEY: &str = "chat-ai-history";
pub const ERROR_LOG_KEY: &str = "error-log";

/// Key under which a workspace file's content is stored.
pub fn file_key(filename: &str) -> String {
    format!("{}{}", FILE_PREFIX, filename)
}

/// Abstract interface for string key-value persistence.
pub trait KeyValueStore {
    /// Read a value. `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Create or overwrite a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Returns whether something was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        (**self).list(prefix)
    }
}
