//! Core data types: the in-memory content store ([`Workspace`]) and its files.
//!
//! Filenames double as paths (`src/components/App.tsx`). There is no folder entity
//! beyond a set of registered folder paths, kept so a UI can show empty folders and
//! remember expansion state. Inserting `a/b/c.ts` registers `a` and `a/b`.

use crate::error::{LoftError, Result};
use crate::store::{file_key, KeyValueStore, FILE_PREFIX, WORKSPACE_KEY};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const WORKSPACE_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub filename: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Everything about the workspace except file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkspaceMeta {
    #[serde(default)]
    version: String,
    #[serde(default)]
    folders: BTreeSet<String>,
    #[serde(default)]
    open_tabs: Vec<String>,
    #[serde(default)]
    selected: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workspace {
    files: BTreeMap<String, String>,
    folders: BTreeSet<String>,
    open_tabs: Vec<String>,
    selected: Option<String>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = FileEntry>,
    {
        let mut ws = Self::new();
        for entry in entries {
            ws.insert_file(&entry.filename, entry.content);
        }
        ws
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    pub fn content(&self, filename: &str) -> Option<&str> {
        self.files.get(filename).map(String::as_str)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn entries(&self) -> Vec<FileEntry> {
        self.files
            .iter()
            .map(|(name, content)| FileEntry::new(name.clone(), content.clone()))
            .collect()
    }

    pub fn folders(&self) -> &BTreeSet<String> {
        &self.folders
    }

    pub fn open_tabs(&self) -> &[String] {
        &self.open_tabs
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Find a file by exact name, then by a unique basename match.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if self.files.contains_key(name) {
            return Some(name.to_string());
        }
        let base = basename(name);
        let mut matches = self.files.keys().filter(|f| basename(f) == base);
        match (matches.next(), matches.next()) {
            (Some(only), None) => Some(only.clone()),
            _ => None,
        }
    }

    /// Create or overwrite a file. Returns true if the file already existed.
    pub fn insert_file(&mut self, filename: &str, content: impl Into<String>) -> bool {
        if let Some((parent, _)) = filename.rsplit_once('/') {
            self.register_folder(parent);
        }
        self.files
            .insert(filename.to_string(), content.into())
            .is_some()
    }

    /// Remove a file. The last remaining file can never be removed.
    pub fn remove_file(&mut self, filename: &str) -> Result<String> {
        if !self.files.contains_key(filename) {
            return Err(LoftError::FileNotFound(filename.to_string()));
        }
        if self.files.len() <= 1 {
            return Err(LoftError::Api(format!(
                "Cannot delete {}: it is the last file in the workspace",
                filename
            )));
        }

        let content = self.files.remove(filename).unwrap_or_default();
        self.open_tabs.retain(|t| t != filename);
        if self.selected.as_deref() == Some(filename) {
            self.selected = self
                .open_tabs
                .last()
                .cloned()
                .or_else(|| self.files.keys().next().cloned());
        }
        Ok(content)
    }

    /// Rename a file. Never overwrites an existing target.
    pub fn rename_file(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if self.files.contains_key(new_name) {
            return Err(LoftError::Api(format!("{} already exists", new_name)));
        }
        let content = self
            .files
            .remove(old_name)
            .ok_or_else(|| LoftError::FileNotFound(old_name.to_string()))?;
        self.insert_file(new_name, content);

        for tab in self.open_tabs.iter_mut() {
            if tab == old_name {
                *tab = new_name.to_string();
            }
        }
        if self.selected.as_deref() == Some(old_name) {
            self.selected = Some(new_name.to_string());
        }
        Ok(())
    }

    /// Register a folder and every parent folder of it.
    pub fn register_folder(&mut self, path: &str) {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return;
        }
        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            self.folders.insert(prefix.clone());
        }
    }

    pub fn open_tab(&mut self, filename: &str) {
        if !self.open_tabs.iter().any(|t| t == filename) {
            self.open_tabs.push(filename.to_string());
        }
    }

    pub fn select(&mut self, filename: &str) {
        self.selected = Some(filename.to_string());
    }

    /// Load files from `file:*` keys and layout from the `workspace` key.
    pub fn load<S: KeyValueStore>(store: &S) -> Result<Self> {
        let mut ws = Self::new();
        for key in store.list(FILE_PREFIX)? {
            let Some(name) = key.strip_prefix(FILE_PREFIX) else {
                continue;
            };
            if let Some(content) = store.get(&key)? {
                ws.insert_file(name, content);
            }
        }

        if let Some(raw) = store.get(WORKSPACE_KEY)? {
            match serde_json::from_str::<WorkspaceMeta>(&raw) {
                Ok(meta) => {
                    if !meta.version.is_empty() && meta.version != WORKSPACE_FORMAT_VERSION {
                        log::warn!(
                            "workspace layout version {} differs from {}, loading anyway",
                            meta.version,
                            WORKSPACE_FORMAT_VERSION
                        );
                    }
                    for folder in &meta.folders {
                        ws.register_folder(folder);
                    }
                    ws.open_tabs = meta
                        .open_tabs
                        .into_iter()
                        .filter(|t| ws.files.contains_key(t))
                        .collect();
                    ws.selected = meta.selected.filter(|s| ws.files.contains_key(s));
                }
                Err(e) => log::warn!("ignoring unreadable workspace layout: {}", e),
            }
        }
        Ok(ws)
    }

    /// Persist layout and every file. Stale `file:*` keys are removed.
    pub fn persist<S: KeyValueStore>(&self, store: &S) -> Result<()> {
        for key in store.list(FILE_PREFIX)? {
            let name = &key[FILE_PREFIX.len()..];
            if !self.files.contains_key(name) {
                store.delete(&key)?;
            }
        }
        for (name, content) in &self.files {
            let key = file_key(name);
            if store.get(&key)?.as_deref() != Some(content.as_str()) {
                store.set(&key, content)?;
            }
        }
        self.persist_layout(store)
    }

    pub fn persist_layout<S: KeyValueStore>(&self, store: &S) -> Result<()> {
        let meta = WorkspaceMeta {
            version: WORKSPACE_FORMAT_VERSION.to_string(),
            folders: self.folders.clone(),
            open_tabs: self.open_tabs.clone(),
            selected: self.selected.clone(),
        };
        store.set(WORKSPACE_KEY, &serde_json::to_string(&meta)?)
    }
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn two_files() -> Workspace {
        Workspace::from_entries(vec![
            FileEntry::new("src/App.tsx", "app"),
            FileEntry::new("README.md", "readme"),
        ])
    }

    #[test]
    fn nested_insert_registers_folder_chain() {
        let mut ws = Workspace::new();
        ws.insert_file("src/components/ui/Button.tsx", "");
        let folders: Vec<_> = ws.folders().iter().cloned().collect();
        assert_eq!(folders, vec!["src", "src/components", "src/components/ui"]);
    }

    #[test]
    fn last_file_cannot_be_removed() {
        let mut ws = Workspace::from_entries(vec![FileEntry::new("only.js", "x")]);
        assert!(ws.remove_file("only.js").is_err());
        assert_eq!(ws.len(), 1);
    }

    #[test]
    fn removing_selected_file_reselects() {
        let mut ws = two_files();
        ws.open_tab("README.md");
        ws.open_tab("src/App.tsx");
        ws.select("src/App.tsx");

        ws.remove_file("src/App.tsx").unwrap();
        assert_eq!(ws.open_tabs(), &["README.md".to_string()]);
        assert_eq!(ws.selected(), Some("README.md"));
    }

    #[test]
    fn rename_refuses_existing_target() {
        let mut ws = two_files();
        let err = ws.rename_file("README.md", "src/App.tsx");
        assert!(err.is_err());
        assert_eq!(ws.content("README.md"), Some("readme"));
        assert_eq!(ws.content("src/App.tsx"), Some("app"));
    }

    #[test]
    fn rename_follows_tabs_and_selection() {
        let mut ws = two_files();
        ws.open_tab("README.md");
        ws.select("README.md");
        ws.rename_file("README.md", "docs/README.md").unwrap();

        assert_eq!(ws.open_tabs(), &["docs/README.md".to_string()]);
        assert_eq!(ws.selected(), Some("docs/README.md"));
        assert!(ws.folders().contains("docs"));
    }

    #[test]
    fn resolve_by_unique_basename() {
        let mut ws = two_files();
        assert_eq!(ws.resolve("App.tsx").as_deref(), Some("src/App.tsx"));

        ws.insert_file("legacy/App.tsx", "");
        assert_eq!(ws.resolve("App.tsx"), None);
        assert_eq!(ws.resolve("legacy/App.tsx").as_deref(), Some("legacy/App.tsx"));
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let store = MemoryStore::new();
        let mut ws = two_files();
        ws.register_folder("empty/dir");
        ws.open_tab("README.md");
        ws.select("README.md");
        ws.persist(&store).unwrap();

        let loaded = Workspace::load(&store).unwrap();
        assert_eq!(loaded, ws);
    }

    #[test]
    fn persist_removes_stale_file_keys() {
        let store = MemoryStore::new();
        let mut ws = two_files();
        ws.persist(&store).unwrap();

        ws.remove_file("README.md").unwrap();
        ws.persist(&store).unwrap();
        assert_eq!(store.list(FILE_PREFIX).unwrap(), vec!["file:src/App.tsx"]);
    }
}
