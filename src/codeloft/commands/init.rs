use crate::commands::{CmdMessage, CmdResult, LoftPaths};
use crate::error::Result;
use crate::model::{FileEntry, Workspace};
use crate::store::{KeyValueStore, FILE_PREFIX};
use std::fs;

pub const STARTER_FILE: &str = "README.md";
const STARTER_CONTENT: &str = "# New project\n";

/// Create the data directory and give an empty workspace its first file.
pub fn run<S: KeyValueStore>(paths: &LoftPaths, store: &S) -> Result<CmdResult> {
    fs::create_dir_all(&paths.data_dir)?;
    let mut result = CmdResult::default();

    if store.list(FILE_PREFIX)?.is_empty() {
        let ws = Workspace::from_entries(vec![FileEntry::new(STARTER_FILE, STARTER_CONTENT)]);
        ws.persist(store)?;
        result.add_message(CmdMessage::info(format!("Added {}", STARTER_FILE)));
    }

    result.add_message(CmdMessage::success(format!(
        "Initialized codeloft workspace at {}",
        paths.data_dir.display()
    )));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fs::FileStore;
    use tempfile::TempDir;

    #[test]
    fn seeds_empty_workspace_once() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join(".codeloft");
        let paths = LoftPaths::new(&data);
        let store = FileStore::new(&data);

        let first = run(&paths, &store).unwrap();
        assert_eq!(first.messages.len(), 2);
        assert!(data.is_dir());
        assert_eq!(
            store.get("file:README.md").unwrap().as_deref(),
            Some(STARTER_CONTENT)
        );

        store.set("file:README.md", "changed").unwrap();
        let second = run(&paths, &store).unwrap();
        assert_eq!(second.messages.len(), 1);
        assert_eq!(store.get("file:README.md").unwrap().as_deref(), Some("changed"));
    }
}
