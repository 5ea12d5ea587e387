use crate::commands::{CmdMessage, CmdResult};
use crate::error::{LoftError, Result};
use crate::model::Workspace;
use crate::save_queue::{QueueOutcome, SaveQueue};
use chrono::{DateTime, Utc};

fn path_for(ws: &Workspace, queue: &SaveQueue, name: &str) -> String {
    if !queue.history(name).is_empty() {
        return name.to_string();
    }
    ws.resolve(name).unwrap_or_else(|| name.to_string())
}

pub fn list(ws: &Workspace, queue: &SaveQueue, name: &str) -> Result<CmdResult> {
    let path = path_for(ws, queue, name);
    let history = queue.history(&path);
    let mut result = CmdResult::default().with_history(history);
    if result.history.is_empty() {
        result.add_message(CmdMessage::info(format!("No saved versions of {}", path)));
    }
    Ok(result)
}

/// Diff two saved versions. `to` defaults to the newest one.
pub fn diff(
    ws: &Workspace,
    queue: &SaveQueue,
    name: &str,
    from: u64,
    to: Option<u64>,
) -> Result<CmdResult> {
    let path = path_for(ws, queue, name);
    let to = match to {
        Some(v) => v,
        None => queue
            .history(&path)
            .last()
            .map(|e| e.version)
            .ok_or_else(|| LoftError::Api(format!("No saved versions of {}", path)))?,
    };
    let diff = queue.diff(&path, from, to)?;
    let mut result = CmdResult::default();
    if diff.is_empty() {
        result.add_message(CmdMessage::info("Versions are identical."));
    }
    Ok(result.with_diff(diff))
}

/// Restore a saved version. Without `version`, go back to the save before the newest.
pub fn undo(
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    name: &str,
    version: Option<u64>,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let path = path_for(ws, queue, name);
    let history = queue.history(&path);
    let target = match version {
        Some(v) => v,
        None => {
            if history.len() < 2 {
                return Err(LoftError::Api(format!(
                    "Nothing to undo for {}: fewer than two saved versions",
                    path
                )));
            }
            history[history.len() - 2].version
        }
    };

    let mut result = CmdResult::default();
    match queue.restore(&path, target, now)? {
        QueueOutcome::Queued { version } => {
            if let Some(entry) = queue.entry(&path) {
                ws.insert_file(&path, entry.content.clone());
            }
            result.add_message(CmdMessage::success(format!(
                "Restored {} to version {} (queued as version {})",
                path, target, version
            )));
        }
        QueueOutcome::Conflict { filename } => {
            result.add_message(CmdMessage::warning(format!(
                "Conflict on {}: a newer write is already queued",
                filename
            )));
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileEntry;
    use crate::save_queue::SaveSettings;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// A workspace with `notes.txt` saved twice: v1 "one", v2 "two".
    fn saved_twice() -> (Workspace, SaveQueue) {
        let store = MemoryStore::new();
        let mut ws = Workspace::from_entries(vec![FileEntry::new("docs/notes.txt", "one\n")]);
        let mut queue = SaveQueue::new(SaveSettings::default());
        queue.queue_save("docs/notes.txt", "one\n", t(0));
        queue.process(&store, t(1));
        queue.queue_save("docs/notes.txt", "two\n", t(2));
        queue.process(&store, t(3));
        ws.insert_file("docs/notes.txt", "two\n");
        (ws, queue)
    }

    #[test]
    fn history_by_basename() {
        let (ws, queue) = saved_twice();
        let result = list(&ws, &queue, "notes.txt").unwrap();
        let versions: Vec<u64> = result.history.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn diff_defaults_to_latest() {
        let (ws, queue) = saved_twice();
        let result = diff(&ws, &queue, "docs/notes.txt", 1, None).unwrap();
        let diff = result.diff.unwrap();
        assert!(diff.contains("-one"));
        assert!(diff.contains("+two"));
    }

    #[test]
    fn undo_goes_back_one_save() {
        let (mut ws, mut queue) = saved_twice();
        let result = undo(&mut ws, &mut queue, "notes.txt", None, t(10)).unwrap();

        assert_eq!(ws.content("docs/notes.txt"), Some("one\n"));
        assert_eq!(queue.entry("docs/notes.txt").unwrap().version, 3);
        assert!(result.messages[0].content.contains("version 1"));
    }

    #[test]
    fn undo_needs_two_versions() {
        let mut ws = Workspace::from_entries(vec![FileEntry::new("a.txt", "x")]);
        let mut queue = SaveQueue::new(SaveSettings::default());
        assert!(undo(&mut ws, &mut queue, "a.txt", None, t(0)).is_err());
    }
}
