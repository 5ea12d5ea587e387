use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::model::Workspace;
use crate::save_queue::{Resolution, SaveQueue};
use chrono::{DateTime, Utc};

pub fn list(queue: &SaveQueue) -> Result<CmdResult> {
    let conflicts: Vec<_> = queue
        .conflicts()
        .iter()
        .map(|(name, conflict)| (name.clone(), conflict.clone()))
        .collect();
    let mut result = CmdResult::default().with_conflicts(conflicts);
    if result.conflicts.is_empty() {
        result.add_message(CmdMessage::info("No conflicts."));
    }
    Ok(result)
}

pub fn resolve(
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    name: &str,
    resolution: Resolution,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let path = match queue.conflict(name) {
        Some(_) => name.to_string(),
        None => ws.resolve(name).unwrap_or_else(|| name.to_string()),
    };
    let version = queue.resolve_conflict(&path, resolution, now)?;
    if let Some(entry) = queue.entry(&path) {
        ws.insert_file(&path, entry.content.clone());
    }

    let how = match resolution {
        Resolution::Local => "the local version",
        Resolution::Remote => "the remote version",
        Resolution::Merge => "a merge with conflict markers",
    };
    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Resolved {} with {} (version {})",
        path, how, version
    )));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoftError;
    use crate::model::FileEntry;
    use crate::save_queue::SaveSettings;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn conflicted() -> (Workspace, SaveQueue) {
        let mut ws = Workspace::from_entries(vec![FileEntry::new("src/a.ts", "base\n")]);
        let mut queue = SaveQueue::new(SaveSettings::default());
        queue.queue_save("src/a.ts", "remote\n", t(10));
        ws.insert_file("src/a.ts", "remote\n");
        queue.queue_save("src/a.ts", "local\n", t(5));
        (ws, queue)
    }

    #[test]
    fn lists_pending_conflicts() {
        let (_, queue) = conflicted();
        let result = list(&queue).unwrap();
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].1.local, "local\n");
    }

    #[test]
    fn resolving_updates_workspace() {
        let (mut ws, mut queue) = conflicted();
        resolve(&mut ws, &mut queue, "a.ts", Resolution::Local, t(20)).unwrap();

        assert_eq!(ws.content("src/a.ts"), Some("local\n"));
        assert!(queue.conflicts().is_empty());
        assert_eq!(queue.entry("src/a.ts").unwrap().content, "local\n");
    }

    #[test]
    fn merge_keeps_both_sides() {
        let (mut ws, mut queue) = conflicted();
        resolve(&mut ws, &mut queue, "src/a.ts", Resolution::Merge, t(20)).unwrap();
        let merged = ws.content("src/a.ts").unwrap();
        assert!(merged.contains("<<<<<<< LOCAL"));
        assert!(merged.contains("local"));
        assert!(merged.contains("remote"));
    }

    #[test]
    fn unknown_conflict_is_an_error() {
        let mut ws = Workspace::new();
        let mut queue = SaveQueue::new(SaveSettings::default());
        let err = resolve(&mut ws, &mut queue, "x.ts", Resolution::Remote, t(0)).unwrap_err();
        assert!(matches!(err, LoftError::Api(_)));
    }
}
