//! Turning an AI response into workspace changes.
//!
//! `parse` only reports what would happen. `run` executes the commands against
//! the workspace and feeds every touched file through the save queue; deletions
//! and renames drop pending writes and conflicts and remove stored content right
//! away. A write that loses to a newer pending one leaves the workspace on the
//! pending content.

use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::executor::{execute, Outcome};
use crate::model::Workspace;
use crate::parser::parse_ai_command;
use crate::save_queue::{QueueOutcome, SaveQueue};
use crate::store::{file_key, KeyValueStore};
use chrono::{DateTime, Utc};

pub fn parse(ws: &Workspace, text: &str) -> Result<CmdResult> {
    let existing: Vec<String> = ws.filenames().map(str::to_string).collect();
    let commands = parse_ai_command(text, &existing);
    let mut result = CmdResult::default().with_commands(commands);
    if result.commands.is_empty() {
        result.add_message(CmdMessage::info("No file commands found."));
    }
    Ok(result)
}

pub fn run<S: KeyValueStore>(
    store: &S,
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    text: &str,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let mut result = parse(ws, text)?;
    if result.commands.is_empty() {
        return Ok(result);
    }

    if dry_run {
        let mut scratch = ws.clone();
        let exec = execute(&result.commands, &mut scratch);
        result.messages.extend(exec.messages);
        result.executed = exec.executed;
        result.add_message(CmdMessage::info("Dry run: nothing was written."));
        return Ok(result);
    }

    let exec = execute(&result.commands, ws);
    result.messages.extend(exec.messages);

    for executed in &exec.executed {
        match &executed.outcome {
            Outcome::Deleted(path) => {
                queue.discard(path);
                store.delete(&file_key(path))?;
            }
            Outcome::Renamed { from, to } => {
                queue.discard(from);
                store.delete(&file_key(from))?;
                queue_written(ws, queue, to, now, &mut result);
            }
            outcome => {
                if let Some(path) = outcome.written_path() {
                    queue_written(ws, queue, path, now, &mut result);
                }
            }
        }
    }
    result.executed = exec.executed;
    Ok(result)
}

fn queue_written(
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    path: &str,
    now: DateTime<Utc>,
    result: &mut CmdResult,
) {
    let Some(content) = ws.content(path) else {
        return;
    };
    if let QueueOutcome::Conflict { filename } = queue.queue_save(path, content, now) {
        if let Some(pending) = queue.entry(path) {
            ws.insert_file(path, pending.content.clone());
        }
        result.add_message(CmdMessage::warning(format!(
            "Conflict on {}: a newer write is already queued",
            filename
        )));
    }
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

    fn setup() -> (MemoryStore, Workspace, SaveQueue) {
        let store = MemoryStore::new();
        let ws = Workspace::from_entries(vec![
            FileEntry::new("src/index.ts", "console.log(1);\n"),
            FileEntry::new("src/old.ts", "export const a = 1;\n"),
        ]);
        ws.persist(&store).unwrap();
        (store, ws, SaveQueue::new(SaveSettings::default()))
    }

    #[test]
    fn created_files_are_queued() {
        let (store, mut ws, mut queue) = setup();
        let text = "create file notes.md with ```md\n# Notes\n```";
        let result = run(&store, &mut ws, &mut queue, text, false, t(0)).unwrap();

        assert_eq!(result.executed.len(), 1);
        assert!(ws.contains("notes.md"));
        assert_eq!(queue.entry("notes.md").unwrap().content, "# Notes");
    }

    #[test]
    fn delete_removes_stored_content() {
        let (store, mut ws, mut queue) = setup();
        run(&store, &mut ws, &mut queue, "delete file old.ts", false, t(0)).unwrap();

        assert!(!ws.contains("src/old.ts"));
        assert_eq!(store.get("file:src/old.ts").unwrap(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn older_apply_keeps_pending_content_visible() {
        let (store, mut ws, mut queue) = setup();
        ws.insert_file("src/index.ts", "console.log(2);\n");
        queue.queue_save("src/index.ts", "console.log(2);\n", t(10));

        let text = "update file index.ts with ```ts\nconsole.log(3);\n```";
        let result = run(&store, &mut ws, &mut queue, text, false, t(5)).unwrap();

        assert!(result
            .messages
            .iter()
            .any(|m| m.content.contains("Conflict on src/index.ts")));
        assert_eq!(ws.content("src/index.ts"), Some("console.log(2);\n"));
        assert_eq!(queue.entry("src/index.ts").unwrap().content, "console.log(2);\n");
        assert_eq!(queue.conflict("src/index.ts").unwrap().local, "console.log(3);");
    }

    #[test]
    fn delete_drops_recorded_conflict() {
        let (store, mut ws, mut queue) = setup();
        queue.queue_save("src/old.ts", "export const a = 2;\n", t(10));
        queue.queue_save("src/old.ts", "export const a = 3;\n", t(5));
        assert!(queue.conflict("src/old.ts").is_some());

        run(&store, &mut ws, &mut queue, "delete file old.ts", false, t(20)).unwrap();

        assert!(queue.conflicts().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn rename_moves_stored_content() {
        let (store, mut ws, mut queue) = setup();
        run(&store, &mut ws, &mut queue, "rename old.ts to new.ts", false, t(0)).unwrap();

        assert!(ws.contains("src/new.ts"));
        assert_eq!(store.get("file:src/old.ts").unwrap(), None);
        assert_eq!(
            queue.entry("src/new.ts").unwrap().content,
            "export const a = 1;\n"
        );
    }

    #[test]
    fn dry_run_leaves_everything_alone() {
        let (store, mut ws, mut queue) = setup();
        let before = ws.clone();
        let result = run(&store, &mut ws, &mut queue, "delete file old.ts", true, t(0)).unwrap();

        assert_eq!(result.executed.len(), 1);
        assert_eq!(ws, before);
        assert!(queue.is_empty());
        assert!(store.get("file:src/old.ts").unwrap().is_some());
    }

    #[test]
    fn prose_without_commands() {
        let (store, mut ws, mut queue) = setup();
        let result = run(&store, &mut ws, &mut queue, "Looks good to me.", false, t(0)).unwrap();
        assert!(result.commands.is_empty());
        assert_eq!(result.messages.len(), 1);
    }
}
