use crate::commands::{CmdMessage, CmdResult, FileSummary};
use crate::error::{LoftError, Result};
use crate::format::{format_content, Language};
use crate::model::{FileEntry, Workspace};
use crate::save_queue::{QueueOutcome, SaveQueue};
use chrono::{DateTime, Utc};

pub fn list(ws: &Workspace, queue: &SaveQueue) -> Result<CmdResult> {
    let files: Vec<FileSummary> = ws
        .entries()
        .into_iter()
        .map(|entry| FileSummary {
            language: Language::detect(&entry.filename).name(),
            lines: entry.content.lines().count(),
            bytes: entry.content.len(),
            open: ws.open_tabs().iter().any(|t| t == &entry.filename),
            selected: ws.selected() == Some(entry.filename.as_str()),
            pending: queue.entry(&entry.filename).is_some(),
            filename: entry.filename,
        })
        .collect();

    let mut result = CmdResult::default().with_files(files);
    if result.files.is_empty() {
        result.add_message(CmdMessage::info("Workspace is empty."));
    }
    Ok(result)
}

pub fn read(ws: &Workspace, name: &str) -> Result<CmdResult> {
    let path = ws
        .resolve(name)
        .ok_or_else(|| LoftError::FileNotFound(name.to_string()))?;
    let content = ws.content(&path).unwrap_or_default().to_string();
    Ok(CmdResult::default().with_file(FileEntry::new(path, content)))
}

/// Put `content` into the workspace and queue it for saving.
pub fn write(
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    name: &str,
    content: &str,
    timestamp: DateTime<Utc>,
) -> Result<CmdResult> {
    let path = ws.resolve(name).unwrap_or_else(|| name.to_string());
    let mut result = CmdResult::default();

    match queue.queue_save(&path, content, timestamp) {
        QueueOutcome::Queued { version } => {
            let existed = ws.insert_file(&path, content);
            ws.open_tab(&path);
            ws.select(&path);
            let verb = if existed { "Updated" } else { "Created" };
            result.add_message(CmdMessage::success(format!(
                "{} {} (version {})",
                verb, path, version
            )));
        }
        QueueOutcome::Conflict { filename } => {
            result.add_message(CmdMessage::warning(format!(
                "Conflict on {}: a newer write is already queued. Resolve it with `codeloft resolve {} <local|remote|merge>`.",
                filename, filename
            )));
        }
    }
    Ok(result)
}

/// Reformat one file in place and queue the result.
pub fn format(
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    name: &str,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let path = ws
        .resolve(name)
        .ok_or_else(|| LoftError::FileNotFound(name.to_string()))?;
    let current = ws.content(&path).unwrap_or_default().to_string();
    let formatted = format_content(&path, &current);

    if formatted == current {
        let mut result = CmdResult::default();
        result.add_message(CmdMessage::info(format!("{} is already formatted", path)));
        return Ok(result);
    }
    let mut result = write(ws, queue, &path, &formatted, now)?;
    result.add_message(CmdMessage::info(format!(
        "Formatted as {}",
        Language::detect(&path).name()
    )));
    Ok(result)
}
