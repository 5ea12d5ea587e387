use crate::chat::ChatSession;
use crate::config::LoftConfig;
use crate::error::Result;
use crate::executor::ExecutedCommand;
use crate::model::{FileEntry, Workspace};
use crate::parser::AiCommand;
use crate::save_queue::{Conflict, HistoryEntry, SaveQueue, SaveReport};
use crate::store::KeyValueStore;
use std::path::PathBuf;

pub mod apply;
pub mod chat;
pub mod config;
pub mod conflicts;
pub mod export;
pub mod files;
pub mod health;
pub mod history;
pub mod init;
pub mod save;

pub use health::HealthReport;

#[derive(Debug, Clone)]
pub struct LoftPaths {
    /// Holds config.json and, for the file-backed store, the key files.
    pub data_dir: PathBuf,
}

impl LoftPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

/// Load the workspace from `store`, then lay pending writes over it.
///
/// Unflushed writes are newer than what the store holds.
pub fn load_workspace<S: KeyValueStore>(store: &S, queue: &SaveQueue) -> Result<Workspace> {
    let mut workspace = Workspace::load(store)?;
    for (name, entry) in queue.pending() {
        workspace.insert_file(name, entry.content.clone());
    }
    Ok(workspace)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct CmdMessage {
    pub level: MessageLevel,
    pub content: String,
}

impl CmdMessage {
    pub fn info(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            content: content.into(),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            content: content.into(),
        }
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            content: content.into(),
        }
    }
}

/// One row of `ls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub filename: String,
    pub language: &'static str,
    pub lines: usize,
    pub bytes: usize,
    pub open: bool,
    pub selected: bool,
    /// A write is queued but not yet flushed.
    pub pending: bool,
}

#[derive(Debug, Default)]
pub struct CmdResult {
    pub files: Vec<FileSummary>,
    pub file: Option<FileEntry>,
    pub commands: Vec<AiCommand>,
    pub executed: Vec<ExecutedCommand>,
    pub report: Option<SaveReport>,
    pub conflicts: Vec<(String, Conflict)>,
    pub history: Vec<HistoryEntry>,
    pub diff: Option<String>,
    pub sessions: Vec<ChatSession>,
    pub transcript: Option<String>,
    pub health: Option<HealthReport>,
    pub config: Option<LoftConfig>,
    pub messages: Vec<CmdMessage>,
}

impl CmdResult {
    pub fn add_message(&mut self, message: CmdMessage) {
        self.messages.push(message);
    }

    pub fn with_files(mut self, files: Vec<FileSummary>) -> Self {
        self.files = files;
        self
    }

    pub fn with_file(mut self, file: FileEntry) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_commands(mut self, commands: Vec<AiCommand>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_report(mut self, report: SaveReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn with_conflicts(mut self, conflicts: Vec<(String, Conflict)>) -> Self {
        self.conflicts = conflicts;
        self
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_diff(mut self, diff: String) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_sessions(mut self, sessions: Vec<ChatSession>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_transcript(mut self, transcript: String) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn with_health(mut self, health: HealthReport) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_config(mut self, config: LoftConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Append another result's messages, keeping this result's data.
    pub fn merge_messages(&mut self, other: CmdResult) {
        self.messages.extend(other.messages);
    }
}
