use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use codeloft::save_queue::Resolution;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "codeloft", bin_name = "codeloft", version)]
#[command(
    about = "AI coding workspace: apply AI replies to files, autosave with conflict detection",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Use the global workspace instead of ./.codeloft
    #[arg(short, long, global = true, help_heading = "Options")]
    pub global: bool,

    /// Verbose output
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    File(FileCommands),

    #[command(flatten)]
    Ai(AiCommands),

    #[command(flatten)]
    Save(SaveCommands),

    /// Chat sessions
    #[command(subcommand)]
    Chat(ChatCommands),

    #[command(flatten)]
    Misc(MiscCommands),
}

#[derive(Subcommand, Debug)]
pub enum FileCommands {
    /// List workspace files
    #[command(alias = "list", display_order = 1)]
    Ls,

    /// Print a file
    #[command(alias = "cat", display_order = 2)]
    Show { file: String },

    /// Write a file (content from the argument or stdin)
    #[command(display_order = 3)]
    Write {
        file: String,

        /// New content; read from stdin when omitted
        content: Option<String>,

        /// Leave the write pending instead of flushing on exit
        #[arg(long)]
        defer: bool,

        /// Timestamp of the edit (RFC 3339), defaults to now
        #[arg(long, value_name = "TIME")]
        at: Option<DateTime<Utc>>,
    },

    /// Reformat a file
    #[command(display_order = 4)]
    Format { file: String },
}

#[derive(Subcommand, Debug)]
pub enum AiCommands {
    /// Apply the file commands found in an AI reply
    #[command(display_order = 10)]
    Apply {
        /// File holding the reply; read from stdin when omitted
        input: Option<PathBuf>,

        /// Show what would change without touching the workspace
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse an AI reply and list the file commands it contains
    #[command(display_order = 11)]
    Parse {
        /// File holding the reply; read from stdin when omitted
        input: Option<PathBuf>,

        /// Print commands as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SaveCommands {
    /// Save every pending write now
    #[command(display_order = 20)]
    Flush,

    /// Save pending writes whose debounce or interval has elapsed
    #[command(display_order = 21)]
    Tick,

    /// List files with unresolved save conflicts
    #[command(display_order = 22)]
    Conflicts,

    /// Resolve a conflict with local, remote or merge
    #[command(display_order = 23)]
    Resolve {
        file: String,

        /// local (mine), remote (theirs) or merge
        resolution: Resolution,
    },

    /// List saved versions of a file
    #[command(display_order = 24)]
    History { file: String },

    /// Diff two saved versions (the newest when TO is omitted)
    #[command(display_order = 25)]
    Diff {
        file: String,
        from: u64,
        to: Option<u64>,
    },

    /// Restore a saved version (the one before the newest when omitted)
    #[command(display_order = 26)]
    Undo { file: String, version: Option<u64> },
}

#[derive(Subcommand, Debug)]
pub enum ChatCommands {
    /// Start a new session and make it current
    New { title: Option<String> },

    /// List sessions, most recently active first
    #[command(alias = "ls")]
    List,

    /// Print a session (the current one when omitted)
    Show { id: Option<String> },

    /// Make a session current
    Switch { id: String },

    /// Add a user message
    Say {
        /// Message text; read from stdin when omitted
        message: Option<String>,

        #[arg(long, short)]
        session: Option<String>,
    },

    /// Record an assistant reply
    Reply {
        /// Reply text; read from stdin when omitted
        message: Option<String>,

        #[arg(long, short)]
        session: Option<String>,

        /// Also apply the file commands in the reply
        #[arg(long)]
        apply: bool,
    },

    /// Retitle a session
    Rename { id: String, title: String },

    /// Delete a session
    #[command(alias = "rm")]
    Delete { id: String },

    /// Delete every session
    Clear,

    /// Search titles and messages
    Search { query: String },

    /// Export a session as markdown
    Export {
        id: Option<String>,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum MiscCommands {
    /// Create the workspace
    #[command(display_order = 40)]
    Init,

    /// Export all files to a tar.gz archive
    #[command(display_order = 41)]
    Export {
        /// Directory for the archive (defaults to the current one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Run health probes and show recent errors
    #[command(display_order = 42)]
    Health,

    /// Report an error and attempt recovery
    #[command(display_order = 43)]
    Report {
        message: String,

        #[arg(long)]
        stack: Option<String>,
    },

    /// Get or set configuration
    #[command(display_order = 44)]
    Config {
        /// Configuration key (e.g., auto-format)
        key: Option<String>,

        /// Value to set (if omitted, prints current value)
        value: Option<String>,
    },
}
