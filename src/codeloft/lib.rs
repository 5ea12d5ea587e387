//! # Codeloft Architecture
//!
//! Codeloft is the **portable core of an AI coding workspace**: it keeps a set of
//! files, turns AI replies into file operations, saves edits through a debounced
//! queue with conflict detection, and watches for errors it knows how to recover
//! from. It is a library that happens to have a CLI client, not the other way
//! around.
//!
//! ## The Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (cli/, wired by main.rs)                         │
//! │  - Parses arguments, formats output, reads the clock        │
//! │  - The ONLY place that knows about stdout/stderr/exit codes │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - Thin facade over commands, explicit open()/close()       │
//! │  - Owns workspace, save queue, chat store, error monitor    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs)                              │
//! │  - Business operations returning CmdResult                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Engines                                                    │
//! │  parser → executor → save_queue → store, recovery, chat     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//!
//! An AI reply is tokenized and parsed into [`parser::AiCommand`]s (explicit
//! phrases first, code-block inference second), applied to the
//! [`model::Workspace`] by [`executor::execute`], and every touched file is queued
//! in the [`save_queue::SaveQueue`]. The queue flushes into a
//! [`store::KeyValueStore`] when its debounce or interval elapses. Saves that fail
//! for good are reported to the [`recovery::ErrorMonitor`].
//!
//! ## Key Principle: No Clock, No I/O Assumptions in Core
//!
//! From `api.rs` inward, code takes `now: DateTime<Utc>` as an argument and never
//! writes to stdout or exits the process. Scheduling is a question asked at an
//! instant ([`save_queue::SaveQueue::flush_due`]), not a timer.
//!
//! ## Module Overview
//!
//! - [`api`]: The API facade, entry point for all operations
//! - [`commands`]: Business logic for each command
//! - [`store`]: Key-value storage abstraction and implementations
//! - [`model`]: Workspace files and folders
//! - [`format`]: Language detection and save-time formatting
//! - [`save_queue`]: Pending saves, conflicts, merge and history
//! - [`parser`]: AI reply parsing
//! - [`executor`]: Applying parsed commands to the workspace
//! - [`recovery`]: Error classification, recovery strategies and health probes
//! - [`chat`]: Persisted chat sessions
//! - [`config`]: Configuration management
//! - [`error`]: Error types
//! - `cli`: Argument parsing and printing for the binary (not part of the lib API)

pub mod api;
pub mod chat;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod model;
pub mod parser;
pub mod recovery;
pub mod save_queue;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
