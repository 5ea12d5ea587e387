//! # CLI Layer
//!
//! This module is **one possible UI client** for codeloft. It is not the
//! application itself.
//!
//! The CLI layer is the **only** place in the codebase that:
//! - Knows about terminal I/O (stdout, stderr, stdin)
//! - Reads the wall clock
//! - Handles argument parsing
//! - Formats output for human consumption
//!
//! ## One-shot lifecycle
//!
//! Every invocation opens the API, dispatches one command and closes it again.
//! Closing performs the final flush, so `codeloft write` behaves like an editor
//! session that ends right after the edit. `write --defer` skips that flush and
//! only persists the autosave session, leaving the write pending for a later
//! `tick` or `flush`.
//!
//! ## Structure
//!
//! - `setup`: clap definitions
//! - `commands`: `run()` and the per-command handlers
//! - `print`: rendering of `CmdResult` parts

mod commands;
mod print;
pub mod setup;

pub use commands::run;
