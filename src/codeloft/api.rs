//! # API Facade
//!
//! The API layer is a **thin facade** over the command layer and the single entry
//! point for every codeloft operation, whichever UI drives it.
//!
//! ## Lifecycle
//!
//! [`LoftApi::open`] is the explicit init: it loads the workspace, restores the
//! autosave session (pending writes, conflicts, history), migrates legacy chat
//! history and reloads recent error records. [`LoftApi::close`] is the explicit
//! dispose: a final flush followed by [`LoftApi::persist`]. Nothing happens at
//! import time and there is no global state.
//!
//! ## Time
//!
//! Every operation that depends on time takes `now`. The API never reads the
//! clock, so a UI can drive [`LoftApi::tick`] from whatever timer it has and tests
//! can replay exact schedules.
//!
//! ## Generic Over KeyValueStore
//!
//! - Production: `LoftApi<FileStore>`
//! - Testing: `LoftApi<MemoryStore>`
//!
//! ## What the API Does NOT Do
//!
//! - **Business logic**: that belongs in `commands/*.rs`
//! - **Presentation**: it returns `CmdResult`, never strings for a terminal

use crate::chat::ChatStore;
use crate::commands::{self, config::ConfigAction, CmdResult, LoftPaths};
use crate::config::LoftConfig;
use crate::error::Result;
use crate::model::Workspace;
use crate::recovery::deployment::DeploymentMonitor;
use crate::recovery::{ErrorMonitor, ErrorRecord};
use crate::save_queue::{Resolution, SaveQueue};
use crate::store::{KeyValueStore, ERROR_LOG_KEY};
use chrono::{DateTime, Utc};
use std::path::Path;

pub use crate::commands::{CmdMessage, FileSummary, HealthReport, MessageLevel};

pub struct LoftApi<S: KeyValueStore> {
    store: S,
    paths: LoftPaths,
    config: LoftConfig,
    workspace: Workspace,
    queue: SaveQueue,
    chat: ChatStore,
    monitor: ErrorMonitor,
}

impl<S: KeyValueStore> LoftApi<S> {
    pub fn open(store: S, paths: LoftPaths, config: LoftConfig, now: DateTime<Utc>) -> Result<Self> {
        let mut queue = SaveQueue::new(config.save_settings());
        queue.load_session(&store)?;
        let workspace = commands::load_workspace(&store, &queue)?;
        let chat = ChatStore::load(&store, now)?;

        let mut monitor = ErrorMonitor::new();
        if let Some(raw) = store.get(ERROR_LOG_KEY)? {
            match serde_json::from_str::<Vec<ErrorRecord>>(&raw) {
                Ok(records) => monitor.restore_records(records, now),
                Err(e) => log::warn!("ignoring unreadable error log: {}", e),
            }
        }

        log::debug!(
            "opened workspace: {} files, {} pending saves, {} conflicts",
            workspace.len(),
            queue.pending().len(),
            queue.conflicts().len()
        );
        Ok(Self {
            store,
            paths,
            config,
            workspace,
            queue,
            chat,
            monitor,
        })
    }

    /// Write session, layout and error log without flushing pending saves.
    pub fn persist(&self, now: DateTime<Utc>) -> Result<()> {
        self.queue.save_session(&self.store, now)?;
        self.workspace.persist_layout(&self.store)?;
        let records: Vec<&ErrorRecord> = self.monitor.log().records().collect();
        self.store
            .set(ERROR_LOG_KEY, &serde_json::to_string(&records)?)
    }

    /// Final flush, then persist.
    pub fn close(mut self, now: DateTime<Utc>) -> Result<CmdResult> {
        let result = if self.queue.is_empty() {
            CmdResult::default()
        } else {
            self.flush(now)?
        };
        self.persist(now)?;
        Ok(result)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn queue(&self) -> &SaveQueue {
        &self.queue
    }

    pub fn config(&self) -> &LoftConfig {
        &self.config
    }

    pub fn chat(&self) -> &ChatStore {
        &self.chat
    }

    /// Id of the session that `say` and `reply` target by default.
    pub fn current_chat(&self) -> Result<Option<String>> {
        self.chat.current_session_id(&self.store)
    }

    pub fn monitor(&self) -> &ErrorMonitor {
        &self.monitor
    }

    pub fn init(&mut self) -> Result<CmdResult> {
        let result = commands::init::run(&self.paths, &self.store)?;
        self.workspace = commands::load_workspace(&self.store, &self.queue)?;
        Ok(result)
    }

    pub fn list_files(&self) -> Result<CmdResult> {
        commands::files::list(&self.workspace, &self.queue)
    }

    pub fn read_file(&self, name: &str) -> Result<CmdResult> {
        commands::files::read(&self.workspace, name)
    }

    /// Queue a write stamped `timestamp` (usually now).
    pub fn write_file(
        &mut self,
        name: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<CmdResult> {
        commands::files::write(&mut self.workspace, &mut self.queue, name, content, timestamp)
    }

    pub fn format_file(&mut self, name: &str, now: DateTime<Utc>) -> Result<CmdResult> {
        commands::files::format(&mut self.workspace, &mut self.queue, name, now)
    }

    pub fn parse_response(&self, text: &str) -> Result<CmdResult> {
        commands::apply::parse(&self.workspace, text)
    }

    pub fn apply_response(
        &mut self,
        text: &str,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<CmdResult> {
        commands::apply::run(
            &self.store,
            &mut self.workspace,
            &mut self.queue,
            text,
            dry_run,
            now,
        )
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<CmdResult> {
        let result = commands::save::tick(&self.store, &mut self.queue, now)?;
        self.after_save(result, now)
    }

    pub fn flush(&mut self, now: DateTime<Utc>) -> Result<CmdResult> {
        let result = commands::save::flush(&self.store, &mut self.queue, now)?;
        self.after_save(result, now)
    }

    fn after_save(&mut self, mut result: CmdResult, now: DateTime<Utc>) -> Result<CmdResult> {
        if let Some(report) = &result.report {
            // Show what was stored, which may have been reformatted.
            for saved in &report.saved {
                if self.workspace.contains(&saved.filename)
                    && self.queue.entry(&saved.filename).is_none()
                {
                    self.workspace.insert_file(&saved.filename, saved.content.clone());
                }
            }
            let messages = commands::save::report_failures(
                &self.store,
                &mut self.workspace,
                &mut self.queue,
                &mut self.monitor,
                report,
                now,
            )?;
            result.messages.extend(messages);
        }
        Ok(result)
    }

    pub fn conflicts(&self) -> Result<CmdResult> {
        commands::conflicts::list(&self.queue)
    }

    pub fn resolve_conflict(
        &mut self,
        name: &str,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<CmdResult> {
        commands::conflicts::resolve(&mut self.workspace, &mut self.queue, name, resolution, now)
    }

    pub fn history(&self, name: &str) -> Result<CmdResult> {
        commands::history::list(&self.workspace, &self.queue, name)
    }

    pub fn diff_versions(&self, name: &str, from: u64, to: Option<u64>) -> Result<CmdResult> {
        commands::history::diff(&self.workspace, &self.queue, name, from, to)
    }

    pub fn restore_version(
        &mut self,
        name: &str,
        version: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<CmdResult> {
        commands::history::undo(&mut self.workspace, &mut self.queue, name, version, now)
    }

    pub fn export(&self, dir: &Path, now: DateTime<Utc>) -> Result<CmdResult> {
        commands::export::run(&self.workspace, dir, now)
    }

    pub fn config_action(&mut self, action: ConfigAction) -> Result<CmdResult> {
        let result = commands::config::run(&self.paths, action)?;
        if let Some(config) = &result.config {
            self.config = config.clone();
        }
        Ok(result)
    }

    pub fn chat_new(&mut self, title: Option<&str>, now: DateTime<Utc>) -> Result<CmdResult> {
        commands::chat::create(&self.store, &mut self.chat, title, now)
    }

    pub fn chat_list(&self) -> Result<CmdResult> {
        commands::chat::list(&self.chat)
    }

    pub fn chat_show(&self, id: Option<&str>) -> Result<CmdResult> {
        commands::chat::show(&self.store, &self.chat, id)
    }

    pub fn chat_switch(&self, id: &str) -> Result<CmdResult> {
        commands::chat::switch(&self.store, &self.chat, id)
    }

    pub fn chat_say(
        &mut self,
        id: Option<&str>,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<CmdResult> {
        commands::chat::say(&self.store, &mut self.chat, id, content, now)
    }

    /// Record an assistant reply; with `apply`, also run its file commands.
    pub fn chat_reply(
        &mut self,
        id: Option<&str>,
        content: &str,
        apply: bool,
        now: DateTime<Utc>,
    ) -> Result<CmdResult> {
        let mut result = commands::chat::reply(&self.store, &mut self.chat, id, content, now)?;
        if apply {
            let applied = self.apply_response(content, false, now)?;
            result.commands = applied.commands;
            result.executed = applied.executed;
            result.messages.extend(applied.messages);
        }
        Ok(result)
    }

    pub fn chat_rename(&mut self, id: &str, title: &str, now: DateTime<Utc>) -> Result<CmdResult> {
        commands::chat::rename(&self.store, &mut self.chat, id, title, now)
    }

    pub fn chat_delete(&mut self, id: &str) -> Result<CmdResult> {
        commands::chat::delete(&self.store, &mut self.chat, id)
    }

    pub fn chat_clear(&mut self) -> Result<CmdResult> {
        commands::chat::clear(&self.store, &mut self.chat)
    }

    pub fn chat_search(&self, query: &str) -> Result<CmdResult> {
        commands::chat::search(&self.chat, query)
    }

    pub fn chat_export(&self, id: Option<&str>) -> Result<CmdResult> {
        commands::chat::export(&self.store, &self.chat, id)
    }

    pub fn health(&mut self, probes: &DeploymentMonitor, now: DateTime<Utc>) -> Result<CmdResult> {
        commands::health::run(&mut self.monitor, probes, now)
    }

    /// Classify an external error and run its recovery strategy. `probes`
    /// answer whether the host is online.
    pub fn report_error(
        &mut self,
        message: &str,
        stack: Option<&str>,
        probes: &DeploymentMonitor,
        now: DateTime<Utc>,
    ) -> Result<CmdResult> {
        commands::health::report(
            &self.store,
            &mut self.workspace,
            &mut self.queue,
            &mut self.monitor,
            probes,
            message,
            stack,
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::test_utils::TestEnv;
    use chrono::Duration;

    fn open(store: &MemoryStore, now: DateTime<Utc>) -> LoftApi<&MemoryStore> {
        LoftApi::open(store, TestEnv::paths(), LoftConfig::default(), now).unwrap()
    }

    #[test]
    fn write_then_tick_saves_formatted() {
        let mut env = TestEnv::new();
        env.api.write_file("notes.txt", "hello  ", env.now).unwrap();
        assert!(env.api.tick(env.now).unwrap().report.is_none());

        let later = env.advance(Duration::seconds(2));
        let result = env.api.tick(later).unwrap();
        assert_eq!(result.report.unwrap().saved.len(), 1);
        assert_eq!(
            env.api.store().get("file:notes.txt").unwrap().as_deref(),
            Some("hello\n")
        );
        assert_eq!(env.api.workspace().content("notes.txt"), Some("hello\n"));
    }

    #[test]
    fn close_and_reopen_keeps_everything() {
        let store = MemoryStore::new();
        let now = TestEnv::epoch();
        {
            let mut api = open(&store, now);
            api.apply_response("create file src/lib.rs with ```rust\npub fn a() {}\n```", false, now)
                .unwrap();
            api.chat_say(None, "hi there", now).unwrap();
            let flushed = api.close(now).unwrap();
            assert_eq!(flushed.report.unwrap().saved.len(), 1);
        }

        let api = open(&store, now);
        assert_eq!(api.workspace().content("src/lib.rs"), Some("pub fn a() {}\n"));
        assert_eq!(api.workspace().selected(), Some("src/lib.rs"));
        assert_eq!(api.chat_list().unwrap().sessions[0].title, "hi there");
        assert!(api.queue().is_empty());
    }

    #[test]
    fn pending_writes_survive_persist() {
        let store = MemoryStore::new();
        let now = TestEnv::epoch();
        {
            let mut api = open(&store, now);
            api.write_file("draft.md", "# draft", now).unwrap();
            api.persist(now).unwrap();
        }
        assert_eq!(store.get("file:draft.md").unwrap(), None);

        let api = open(&store, now);
        assert_eq!(api.workspace().content("draft.md"), Some("# draft"));
        assert!(api.queue().entry("draft.md").is_some());
    }

    #[test]
    fn chat_reply_can_apply_commands() {
        let mut env = TestEnv::new();
        let now = env.now;
        env.api.chat_say(None, "make a helper", now).unwrap();
        let result = env
            .api
            .chat_reply(None, "create file util.py with ```python\nx = 1\n```", true, now)
            .unwrap();

        assert_eq!(result.sessions[0].messages.len(), 2);
        assert_eq!(result.executed.len(), 1);
        assert!(env.api.workspace().resolve("util.py").is_some());
    }

    #[test]
    fn failed_saves_are_reported_to_monitor() {
        let mut env = TestEnv::new();
        env.api.store().set_simulate_write_error(true);
        env.api.write_file("a.txt", "x", env.now).unwrap();
        for _ in 0..3 {
            let now = env.advance(Duration::seconds(1));
            env.api.flush(now).unwrap();
        }
        assert!(env.api.queue().is_empty());
        assert_eq!(env.api.monitor().log().len(), 1);
        assert!(env.api.health(&DeploymentMonitor::default(), env.now).unwrap().health.unwrap().score < 100);
    }

    #[test]
    fn recovery_reload_keeps_unsaved_writes() {
        let mut env = TestEnv::new();
        env.api.write_file("draft.md", "# unsaved", env.now).unwrap();
        let now = env.now;
        env.api
            .report_error("Minified React error #418", None, &DeploymentMonitor::default(), now)
            .unwrap();

        assert!(env.api.queue().entry("draft.md").is_some());
        assert_eq!(env.api.workspace().content("draft.md"), Some("# unsaved"));
    }

    #[test]
    fn error_log_survives_reopen() {
        let store = MemoryStore::new();
        let now = TestEnv::epoch();
        {
            let mut api = open(&store, now);
            api.report_error("Storage quota exceeded", None, &DeploymentMonitor::default(), now)
                .unwrap();
            api.close(now).unwrap();
        }
        let api = open(&store, now);
        assert_eq!(api.monitor().log().len(), 1);
    }
}
