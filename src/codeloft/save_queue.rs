//! # Save Queue
//!
//! Per-file pending writes with timestamp-based conflict detection.
//!
//! ## Ordering
//!
//! There is at most one pending entry per file. A write whose timestamp is older
//! than the pending entry's is not applied: it is recorded as a [`Conflict`]
//! (`local` = the incoming write, `remote` = what is queued) and left for an
//! explicit [`SaveQueue::resolve_conflict`]. Conflicts never expire.
//!
//! ## Flushing
//!
//! The queue does not own a timer. Callers ask [`SaveQueue::flush_due`] at any
//! instant and call [`SaveQueue::process`] when it answers:
//!
//! - `Debounce`: the newest change is at least `debounce` old (trailing edge)
//! - `Periodic`: the last flush (or the first pending change) is at least
//!   `interval` old, so a stream of edits still gets saved
//!
//! ## Failures
//!
//! Each flush is one attempt per entry. A failed write bumps the entry's retry
//! count; at `max_retries` the entry is dropped and reported in
//! [`SaveReport::failed`]. There is no backoff.
//!
//! ## History
//!
//! Every successful save is appended to a bounded per-file history used for undo
//! ([`SaveQueue::restore`]) and diffs ([`SaveQueue::diff`]).

use crate::error::{LoftError, Result};
use crate::format::format_content;
use crate::store::{file_key, KeyValueStore, SESSION_KEY};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

pub const SESSION_FORMAT_VERSION: &str = "2.0";

const LOCAL_MARKER: &str = "<<<<<<< LOCAL";
const SEPARATOR_MARKER: &str = "=======";
const REMOTE_MARKER: &str = ">>>>>>> REMOTE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSettings {
    pub debounce: Duration,
    pub interval: Duration,
    pub max_retries: u32,
    pub history_limit: usize,
    pub auto_format: bool,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::milliseconds(1000),
            interval: Duration::seconds(30),
            max_retries: 3,
            history_limit: 10,
            auto_format: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveQueueEntry {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub local: String,
    pub remote: String,
    pub local_timestamp: DateTime<Utc>,
    pub remote_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub version: u64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Queued { version: u64 },
    Conflict { filename: String },
}

impl QueueOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, QueueOutcome::Conflict { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Local,
    Remote,
    Merge,
}

impl FromStr for Resolution {
    type Err = LoftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" | "mine" => Ok(Resolution::Local),
            "remote" | "theirs" => Ok(Resolution::Remote),
            "merge" => Ok(Resolution::Merge),
            other => Err(LoftError::Api(format!(
                "Unknown resolution '{}' (expected local, remote or merge)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Debounce,
    Periodic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub filename: String,
    pub version: u64,
    /// Content as written, after formatting.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSave {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: Vec<SavedFile>,
    pub retrying: Vec<String>,
    pub failed: Vec<FailedSave>,
}

impl SaveReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.retrying.is_empty() && self.failed.is_empty()
    }
}

/// Serializable state of a queue, written under `autoSave_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSession {
    pub version: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub version_counter: u64,
    #[serde(default)]
    pub entries: BTreeMap<String, SaveQueueEntry>,
    #[serde(default)]
    pub conflicts: BTreeMap<String, Conflict>,
    #[serde(default)]
    pub history: BTreeMap<String, Vec<HistoryEntry>>,
}

#[derive(Debug, Default)]
pub struct SaveQueue {
    settings: SaveSettings,
    entries: BTreeMap<String, SaveQueueEntry>,
    conflicts: BTreeMap<String, Conflict>,
    history: BTreeMap<String, VecDeque<HistoryEntry>>,
    version_counter: u64,
    last_change: Option<DateTime<Utc>>,
    pending_since: Option<DateTime<Utc>>,
    last_flush: Option<DateTime<Utc>>,
}

impl SaveQueue {
    pub fn new(settings: SaveSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &SaveSettings {
        &self.settings
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending(&self) -> &BTreeMap<String, SaveQueueEntry> {
        &self.entries
    }

    pub fn entry(&self, filename: &str) -> Option<&SaveQueueEntry> {
        self.entries.get(filename)
    }

    pub fn conflicts(&self) -> &BTreeMap<String, Conflict> {
        &self.conflicts
    }

    pub fn conflict(&self, filename: &str) -> Option<&Conflict> {
        self.conflicts.get(filename)
    }

    /// Queue a write. Older-than-pending writes become conflicts.
    pub fn queue_save(
        &mut self,
        filename: &str,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> QueueOutcome {
        let content = content.into();

        if let Some(existing) = self.entries.get(filename) {
            if existing.timestamp > timestamp {
                log::warn!(
                    "conflicting save for {}: incoming {} is older than queued {}",
                    filename,
                    timestamp,
                    existing.timestamp
                );
                self.conflicts.insert(
                    filename.to_string(),
                    Conflict {
                        local: content,
                        remote: existing.content.clone(),
                        local_timestamp: timestamp,
                        remote_timestamp: existing.timestamp,
                    },
                );
                return QueueOutcome::Conflict {
                    filename: filename.to_string(),
                };
            }
        }

        let version = self.put(filename, content, timestamp);
        QueueOutcome::Queued { version }
    }

    fn put(&mut self, filename: &str, content: String, timestamp: DateTime<Utc>) -> u64 {
        self.version_counter += 1;
        let version = self.version_counter;
        self.entries.insert(
            filename.to_string(),
            SaveQueueEntry {
                content,
                timestamp,
                version,
                retry_count: 0,
            },
        );
        log::debug!("queued {} as version {}", filename, version);

        self.last_change = Some(match self.last_change {
            Some(prev) if prev > timestamp => prev,
            _ => timestamp,
        });
        if self.pending_since.is_none() {
            self.pending_since = Some(timestamp);
        }
        version
    }

    /// Drop a pending write and any recorded conflict, e.g. because the file
    /// was deleted.
    pub fn discard(&mut self, filename: &str) -> Option<SaveQueueEntry> {
        self.conflicts.remove(filename);
        let removed = self.entries.remove(filename);
        if self.entries.is_empty() {
            self.pending_since = None;
        }
        removed
    }

    /// Whether a flush should happen at `now`, and why.
    pub fn flush_due(&self, now: DateTime<Utc>) -> Option<FlushTrigger> {
        if self.entries.is_empty() {
            return None;
        }
        if let Some(changed) = self.last_change {
            if now - changed >= self.settings.debounce {
                return Some(FlushTrigger::Debounce);
            }
        }
        let anchor = match (self.last_flush, self.pending_since) {
            (Some(flushed), Some(since)) => flushed.max(since),
            (Some(flushed), None) => flushed,
            (None, Some(since)) => since,
            (None, None) => return None,
        };
        if now - anchor >= self.settings.interval {
            return Some(FlushTrigger::Periodic);
        }
        None
    }

    /// Write every pending entry to `store`.
    pub fn process<S: KeyValueStore>(&mut self, store: &S, now: DateTime<Utc>) -> SaveReport {
        let mut report = SaveReport::default();
        let filenames: Vec<String> = self.entries.keys().cloned().collect();

        for filename in filenames {
            let Some(entry) = self.entries.get_mut(&filename) else {
                continue;
            };
            let content = if self.settings.auto_format {
                format_content(&filename, &entry.content)
            } else {
                entry.content.clone()
            };

            match store.set(&file_key(&filename), &content) {
                Ok(()) => {
                    let version = entry.version;
                    self.entries.remove(&filename);
                    self.push_history(&filename, version, content.clone(), now);
                    log::debug!("saved {} (version {})", filename, version);
                    report.saved.push(SavedFile {
                        filename,
                        version,
                        content,
                    });
                }
                Err(e) => {
                    entry.retry_count += 1;
                    if entry.retry_count >= self.settings.max_retries {
                        log::error!(
                            "giving up on {} after {} attempts: {}",
                            filename,
                            entry.retry_count,
                            e
                        );
                        self.entries.remove(&filename);
                        report.failed.push(FailedSave {
                            filename,
                            error: e.to_string(),
                        });
                    } else {
                        log::warn!(
                            "save of {} failed (attempt {}): {}",
                            filename,
                            entry.retry_count,
                            e
                        );
                        report.retrying.push(filename);
                    }
                }
            }
        }

        self.last_flush = Some(now);
        if self.entries.is_empty() {
            self.pending_since = None;
        } else {
            self.pending_since = Some(now);
        }
        report
    }

    fn push_history(&mut self, filename: &str, version: u64, content: String, now: DateTime<Utc>) {
        let limit = self.settings.history_limit.max(1);
        let history = self.history.entry(filename.to_string()).or_default();
        history.push_back(HistoryEntry {
            version,
            content,
            timestamp: now,
        });
        while history.len() > limit {
            history.pop_front();
        }
    }

    /// Resolve a recorded conflict and re-queue the chosen content.
    pub fn resolve_conflict(
        &mut self,
        filename: &str,
        resolution: Resolution,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let conflict = self
            .conflicts
            .remove(filename)
            .ok_or_else(|| LoftError::Api(format!("No conflict recorded for {}", filename)))?;

        let content = match resolution {
            Resolution::Local => conflict.local,
            Resolution::Remote => conflict.remote,
            Resolution::Merge => merge_lines(&conflict.local, &conflict.remote),
        };

        let mut timestamp = now.max(conflict.remote_timestamp);
        if let Some(existing) = self.entries.get(filename) {
            timestamp = timestamp.max(existing.timestamp);
        }
        Ok(self.put(filename, content, timestamp))
    }

    /// Saved versions of a file, oldest first.
    pub fn history(&self, filename: &str) -> Vec<HistoryEntry> {
        self.history
            .get(filename)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keep only the newest saved version of every file. Returns how many
    /// versions were dropped.
    pub fn trim_history(&mut self) -> usize {
        let mut dropped = 0;
        for versions in self.history.values_mut() {
            while versions.len() > 1 {
                versions.pop_front();
                dropped += 1;
            }
        }
        dropped
    }

    fn history_entry(&self, filename: &str, version: u64) -> Result<&HistoryEntry> {
        self.history
            .get(filename)
            .and_then(|h| h.iter().find(|e| e.version == version))
            .ok_or_else(|| {
                LoftError::Api(format!("Version {} of {} is not in history", version, filename))
            })
    }

    /// Re-queue a historical version (undo).
    pub fn restore(&mut self, filename: &str, version: u64, now: DateTime<Utc>) -> Result<QueueOutcome> {
        let content = self.history_entry(filename, version)?.content.clone();
        Ok(self.queue_save(filename, content, now))
    }

    /// Unified diff between two saved versions.
    pub fn diff(&self, filename: &str, from: u64, to: u64) -> Result<String> {
        let old = self.history_entry(filename, from)?;
        let new = self.history_entry(filename, to)?;
        let old_name = format!("{} (v{})", filename, from);
        let new_name = format!("{} (v{})", filename, to);
        Ok(TextDiff::from_lines(&old.content, &new.content)
            .unified_diff()
            .header(&old_name, &new_name)
            .to_string())
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SaveSession {
        SaveSession {
            version: SESSION_FORMAT_VERSION.to_string(),
            saved_at: now,
            version_counter: self.version_counter,
            entries: self.entries.clone(),
            conflicts: self.conflicts.clone(),
            history: self
                .history
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().cloned().collect()))
                .collect(),
        }
    }

    /// Adopt a previously saved session. Returns false if it was incompatible.
    pub fn restore_session(&mut self, session: SaveSession) -> bool {
        let major = |v: &str| v.split('.').next().unwrap_or("").to_string();
        if major(&session.version) != major(SESSION_FORMAT_VERSION) {
            log::warn!(
                "ignoring autosave session with format {} (expected {})",
                session.version,
                SESSION_FORMAT_VERSION
            );
            return false;
        }

        let max_entry_version = session.entries.values().map(|e| e.version).max();
        let max_history_version = session
            .history
            .values()
            .flat_map(|h| h.iter().map(|e| e.version))
            .max();
        self.version_counter = session
            .version_counter
            .max(max_entry_version.unwrap_or(0))
            .max(max_history_version.unwrap_or(0));

        self.pending_since = session.entries.values().map(|e| e.timestamp).min();
        self.last_change = session.entries.values().map(|e| e.timestamp).max();
        self.entries = session.entries;
        self.conflicts = session.conflicts;
        self.history = session
            .history
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect();
        true
    }

    pub fn save_session<S: KeyValueStore>(&self, store: &S, now: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_string(&self.snapshot(now))?;
        store.set(SESSION_KEY, &json)
    }

    /// Restore from `store`. Unreadable sessions are logged and skipped.
    pub fn load_session<S: KeyValueStore>(&mut self, store: &S) -> Result<bool> {
        let Some(raw) = store.get(SESSION_KEY)? else {
            return Ok(false);
        };
        match serde_json::from_str::<SaveSession>(&raw) {
            Ok(session) => Ok(self.restore_session(session)),
            Err(e) => {
                log::warn!("ignoring unreadable autosave session: {}", e);
                Ok(false)
            }
        }
    }
}

/// Positional line merge.
///
/// Lines equal at the same index are kept. Each run of differing positions becomes
/// one marker block. Insertions shift alignment and therefore show up as changes.
pub fn merge_lines(local: &str, remote: &str) -> String {
    let local_lines: Vec<&str> = local.lines().collect();
    let remote_lines: Vec<&str> = remote.lines().collect();
    let len = local_lines.len().max(remote_lines.len());

    let mut out: Vec<&str> = Vec::with_capacity(len);
    let mut ours: Vec<&str> = Vec::new();
    let mut theirs: Vec<&str> = Vec::new();

    fn flush<'a>(out: &mut Vec<&'a str>, ours: &mut Vec<&'a str>, theirs: &mut Vec<&'a str>) {
        if ours.is_empty() && theirs.is_empty() {
            return;
        }
        out.push(LOCAL_MARKER);
        out.append(ours);
        out.push(SEPARATOR_MARKER);
        out.append(theirs);
        out.push(REMOTE_MARKER);
    }

    for i in 0..len {
        let l = local_lines.get(i).copied();
        let r = remote_lines.get(i).copied();
        if l == r {
            flush(&mut out, &mut ours, &mut theirs);
            if let Some(line) = l {
                out.push(line);
            }
        } else {
            ours.extend(l);
            theirs.extend(r);
        }
    }
    flush(&mut out, &mut ours, &mut theirs);

    out.join("\n")
}
