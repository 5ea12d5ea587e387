//! # Error Recovery
//!
//! Best-effort monitoring of runtime errors, modelled as plain data plus a
//! lookup table of remedies.
//!
//! ```text
//! report(message, stack)
//!   └─ classify ─> ErrorCategory ─> ErrorLog (ring buffer, 50 records)
//!                     └─ strategy_for(category) ─> RecoveryOutcome
//! ```
//!
//! - Each `(category, message)` pair gets at most [`MAX_ATTEMPTS`] recovery
//!   attempts. The attempt counters are cleared every 10 minutes by [`ErrorMonitor::sweep`].
//! - The log keeps the last 5 minutes only (pruned every 5 minutes).
//! - [`ErrorMonitor::health_score`] is derived on demand and never stored.
//!
//! Nothing here guarantees recovery. Strategies act through a [`RecoveryEnv`], so
//! the host decides what "reload" or "clear caches" means.

pub mod deployment;
pub mod strategies;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

pub use strategies::{strategy_for, RecoveryEnv, RecoveryOutcome, StoreEnv};

pub const LOG_CAPACITY: usize = 50;
pub const MAX_ATTEMPTS: u32 = 3;

fn log_window() -> Duration {
    Duration::minutes(5)
}

fn attempts_window() -> Duration {
    Duration::minutes(10)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Network,
    Storage,
    Memory,
    Hydration,
    Api,
    React,
    Promise,
    General,
}

/// Substring rules, checked in order. The first category with a hit wins.
const RULES: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Network,
        &[
            "network", "fetch", "connection", "timed out", "timeout", "econnrefused",
            "econnreset", "offline", "cors", "dns",
        ],
    ),
    (
        ErrorCategory::Storage,
        &[
            "storage", "store error", "quota", "disk full", "no space", "write error",
            "read-only file system",
        ],
    ),
    (
        ErrorCategory::Memory,
        &["out of memory", "memory", "heap", "allocation", "maximum call stack"],
    ),
    (
        ErrorCategory::Hydration,
        &["hydration", "hydrate", "did not match", "server rendered"],
    ),
    (
        ErrorCategory::Api,
        &["api error", "/api/", "status code", "rate limit", "429", "500", "502", "503", "unauthorized"],
    ),
    (
        ErrorCategory::React,
        &["react", "component", "render", "invalid hook call"],
    ),
    (
        ErrorCategory::Promise,
        &["promise", "unhandled rejection", "unhandledrejection"],
    ),
];

impl ErrorCategory {
    pub fn classify(message: &str, stack: Option<&str>) -> Self {
        let haystack = match stack {
            Some(stack) => format!("{}\n{}", message, stack).to_lowercase(),
            None => message.to_lowercase(),
        };
        RULES
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| haystack.contains(n)))
            .map(|(category, _)| *category)
            .unwrap_or(ErrorCategory::General)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Memory => "memory",
            ErrorCategory::Hydration => "hydration",
            ErrorCategory::Api => "api",
            ErrorCategory::React => "react",
            ErrorCategory::Promise => "promise",
            ErrorCategory::General => "general",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub message: String,
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Bounded, time-windowed record of recent errors.
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: VecDeque<ErrorRecord>,
}

impl ErrorLog {
    pub fn push(&mut self, record: ErrorRecord) {
        if self.records.len() == LOG_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Drop records older than the 5-minute window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - log_window();
        self.records.retain(|r| r.timestamp > cutoff);
    }

    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.records.iter().filter(|r| r.timestamp > since).count()
    }

    pub fn records(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutcome {
    pub category: ErrorCategory,
    /// Recovery attempt number for this error, 0 when attempts are exhausted.
    pub attempt: u32,
    pub recovery: RecoveryOutcome,
}

#[derive(Debug, Default)]
pub struct ErrorMonitor {
    log: ErrorLog,
    attempts: HashMap<(ErrorCategory, String), u32>,
    recovered: HashSet<(ErrorCategory, String)>,
    last_prune: Option<DateTime<Utc>>,
    last_reset: Option<DateTime<Utc>>,
}

impl ErrorMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    /// Adopt records logged by an earlier process, dropping those outside the window.
    pub fn restore_records(&mut self, records: Vec<ErrorRecord>, now: DateTime<Utc>) {
        for record in records {
            self.log.push(record);
        }
        self.log.prune(now);
    }

    /// Classify and log an error, then attempt recovery.
    pub fn report(
        &mut self,
        message: &str,
        stack: Option<&str>,
        now: DateTime<Utc>,
        env: &mut dyn RecoveryEnv,
    ) -> ReportOutcome {
        let category = ErrorCategory::classify(message, stack);
        self.report_as(category, message, stack, now, env)
    }

    /// Like [`report`](Self::report) with a category the caller already knows.
    pub fn report_as(
        &mut self,
        category: ErrorCategory,
        message: &str,
        stack: Option<&str>,
        now: DateTime<Utc>,
        env: &mut dyn RecoveryEnv,
    ) -> ReportOutcome {
        self.record(category, message, stack, now);

        let key = (category, message.to_string());
        let attempts = self.attempts.entry(key.clone()).or_insert(0);
        if *attempts >= MAX_ATTEMPTS {
            log::warn!("recovery for {} error exhausted: {}", category, message);
            return ReportOutcome {
                category,
                attempt: 0,
                recovery: RecoveryOutcome::Exhausted,
            };
        }
        *attempts += 1;
        let attempt = *attempts;

        let recovery = match strategy_for(category) {
            Some(strategy) => strategy(env, now),
            None => RecoveryOutcome::NoStrategy,
        };
        log::info!(
            "recovery attempt {} for {} error: {:?}",
            attempt,
            category,
            recovery
        );
        if recovery.is_success() {
            self.recovered.insert(key);
        }

        ReportOutcome {
            category,
            attempt,
            recovery,
        }
    }

    /// Log an error without attempting recovery.
    pub fn record(
        &mut self,
        category: ErrorCategory,
        message: &str,
        stack: Option<&str>,
        now: DateTime<Utc>,
    ) {
        self.sweep(now);
        log::error!("[{}] {}", category, message);
        self.log.push(ErrorRecord {
            category,
            message: message.to_string(),
            stack: stack.map(str::to_string),
            timestamp: now,
        });
    }

    /// Periodic maintenance: prune the log every 5 minutes, reset attempt
    /// counters every 10 minutes.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        match self.last_prune {
            Some(at) if now - at < log_window() => {}
            Some(_) => {
                self.log.prune(now);
                self.last_prune = Some(now);
            }
            None => self.last_prune = Some(now),
        }
        match self.last_reset {
            Some(at) if now - at < attempts_window() => {}
            Some(_) => {
                self.attempts.clear();
                self.last_reset = Some(now);
            }
            None => self.last_reset = Some(now),
        }
    }

    /// 100, minus 5 per error in the last hour (at most 50), plus 1 per distinct
    /// recovered error (at most 20), clamped to 0..=100.
    pub fn health_score(&self, now: DateTime<Utc>) -> u8 {
        let recent = self.log.count_since(now - Duration::hours(1)) as i64;
        let penalty = (recent * 5).min(50);
        let bonus = (self.recovered.len() as i64).min(20);
        (100 - penalty + bonus).clamp(0, 100) as u8
    }

    /// Error counts per category in the current log.
    pub fn summary(&self) -> BTreeMap<ErrorCategory, usize> {
        let mut counts = BTreeMap::new();
        for record in self.log.records() {
            *counts.entry(record.category).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.attempts.clear();
        self.recovered.clear();
    }
}

/// Forward panics into `monitor`, then run the previously installed hook.
pub fn install_panic_hook(monitor: Arc<Mutex<ErrorMonitor>>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        let location = info
            .location()
            .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column()));

        // try_lock: the panic may have happened while the monitor was held.
        if let Ok(mut monitor) = monitor.try_lock() {
            let category = ErrorCategory::classify(&message, location.as_deref());
            monitor.record(category, &message, location.as_deref(), Utc::now());
        }
        previous(info);
    }));
}
