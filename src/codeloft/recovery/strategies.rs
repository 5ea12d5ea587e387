//! The fixed table of recovery strategies.
//!
//! | Category | Strategy | Result |
//! |---|---|---|
//! | network | wait 2s | `Retry` if online, else `Failed` |
//! | storage | purge values with a `timestamp` older than 7 days | `Recovered` |
//! | memory | clear caches (older saved versions) | `Recovered` |
//! | hydration | wait 1s, reload | `Recovered` |
//! | api | wait 1s | `Retry` |
//! | react | reload | `Recovered` |
//! | promise | log only | `Recovered` |
//! | general | none | |

use super::deployment::{all_healthy, DeploymentMonitor};
use super::ErrorCategory;
use crate::store::{KeyValueStore, FILE_PREFIX};
use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered,
    /// The operation may be retried by the caller.
    Retry,
    Failed,
    NoStrategy,
    /// The per-error attempt budget is used up.
    Exhausted,
}

impl RecoveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RecoveryOutcome::Recovered | RecoveryOutcome::Retry)
    }
}

/// What a strategy is allowed to do to its host.
pub trait RecoveryEnv {
    fn is_online(&self) -> bool;
    fn wait(&mut self, duration: StdDuration);
    fn reload(&mut self);
    fn clear_caches(&mut self);
    /// Remove stale entries last touched before `cutoff`. Returns how many.
    fn purge_stale(&mut self, cutoff: DateTime<Utc>) -> usize;
}

pub type Strategy = fn(&mut dyn RecoveryEnv, DateTime<Utc>) -> RecoveryOutcome;

pub fn strategy_for(category: ErrorCategory) -> Option<Strategy> {
    match category {
        ErrorCategory::Network => Some(network),
        ErrorCategory::Storage => Some(storage),
        ErrorCategory::Memory => Some(memory),
        ErrorCategory::Hydration => Some(hydration),
        ErrorCategory::Api => Some(api),
        ErrorCategory::React => Some(react),
        ErrorCategory::Promise => Some(promise),
        ErrorCategory::General => None,
    }
}

fn network(env: &mut dyn RecoveryEnv, _now: DateTime<Utc>) -> RecoveryOutcome {
    env.wait(StdDuration::from_secs(2));
    if env.is_online() {
        RecoveryOutcome::Retry
    } else {
        RecoveryOutcome::Failed
    }
}

fn storage(env: &mut dyn RecoveryEnv, now: DateTime<Utc>) -> RecoveryOutcome {
    let purged = env.purge_stale(now - Duration::days(7));
    log::info!("purged {} stale entries", purged);
    RecoveryOutcome::Recovered
}

fn memory(env: &mut dyn RecoveryEnv, _now: DateTime<Utc>) -> RecoveryOutcome {
    env.clear_caches();
    RecoveryOutcome::Recovered
}

fn hydration(env: &mut dyn RecoveryEnv, _now: DateTime<Utc>) -> RecoveryOutcome {
    env.wait(StdDuration::from_secs(1));
    env.reload();
    RecoveryOutcome::Recovered
}

fn api(env: &mut dyn RecoveryEnv, _now: DateTime<Utc>) -> RecoveryOutcome {
    env.wait(StdDuration::from_secs(1));
    RecoveryOutcome::Retry
}

fn react(env: &mut dyn RecoveryEnv, _now: DateTime<Utc>) -> RecoveryOutcome {
    env.reload();
    RecoveryOutcome::Recovered
}

fn promise(_env: &mut dyn RecoveryEnv, _now: DateTime<Utc>) -> RecoveryOutcome {
    log::info!("unhandled rejection logged, nothing to undo");
    RecoveryOutcome::Recovered
}

/// [`RecoveryEnv`] backed by a key-value store.
///
/// `reload` and `clear_caches` only raise flags; the owner of the workspace acts
/// on them after the strategy returns. Connectivity is whatever the attached
/// health checks say; with none attached the host counts as online.
pub struct StoreEnv<'a, S: KeyValueStore> {
    store: &'a S,
    connectivity: Option<&'a DeploymentMonitor>,
    sleep: bool,
    pub reload_requested: bool,
    pub caches_cleared: bool,
}

impl<'a, S: KeyValueStore> StoreEnv<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            connectivity: None,
            sleep: true,
            reload_requested: false,
            caches_cleared: false,
        }
    }

    /// Decide `is_online` by running these health checks.
    pub fn with_connectivity(mut self, checks: &'a DeploymentMonitor) -> Self {
        self.connectivity = Some(checks);
        self
    }

    /// Skip real sleeping in `wait`.
    pub fn without_sleep(mut self) -> Self {
        self.sleep = false;
        self
    }
}

impl<S: KeyValueStore> RecoveryEnv for StoreEnv<'_, S> {
    fn is_online(&self) -> bool {
        match self.connectivity {
            Some(checks) => all_healthy(&checks.run()),
            None => true,
        }
    }

    fn wait(&mut self, duration: StdDuration) {
        if self.sleep {
            std::thread::sleep(duration);
        }
    }

    fn reload(&mut self) {
        self.reload_requested = true;
    }

    fn clear_caches(&mut self) {
        self.caches_cleared = true;
    }

    fn purge_stale(&mut self, cutoff: DateTime<Utc>) -> usize {
        let keys = match self.store.list("") {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("cannot list store for purge: {}", e);
                return 0;
            }
        };
        let mut purged = 0;
        for key in keys.iter().filter(|k| !k.starts_with(FILE_PREFIX)) {
            let Ok(Some(raw)) = self.store.get(key) else {
                continue;
            };
            let Some(stamp) = entry_timestamp(&raw) else {
                continue;
            };
            if stamp < cutoff && matches!(self.store.delete(key), Ok(true)) {
                purged += 1;
            }
        }
        purged
    }
}

/// `timestamp` field of a JSON object: epoch milliseconds or RFC 3339.
fn entry_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    match value.get("timestamp")? {
        serde_json::Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoftError, Result};
    use crate::recovery::deployment::HealthProbe;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    struct Unreachable;

    impl HealthProbe for Unreachable {
        fn name(&self) -> &str {
            "upstream"
        }
        fn check(&self) -> Result<()> {
            Err(LoftError::Api("connection refused".into()))
        }
    }

    struct Reachable;

    impl HealthProbe for Reachable {
        fn name(&self) -> &str {
            "upstream"
        }
        fn check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_category_but_general_has_a_strategy() {
        for category in [
            ErrorCategory::Network,
            ErrorCategory::Storage,
            ErrorCategory::Memory,
            ErrorCategory::Hydration,
            ErrorCategory::Api,
            ErrorCategory::React,
            ErrorCategory::Promise,
        ] {
            assert!(strategy_for(category).is_some(), "{}", category);
        }
        assert!(strategy_for(ErrorCategory::General).is_none());
    }

    #[test]
    fn network_fails_when_health_checks_fail() {
        let store = MemoryStore::new();
        let checks = DeploymentMonitor::default().with_probe(Unreachable);
        let mut env = StoreEnv::new(&store)
            .with_connectivity(&checks)
            .without_sleep();
        let strategy = strategy_for(ErrorCategory::Network).unwrap();
        assert_eq!(strategy(&mut env, Utc::now()), RecoveryOutcome::Failed);
    }

    #[test]
    fn network_retries_when_health_checks_pass() {
        let store = MemoryStore::new();
        let checks = DeploymentMonitor::default().with_probe(Reachable);
        let mut env = StoreEnv::new(&store)
            .with_connectivity(&checks)
            .without_sleep();
        assert!(env.is_online());
        let strategy = strategy_for(ErrorCategory::Network).unwrap();
        assert_eq!(strategy(&mut env, Utc::now()), RecoveryOutcome::Retry);
    }

    #[test]
    fn hydration_and_memory_raise_flags() {
        let store = MemoryStore::new();
        let mut env = StoreEnv::new(&store).without_sleep();
        strategy_for(ErrorCategory::Hydration).unwrap()(&mut env, Utc::now());
        strategy_for(ErrorCategory::Memory).unwrap()(&mut env, Utc::now());
        assert!(env.reload_requested);
        assert!(env.caches_cleared);
    }

    #[test]
    fn storage_purges_week_old_entries_only() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap();
        let old = now - Duration::days(8);
        let fresh = now - Duration::days(1);

        let store = MemoryStore::new();
        store
            .set("draft-1", &format!(r#"{{"timestamp": {}}}"#, old.timestamp_millis()))
            .unwrap();
        store
            .set("draft-2", &format!(r#"{{"timestamp": "{}"}}"#, fresh.to_rfc3339()))
            .unwrap();
        store.set("notes", "plain text").unwrap();
        store
            .set("file:old.json", &format!(r#"{{"timestamp": {}}}"#, old.timestamp_millis()))
            .unwrap();

        let mut env = StoreEnv::new(&store);
        let outcome = strategy_for(ErrorCategory::Storage).unwrap()(&mut env, now);

        assert_eq!(outcome, RecoveryOutcome::Recovered);
        assert_eq!(
            store.list("").unwrap(),
            vec!["draft-2", "file:old.json", "notes"]
        );
    }
}
