use crate::api::LoftApi;
use crate::commands::LoftPaths;
use crate::config::LoftConfig;
use crate::store::memory::MemoryStore;
use chrono::{DateTime, Duration, TimeZone, Utc};

/// An API over an in-memory store with a hand-driven clock.
pub struct TestEnv {
    pub api: LoftApi<MemoryStore>,
    pub now: DateTime<Utc>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let now = Self::epoch();
        let api = LoftApi::open(MemoryStore::new(), Self::paths(), LoftConfig::default(), now)
            .expect("in-memory open cannot fail");
        Self { api, now }
    }

    /// Fixed starting instant for deterministic schedules.
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
            .single()
            .expect("valid date")
    }

    /// Paths for tests that never touch the config file.
    pub fn paths() -> LoftPaths {
        LoftPaths::new(std::env::temp_dir().join("codeloft-test-unused"))
    }

    pub fn advance(&mut self, by: Duration) -> DateTime<Utc> {
        self.now += by;
        self.now
    }
}
