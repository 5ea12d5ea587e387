//! Liveness probes with a per-probe timeout.
//!
//! Each probe runs on its own thread; a probe that has not answered when the
//! timeout expires is reported as [`ProbeStatus::Timeout`] and left to finish in
//! the background.

use crate::error::{LoftError, Result};
use crate::store::KeyValueStore;
use serde::Serialize;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const SENTINEL_KEY: &str = "__codeloft_health__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy(String),
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub name: String,
    pub status: ProbeStatus,
    pub elapsed_ms: u128,
}

pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> Result<()>;
}

/// Writes, reads back and deletes a sentinel key.
pub struct StoreProbe<S> {
    store: S,
}

impl<S> StoreProbe<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore + Send + Sync> HealthProbe for StoreProbe<S> {
    fn name(&self) -> &str {
        "store"
    }

    fn check(&self) -> Result<()> {
        let token = uuid::Uuid::new_v4().to_string();
        self.store.set(SENTINEL_KEY, &token)?;
        let read = self.store.get(SENTINEL_KEY)?;
        self.store.delete(SENTINEL_KEY)?;
        if read.as_deref() != Some(token.as_str()) {
            return Err(LoftError::Store("sentinel value did not round-trip".to_string()));
        }
        Ok(())
    }
}

pub struct DeploymentMonitor {
    probes: Vec<Arc<dyn HealthProbe>>,
    timeout: Duration,
}

impl Default for DeploymentMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl DeploymentMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            probes: Vec::new(),
            timeout,
        }
    }

    pub fn with_probe(mut self, probe: impl HealthProbe + 'static) -> Self {
        self.probes.push(Arc::new(probe));
        self
    }

    pub fn run(&self) -> Vec<ProbeReport> {
        self.probes.iter().map(|p| self.run_probe(p)).collect()
    }

    fn run_probe(&self, probe: &Arc<dyn HealthProbe>) -> ProbeReport {
        let started = Instant::now();
        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(probe);
        thread::spawn(move || {
            let status = match worker.check() {
                Ok(()) => ProbeStatus::Healthy,
                Err(e) => ProbeStatus::Unhealthy(e.to_string()),
            };
            // The receiver is gone if we already timed out.
            let _ = tx.send(status);
        });

        let status = rx.recv_timeout(self.timeout).unwrap_or_else(|_| {
            log::warn!("probe {} did not answer within {:?}", probe.name(), self.timeout);
            ProbeStatus::Timeout
        });
        ProbeReport {
            name: probe.name().to_string(),
            status,
            elapsed_ms: started.elapsed().as_millis(),
        }
    }
}

pub fn all_healthy(reports: &[ProbeReport]) -> bool {
    reports.iter().all(|r| r.status == ProbeStatus::Healthy)
}
