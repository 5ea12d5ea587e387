use crate::commands::{load_workspace, CmdMessage, CmdResult};
use crate::error::Result;
use crate::model::Workspace;
use crate::recovery::deployment::{DeploymentMonitor, ProbeReport, ProbeStatus};
use crate::recovery::{ErrorCategory, ErrorMonitor, ErrorRecord, RecoveryOutcome, StoreEnv};
use crate::save_queue::SaveQueue;
use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub score: u8,
    pub probes: Vec<ProbeReport>,
    pub errors: BTreeMap<ErrorCategory, usize>,
    pub recent: Vec<ErrorRecord>,
}

/// Run the probes, log failing ones, then score.
pub fn run(
    monitor: &mut ErrorMonitor,
    probes: &DeploymentMonitor,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    monitor.sweep(now);
    let reports = probes.run();

    let mut result = CmdResult::default();
    for report in &reports {
        let message = match &report.status {
            ProbeStatus::Healthy => continue,
            ProbeStatus::Unhealthy(detail) => {
                format!("Health probe {} failed: {}", report.name, detail)
            }
            ProbeStatus::Timeout => format!("Health probe {} timed out", report.name),
        };
        let category = ErrorCategory::classify(&message, None);
        monitor.record(category, &message, None, now);
        result.add_message(CmdMessage::warning(message));
    }

    let health = HealthReport {
        score: monitor.health_score(now),
        probes: reports,
        errors: monitor.summary(),
        recent: monitor.log().records().cloned().collect(),
    };
    Ok(result.with_health(health))
}

/// Report an error from outside the library and attempt recovery.
///
/// `probes` decide whether the host is online for the network strategy.
#[allow(clippy::too_many_arguments)]
pub fn report<S: KeyValueStore>(
    store: &S,
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    monitor: &mut ErrorMonitor,
    probes: &DeploymentMonitor,
    message: &str,
    stack: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let mut env = StoreEnv::new(store).with_connectivity(probes);
    let outcome = monitor.report(message, stack, now, &mut env);
    let (reload, clear_caches) = (env.reload_requested, env.caches_cleared);

    let mut result = CmdResult::default();
    let text = format!("Classified as {} error", outcome.category);
    let message = match outcome.recovery {
        RecoveryOutcome::Recovered => CmdMessage::success(format!("{}, recovered", text)),
        RecoveryOutcome::Retry => CmdMessage::success(format!("{}, safe to retry", text)),
        RecoveryOutcome::Failed => CmdMessage::error(format!("{}, recovery failed", text)),
        RecoveryOutcome::NoStrategy => CmdMessage::warning(format!("{}, no recovery strategy", text)),
        RecoveryOutcome::Exhausted => {
            CmdMessage::error(format!("{}, recovery attempts exhausted", text))
        }
    };
    result.add_message(message);
    if outcome.attempt > 0 {
        result.add_message(CmdMessage::info(format!("Attempt {}", outcome.attempt)));
    }
    result
        .messages
        .extend(apply_requests(store, ws, queue, reload, clear_caches)?);
    Ok(result)
}

/// Carry out what a strategy asked of its [`StoreEnv`].
///
/// Clearing caches drops all but the newest saved version of every file. A
/// reload rebuilds the workspace from the store with pending writes on top.
pub(crate) fn apply_requests<S: KeyValueStore>(
    store: &S,
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    reload: bool,
    clear_caches: bool,
) -> Result<Vec<CmdMessage>> {
    let mut messages = Vec::new();
    if clear_caches {
        let dropped = queue.trim_history();
        log::info!("cleared {} cached versions", dropped);
        messages.push(CmdMessage::info(format!(
            "Cleared {} cached versions",
            dropped
        )));
    }
    if reload {
        *ws = load_workspace(store, queue)?;
        log::debug!("workspace reloaded after recovery");
        messages.push(CmdMessage::info("Reloaded the workspace"));
    }
    Ok(messages)
}
