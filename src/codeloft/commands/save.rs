use crate::commands::health::apply_requests;
use crate::commands::{CmdMessage, CmdResult};
use crate::error::Result;
use crate::model::Workspace;
use crate::recovery::{ErrorCategory, ErrorMonitor, StoreEnv};
use crate::save_queue::{FlushTrigger, SaveReport, SaveQueue};
use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};

/// Write every pending entry now.
pub fn flush<S: KeyValueStore>(
    store: &S,
    queue: &mut SaveQueue,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    if queue.is_empty() {
        let mut result = CmdResult::default();
        result.add_message(CmdMessage::info("Nothing to save."));
        return Ok(result);
    }
    let report = queue.process(store, now);
    Ok(summarize(report))
}

/// One scheduling decision: flush only if the debounce or interval has elapsed.
pub fn tick<S: KeyValueStore>(
    store: &S,
    queue: &mut SaveQueue,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    match queue.flush_due(now) {
        Some(trigger) => {
            log::debug!("autosave triggered by {:?}", trigger);
            let mut result = summarize(queue.process(store, now));
            let reason = match trigger {
                FlushTrigger::Debounce => "edits settled",
                FlushTrigger::Periodic => "autosave interval elapsed",
            };
            result.add_message(CmdMessage::info(format!("Flushed: {}", reason)));
            Ok(result)
        }
        None => Ok(CmdResult::default()),
    }
}

fn summarize(report: SaveReport) -> CmdResult {
    let mut result = CmdResult::default();
    for saved in &report.saved {
        result.add_message(CmdMessage::success(format!(
            "Saved {} (version {})",
            saved.filename, saved.version
        )));
    }
    for filename in &report.retrying {
        result.add_message(CmdMessage::warning(format!(
            "Save of {} failed, will retry",
            filename
        )));
    }
    for failed in &report.failed {
        result.add_message(CmdMessage::error(format!(
            "Giving up on {}: {}",
            failed.filename, failed.error
        )));
    }
    result.with_report(report)
}

/// Hand permanently failed saves to the monitor as storage errors.
///
/// Whatever the strategy asks for (a reload, cleared caches) is applied to `ws`
/// and `queue` before returning.
pub fn report_failures<S: KeyValueStore>(
    store: &S,
    ws: &mut Workspace,
    queue: &mut SaveQueue,
    monitor: &mut ErrorMonitor,
    report: &SaveReport,
    now: DateTime<Utc>,
) -> Result<Vec<CmdMessage>> {
    let mut messages = Vec::new();
    if report.failed.is_empty() {
        return Ok(messages);
    }

    let mut env = StoreEnv::new(store).without_sleep();
    for failed in &report.failed {
        let message = format!("Failed to save {}: {}", failed.filename, failed.error);
        let outcome = monitor.report_as(ErrorCategory::Storage, &message, None, now, &mut env);
        messages.push(CmdMessage::info(format!(
            "Recovery for {}: {:?}",
            failed.filename, outcome.recovery
        )));
    }
    let (reload, clear_caches) = (env.reload_requested, env.caches_cleared);
    messages.extend(apply_requests(store, ws, queue, reload, clear_caches)?);
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MessageLevel;
    use crate::save_queue::SaveSettings;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn queue() -> SaveQueue {
        SaveQueue::new(SaveSettings {
            auto_format: false,
            ..SaveSettings::default()
        })
    }

    #[test]
    fn tick_waits_for_debounce() {
        let store = MemoryStore::new();
        let mut queue = queue();
        queue.queue_save("a.txt", "one", t(0));

        let early = tick(&store, &mut queue, t(0) + Duration::milliseconds(500)).unwrap();
        assert!(early.report.is_none());

        let late = tick(&store, &mut queue, t(2)).unwrap();
        assert_eq!(late.report.unwrap().saved.len(), 1);
        assert_eq!(store.get("file:a.txt").unwrap().as_deref(), Some("one"));
    }

    #[test]
    fn flush_reports_nothing_to_do() {
        let store = MemoryStore::new();
        let result = flush(&store, &mut queue(), t(0)).unwrap();
        assert_eq!(result.messages[0].level, MessageLevel::Info);
    }

    #[test]
    fn permanent_failure_reaches_monitor() {
        let store = MemoryStore::new();
        store.set_simulate_write_error(true);
        let mut queue = queue();
        let mut ws = Workspace::new();
        let mut monitor = ErrorMonitor::new();
        queue.queue_save("a.txt", "one", t(0));

        flush(&store, &mut queue, t(1)).unwrap();
        flush(&store, &mut queue, t(2)).unwrap();
        let report = flush(&store, &mut queue, t(3)).unwrap().report.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(queue.is_empty());

        let messages =
            report_failures(&store, &mut ws, &mut queue, &mut monitor, &report, t(4)).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(monitor.log().len(), 1);
        assert_eq!(monitor.summary().get(&ErrorCategory::Storage), Some(&1));
    }
}
