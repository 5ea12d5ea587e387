use chrono::{DateTime, Duration, TimeZone, Utc};
use codeloft::api::LoftApi;
use codeloft::commands::LoftPaths;
use codeloft::config::LoftConfig;
use codeloft::save_queue::Resolution;
use codeloft::store::fs::FileStore;
use codeloft::store::KeyValueStore;
use std::path::Path;
use tempfile::TempDir;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn open(dir: &Path, now: DateTime<Utc>) -> LoftApi<FileStore> {
    LoftApi::open(
        FileStore::new(dir),
        LoftPaths::new(dir),
        LoftConfig::default(),
        now,
    )
    .unwrap()
}

#[test]
fn test_saved_files_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".codeloft");
    let now = start();

    let mut api = open(&dir, now);
    api.init().unwrap();
    api.write_file("data.json", "{\"a\":1}", now).unwrap();
    let closed = api.close(now + Duration::seconds(1)).unwrap();
    assert_eq!(closed.report.unwrap().saved.len(), 1);

    let api = open(&dir, now + Duration::seconds(2));
    assert!(api.workspace().contains("README.md"));
    // Saved through the formatter.
    assert_eq!(
        api.workspace().content("data.json"),
        Some("{\n  \"a\": 1\n}\n")
    );
    assert_eq!(api.history("data.json").unwrap().history.len(), 1);
}

#[test]
fn test_pending_writes_and_conflicts_survive_persist() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".codeloft");
    let now = start();

    let mut api = open(&dir, now);
    api.write_file("a.txt", "newer", now + Duration::seconds(10)).unwrap();
    let result = api.write_file("a.txt", "older", now).unwrap();
    assert!(result.messages[0].content.contains("Conflict on a.txt"));
    api.persist(now).unwrap();
    drop(api);

    let store = FileStore::new(&dir);
    assert_eq!(store.get("file:a.txt").unwrap(), None);

    let mut api = open(&dir, now + Duration::seconds(20));
    assert_eq!(api.workspace().content("a.txt"), Some("newer"));
    assert_eq!(api.conflicts().unwrap().conflicts.len(), 1);

    api.resolve_conflict("a.txt", Resolution::Local, now + Duration::seconds(20))
        .unwrap();
    api.close(now + Duration::seconds(21)).unwrap();

    assert_eq!(
        FileStore::new(&dir).get("file:a.txt").unwrap().as_deref(),
        Some("older\n")
    );
}

#[test]
fn test_tick_respects_debounce() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".codeloft");
    let now = start();

    let mut api = open(&dir, now);
    api.write_file("notes.txt", "draft", now).unwrap();

    let early = api.tick(now + Duration::milliseconds(200)).unwrap();
    assert!(early.report.is_none());
    assert_eq!(FileStore::new(&dir).get("file:notes.txt").unwrap(), None);

    let late = api.tick(now + Duration::seconds(2)).unwrap();
    assert_eq!(late.report.unwrap().saved.len(), 1);
    assert_eq!(
        FileStore::new(&dir).get("file:notes.txt").unwrap().as_deref(),
        Some("draft\n")
    );
}

#[test]
fn test_chat_sessions_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".codeloft");
    let now = start();

    let mut api = open(&dir, now);
    api.chat_say(None, "Add a login form", now).unwrap();
    api.chat_reply(None, "Sure, here it is.", false, now + Duration::seconds(1))
        .unwrap();
    api.persist(now).unwrap();

    let api = open(&dir, now + Duration::seconds(5));
    let listed = api.chat_list().unwrap();
    assert_eq!(listed.sessions.len(), 1);
    assert_eq!(listed.sessions[0].title, "Add a login form");
    assert_eq!(listed.sessions[0].messages.len(), 2);
    assert_eq!(api.current_chat().unwrap(), Some(listed.sessions[0].id.clone()));
}
