use crate::chat::{ChatStore, CompletionOutcome, Role};
use crate::commands::{CmdMessage, CmdResult};
use crate::error::{LoftError, Result};
use crate::store::KeyValueStore;
use chrono::{DateTime, Utc};

/// Session id from an explicit id or prefix, falling back to the current session.
fn target<S: KeyValueStore>(store: &S, chat: &ChatStore, id: Option<&str>) -> Result<String> {
    match id {
        Some(id) => Ok(chat.resolve(id)?.id.clone()),
        None => chat.current_session_id(store)?.ok_or_else(|| {
            LoftError::Api("No current chat session. Start one with `codeloft chat new`.".into())
        }),
    }
}

fn session_result(chat: &ChatStore, id: &str) -> Result<CmdResult> {
    Ok(CmdResult::default().with_sessions(vec![chat.session(id)?.clone()]))
}

pub fn create<S: KeyValueStore>(
    store: &S,
    chat: &mut ChatStore,
    title: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let session = chat.create_session(store, title, now)?;
    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Started chat \"{}\" ({})",
        session.title,
        short_id(&session.id)
    )));
    Ok(result.with_sessions(vec![session]))
}

pub fn list(chat: &ChatStore) -> Result<CmdResult> {
    let sessions: Vec<_> = chat.list_sessions().into_iter().cloned().collect();
    let mut result = CmdResult::default().with_sessions(sessions);
    if result.sessions.is_empty() {
        result.add_message(CmdMessage::info("No chat sessions."));
    }
    Ok(result)
}

pub fn show<S: KeyValueStore>(store: &S, chat: &ChatStore, id: Option<&str>) -> Result<CmdResult> {
    let id = target(store, chat, id)?;
    session_result(chat, &id)
}

/// Switch the current session.
pub fn switch<S: KeyValueStore>(store: &S, chat: &ChatStore, id: &str) -> Result<CmdResult> {
    let id = chat.resolve(id)?.id.clone();
    chat.set_current(store, &id)?;
    let mut result = session_result(chat, &id)?;
    result.add_message(CmdMessage::success(format!(
        "Switched to chat {}",
        short_id(&id)
    )));
    Ok(result)
}

/// Append a user message. Starts a session when there is none.
pub fn say<S: KeyValueStore>(
    store: &S,
    chat: &mut ChatStore,
    id: Option<&str>,
    content: &str,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let id = match (id, chat.current_session_id(store)?) {
        (None, None) => chat.create_session(store, None, now)?.id,
        (id, _) => target(store, chat, id)?,
    };
    chat.add_message(store, &id, Role::User, content, now)?;
    session_result(chat, &id)
}

/// Record an assistant reply through the request-ordering guard.
pub fn reply<S: KeyValueStore>(
    store: &S,
    chat: &mut ChatStore,
    id: Option<&str>,
    content: &str,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let id = target(store, chat, id)?;
    let ticket = chat.begin_request(&id)?;
    match chat.complete_request(store, &ticket, content, now)? {
        CompletionOutcome::Applied { .. } => session_result(chat, &id),
        CompletionOutcome::Stale => {
            let mut result = CmdResult::default();
            result.add_message(CmdMessage::warning("Reply superseded by a newer request"));
            Ok(result)
        }
    }
}

pub fn rename<S: KeyValueStore>(
    store: &S,
    chat: &mut ChatStore,
    id: &str,
    title: &str,
    now: DateTime<Utc>,
) -> Result<CmdResult> {
    let id = chat.resolve(id)?.id.clone();
    chat.rename_session(store, &id, title, now)?;
    let mut result = session_result(chat, &id)?;
    result.add_message(CmdMessage::success(format!("Renamed chat to \"{}\"", title.trim())));
    Ok(result)
}

pub fn delete<S: KeyValueStore>(store: &S, chat: &mut ChatStore, id: &str) -> Result<CmdResult> {
    let id = chat.resolve(id)?.id.clone();
    let removed = chat.delete_session(store, &id)?;
    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Deleted chat \"{}\"",
        removed.title
    )));
    Ok(result)
}

pub fn clear<S: KeyValueStore>(store: &S, chat: &mut ChatStore) -> Result<CmdResult> {
    let count = chat.clear_all(store)?;
    let mut result = CmdResult::default();
    result.add_message(CmdMessage::success(format!(
        "Deleted {} chat session{}",
        count,
        if count == 1 { "" } else { "s" }
    )));
    Ok(result)
}

pub fn search(chat: &ChatStore, query: &str) -> Result<CmdResult> {
    let sessions: Vec<_> = chat.search(query).into_iter().cloned().collect();
    let mut result = CmdResult::default().with_sessions(sessions);
    if result.sessions.is_empty() {
        result.add_message(CmdMessage::info(format!("No chats match \"{}\"", query)));
    }
    Ok(result)
}

pub fn export<S: KeyValueStore>(store: &S, chat: &ChatStore, id: Option<&str>) -> Result<CmdResult> {
    let id = target(store, chat, id)?;
    Ok(CmdResult::default().with_transcript(chat.export_markdown(&id)?))
}

pub fn short_id(id: &str) -> &str {
    &id[..id.len().min(8)]
}
