//! Chat sessions persisted in the key-value store.
//!
//! All sessions live in one JSON array under `chat-ai-sessions`; the id of the
//! active session is kept under `current-chat-session`. Every mutation writes
//! through to the store.
//!
//! ## Request ordering
//!
//! An AI reply is attached through a [`RequestTicket`]. Only the newest ticket
//! issued for a session may complete; replies for older tickets are discarded as
//! [`CompletionOutcome::Stale`], so a slow early response never lands after a
//! newer one.

use crate::error::{LoftError, Result};
use crate::store::{KeyValueStore, CHAT_SESSIONS_KEY, CURRENT_CHAT_KEY, LEGACY_CHAT_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New chat";
pub const IMPORTED_TITLE: &str = "Imported chat";
const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .messages
                .iter()
                .any(|m| m.content.to_lowercase().contains(needle))
    }
}

/// Shape of entries in the old single-conversation history.
#[derive(Debug, Deserialize)]
struct LegacyMessage {
    #[serde(default = "legacy_role")]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
}

fn legacy_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    session_id: String,
    seq: u64,
}

impl RequestTicket {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Applied { message_id: String },
    Stale,
}

#[derive(Debug, Default)]
pub struct ChatStore {
    sessions: Vec<ChatSession>,
    next_seq: u64,
    latest: HashMap<String, u64>,
}

impl ChatStore {
    /// Load sessions, migrating a legacy `chat-ai-history` list if present.
    pub fn load<S: KeyValueStore>(store: &S, now: DateTime<Utc>) -> Result<Self> {
        let sessions = match store.get(CHAT_SESSIONS_KEY)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let mut chat = Self {
            sessions,
            ..Self::default()
        };
        chat.migrate_legacy(store, now)?;
        Ok(chat)
    }

    fn migrate_legacy<S: KeyValueStore>(&mut self, store: &S, now: DateTime<Utc>) -> Result<()> {
        let Some(raw) = store.get(LEGACY_CHAT_KEY)? else {
            return Ok(());
        };
        let legacy: Vec<LegacyMessage> = match serde_json::from_str(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("dropping unreadable legacy chat history: {}", e);
                store.delete(LEGACY_CHAT_KEY)?;
                return Ok(());
            }
        };

        if !legacy.is_empty() {
            let messages: Vec<ChatMessage> = legacy
                .into_iter()
                .map(|m| ChatMessage {
                    id: Uuid::new_v4().to_string(),
                    role: match m.role.as_str() {
                        "assistant" | "ai" => Role::Assistant,
                        "system" => Role::System,
                        _ => Role::User,
                    },
                    content: m.content,
                    timestamp: m.timestamp.as_ref().and_then(parse_legacy_time).unwrap_or(now),
                })
                .collect();
            let created = messages.first().map(|m| m.timestamp).unwrap_or(now);
            let updated = messages.last().map(|m| m.timestamp).unwrap_or(now);
            let id = Uuid::new_v4().to_string();
            log::info!("migrated {} legacy chat messages", messages.len());
            self.sessions.push(ChatSession {
                id: id.clone(),
                title: IMPORTED_TITLE.to_string(),
                created_at: created,
                updated_at: updated,
                messages,
            });
            self.save(store)?;
            if store.get(CURRENT_CHAT_KEY)?.is_none() {
                store.set(CURRENT_CHAT_KEY, &id)?;
            }
        }
        store.delete(LEGACY_CHAT_KEY)?;
        Ok(())
    }

    fn save<S: KeyValueStore>(&self, store: &S) -> Result<()> {
        store.set(CHAT_SESSIONS_KEY, &serde_json::to_string(&self.sessions)?)
    }

    fn session_mut(&mut self, id: &str) -> Result<&mut ChatSession> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| LoftError::SessionNotFound(id.to_string()))
    }

    pub fn session(&self, id: &str) -> Result<&ChatSession> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| LoftError::SessionNotFound(id.to_string()))
    }

    /// Find a session by full id or unique id prefix.
    pub fn resolve(&self, id_or_prefix: &str) -> Result<&ChatSession> {
        if let Ok(session) = self.session(id_or_prefix) {
            return Ok(session);
        }
        let mut matches = self.sessions.iter().filter(|s| s.id.starts_with(id_or_prefix));
        match (matches.next(), matches.next()) {
            (Some(only), None) if !id_or_prefix.is_empty() => Ok(only),
            _ => Err(LoftError::SessionNotFound(id_or_prefix.to_string())),
        }
    }

    /// Sessions, most recently updated first.
    pub fn list_sessions(&self) -> Vec<&ChatSession> {
        let mut sessions: Vec<&ChatSession> = self.sessions.iter().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    pub fn create_session<S: KeyValueStore>(
        &mut self,
        store: &S,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ChatSession> {
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            title: title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        self.sessions.push(session.clone());
        self.save(store)?;
        store.set(CURRENT_CHAT_KEY, &session.id)?;
        Ok(session)
    }

    pub fn rename_session<S: KeyValueStore>(
        &mut self,
        store: &S,
        id: &str,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let session = self.session_mut(id)?;
        session.title = title.trim().to_string();
        session.updated_at = now;
        self.save(store)
    }

    /// Delete a session. The current pointer moves to the most recent remaining one.
    pub fn delete_session<S: KeyValueStore>(&mut self, store: &S, id: &str) -> Result<ChatSession> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| LoftError::SessionNotFound(id.to_string()))?;
        let removed = self.sessions.remove(index);
        self.latest.remove(id);
        self.save(store)?;

        if store.get(CURRENT_CHAT_KEY)?.as_deref() == Some(id) {
            match self.list_sessions().first() {
                Some(next) => store.set(CURRENT_CHAT_KEY, &next.id)?,
                None => {
                    store.delete(CURRENT_CHAT_KEY)?;
                }
            }
        }
        Ok(removed)
    }

    pub fn clear_all<S: KeyValueStore>(&mut self, store: &S) -> Result<usize> {
        let count = self.sessions.len();
        self.sessions.clear();
        self.latest.clear();
        store.delete(CHAT_SESSIONS_KEY)?;
        store.delete(CURRENT_CHAT_KEY)?;
        Ok(count)
    }

    /// The current session id, if it still exists.
    pub fn current_session_id<S: KeyValueStore>(&self, store: &S) -> Result<Option<String>> {
        Ok(store
            .get(CURRENT_CHAT_KEY)?
            .filter(|id| self.sessions.iter().any(|s| &s.id == id)))
    }

    pub fn set_current<S: KeyValueStore>(&self, store: &S, id: &str) -> Result<()> {
        self.session(id)?;
        store.set(CURRENT_CHAT_KEY, id)
    }

    /// Append a message. An untitled session takes its title from the first user message.
    pub fn add_message<S: KeyValueStore>(
        &mut self,
        store: &S,
        session_id: &str,
        role: Role,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage> {
        let session = self.session_mut(session_id)?;
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: now,
        };

        let first_user_message = !session.messages.iter().any(|m| m.role == Role::User);
        if role == Role::User && first_user_message && session.title == DEFAULT_TITLE {
            session.title = title_from(content);
        }
        session.messages.push(message.clone());
        session.updated_at = now;
        self.save(store)?;
        Ok(message)
    }

    /// Sessions whose title or messages contain `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<&ChatSession> {
        let needle = query.to_lowercase();
        self.list_sessions()
            .into_iter()
            .filter(|s| s.matches(&needle))
            .collect()
    }

    pub fn export_markdown(&self, id: &str) -> Result<String> {
        let session = self.session(id)?;
        let mut out = format!(
            "# {}\n\n_Created {}_\n",
            session.title,
            session.created_at.format("%Y-%m-%d %H:%M UTC")
        );
        for message in &session.messages {
            out.push_str(&format!(
                "\n**{}** ({}):\n\n{}\n",
                message.role,
                message.timestamp.format("%H:%M"),
                message.content.trim_end()
            ));
        }
        Ok(out)
    }

    /// Register an outgoing AI request. Supersedes any earlier ticket for the session.
    pub fn begin_request(&mut self, session_id: &str) -> Result<RequestTicket> {
        self.session(session_id)?;
        self.next_seq += 1;
        self.latest.insert(session_id.to_string(), self.next_seq);
        Ok(RequestTicket {
            session_id: session_id.to_string(),
            seq: self.next_seq,
        })
    }

    /// Attach the reply for `ticket` unless a newer request has been issued since.
    pub fn complete_request<S: KeyValueStore>(
        &mut self,
        store: &S,
        ticket: &RequestTicket,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        if self.latest.get(&ticket.session_id) != Some(&ticket.seq) {
            log::debug!(
                "discarding stale reply {} for session {}",
                ticket.seq,
                ticket.session_id
            );
            return Ok(CompletionOutcome::Stale);
        }
        self.latest.remove(&ticket.session_id);
        let message = self.add_message(store, &ticket.session_id, Role::Assistant, content, now)?;
        Ok(CompletionOutcome::Applied {
            message_id: message.id,
        })
    }
}

fn title_from(content: &str) -> String {
    let first_line = content.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if first_line.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if first_line.chars().count() <= TITLE_MAX_CHARS {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}…", truncated.trim_end())
}

fn parse_legacy_time(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
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
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn setup() -> (MemoryStore, ChatStore) {
        let store = MemoryStore::new();
        let chat = ChatStore::load(&store, t(0)).unwrap();
        (store, chat)
    }

    #[test]
    fn first_user_message_titles_session() {
        let (store, mut chat) = setup();
        let session = chat.create_session(&store, None, t(0)).unwrap();
        chat.add_message(&store, &session.id, Role::System, "be brief", t(1))
            .unwrap();
        chat.add_message(&store, &session.id, Role::User, "\nHow do I center a div?\nthanks", t(2))
            .unwrap();
        chat.add_message(&store, &session.id, Role::User, "another", t(3))
            .unwrap();

        let session = chat.session(&session.id).unwrap();
        assert_eq!(session.title, "How do I center a div?");
        assert_eq!(session.updated_at, t(3));
    }

    #[test]
    fn long_titles_are_truncated() {
        let long = "a".repeat(80);
        let title = title_from(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn sessions_persist_and_list_newest_first() {
        let (store, mut chat) = setup();
        let a = chat.create_session(&store, Some("A"), t(0)).unwrap();
        let b = chat.create_session(&store, Some("B"), t(1)).unwrap();
        chat.add_message(&store, &a.id, Role::User, "bump", t(5)).unwrap();

        let reloaded = ChatStore::load(&store, t(6)).unwrap();
        let titles: Vec<&str> = reloaded
            .list_sessions()
            .iter()
            .map(|s| s.title.as_str())
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(
            reloaded.current_session_id(&store).unwrap().as_deref(),
            Some(b.id.as_str())
        );
    }

    #[test]
    fn deleting_current_moves_pointer() {
        let (store, mut chat) = setup();
        let a = chat.create_session(&store, Some("A"), t(0)).unwrap();
        let b = chat.create_session(&store, Some("B"), t(1)).unwrap();

        chat.delete_session(&store, &b.id).unwrap();
        assert_eq!(
            chat.current_session_id(&store).unwrap().as_deref(),
            Some(a.id.as_str())
        );

        chat.delete_session(&store, &a.id).unwrap();
        assert_eq!(chat.current_session_id(&store).unwrap(), None);
        assert!(matches!(
            chat.delete_session(&store, &a.id),
            Err(LoftError::SessionNotFound(_))
        ));
    }

    #[test]
    fn search_is_case_insensitive() {
        let (store, mut chat) = setup();
        let a = chat.create_session(&store, Some("Rust questions"), t(0)).unwrap();
        let b = chat.create_session(&store, Some("Other"), t(1)).unwrap();
        chat.add_message(&store, &b.id, Role::User, "What about TOKIO?", t(2))
            .unwrap();

        assert_eq!(chat.search("rust")[0].id, a.id);
        assert_eq!(chat.search("tokio")[0].id, b.id);
        assert!(chat.search("python").is_empty());
    }

    #[test]
    fn stale_replies_are_discarded() {
        let (store, mut chat) = setup();
        let session = chat.create_session(&store, None, t(0)).unwrap();

        let first = chat.begin_request(&session.id).unwrap();
        let second = chat.begin_request(&session.id).unwrap();

        let newer = chat
            .complete_request(&store, &second, "newer answer", t(2))
            .unwrap();
        assert!(matches!(newer, CompletionOutcome::Applied { .. }));

        let older = chat
            .complete_request(&store, &first, "older answer", t(3))
            .unwrap();
        assert_eq!(older, CompletionOutcome::Stale);

        let messages = &chat.session(&session.id).unwrap().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "newer answer");
        assert_eq!(messages[0].role, Role::Assistant);
    }

    #[test]
    fn legacy_history_migrates_once() {
        let store = MemoryStore::new();
        store
            .set(
                LEGACY_CHAT_KEY,
                r#"[{"role":"user","content":"hi","timestamp":1700000000000},{"role":"assistant","content":"hello"}]"#,
            )
            .unwrap();

        let chat = ChatStore::load(&store, t(0)).unwrap();
        let sessions = chat.list_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, IMPORTED_TITLE);
        assert_eq!(sessions[0].messages.len(), 2);
        assert_eq!(sessions[0].messages[1].role, Role::Assistant);
        assert_eq!(store.get(LEGACY_CHAT_KEY).unwrap(), None);

        let again = ChatStore::load(&store, t(1)).unwrap();
        assert_eq!(again.list_sessions().len(), 1);
    }

    #[test]
    fn export_and_resolve_by_prefix() {
        let (store, mut chat) = setup();
        let session = chat.create_session(&store, Some("Notes"), t(0)).unwrap();
        chat.add_message(&store, &session.id, Role::User, "hello", t(60))
            .unwrap();

        let md = chat.export_markdown(&session.id).unwrap();
        assert!(md.starts_with("# Notes\n"));
        assert!(md.contains("**User**"));
        assert!(md.contains("hello"));

        assert_eq!(chat.resolve(&session.id[..8]).unwrap().id, session.id);
        assert!(chat.resolve("").is_err());
    }

    #[test]
    fn clear_all_removes_everything() {
        let (store, mut chat) = setup();
        chat.create_session(&store, None, t(0)).unwrap();
        assert_eq!(chat.clear_all(&store).unwrap(), 1);
        assert!(store.is_empty());
    }
}
