//! Session identity and conversation persistence
//!
//! The session id lives in a long-lived store; the conversation it scopes
//! lives in a session store under a key derived from that id.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::conversation::Conversation;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_ID_KEY: &str = "docs-chat:session-id";
const CONVERSATION_KEY_PREFIX: &str = "docs-chat:conversation:";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to serialize conversation: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String key-value storage capability
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

/// Process-lifetime store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Prefer the explicit id, then the stored one, then a fresh one
pub fn resolve_session_id(explicit: Option<&str>, durable: &dyn KeyValueStore) -> String {
    if let Some(id) = explicit.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    match durable.get(SESSION_ID_KEY) {
        Ok(Some(id)) if !id.trim().is_empty() => return id,
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read stored session id"),
    }

    let id = new_session_id();
    if let Err(e) = durable.set(SESSION_ID_KEY, &id) {
        tracing::warn!(error = %e, "Failed to store session id");
    }
    id
}

/// Owns the session id and the persisted conversation it scopes
pub struct SessionManager {
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    session_id: String,
}

impl SessionManager {
    pub fn new(
        durable: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        explicit_id: Option<&str>,
    ) -> Self {
        let session_id = resolve_session_id(explicit_id, durable.as_ref());
        tracing::info!(session_id = %session_id, "Session resolved");
        Self {
            durable,
            session,
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn conversation_key(&self) -> String {
        format!("{CONVERSATION_KEY_PREFIX}{}", self.session_id)
    }

    pub fn persist(&self, conversation: &Conversation) -> StorageResult<()> {
        let json = conversation.to_json()?;
        self.session.set(&self.conversation_key(), &json)
    }

    /// Load the stored conversation. Absent or unreadable data yields an
    /// empty one.
    pub fn restore(&self) -> Conversation {
        let raw = match self.session.get(&self.conversation_key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Conversation::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored conversation");
                return Conversation::new();
            }
        };

        match Conversation::from_json(&raw) {
            Ok(conversation) => {
                tracing::debug!(messages = conversation.len(), "Conversation restored");
                conversation
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding corrupt stored conversation");
                Conversation::new()
            }
        }
    }

    /// Forget the current conversation and start a new session
    pub fn reset(&mut self) -> StorageResult<&str> {
        self.session.remove(&self.conversation_key())?;
        self.durable.remove(SESSION_ID_KEY)?;

        let id = new_session_id();
        self.durable.set(SESSION_ID_KEY, &id)?;
        tracing::info!(old = %self.session_id, new = %id, "Session reset");
        self.session_id = id;
        Ok(&self.session_id)
    }
}
