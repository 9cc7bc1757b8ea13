//! Conversation store
//!
//! The ordered message log the widget renders, plus its persisted JSON form.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Message identifier, assigned in increasing order within a conversation
pub type MessageId = u64;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Reference from an answer back into the documentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(alias = "chunk_id")]
    pub id: String,
    pub chapter: String,
    pub section: String,
    /// Document path, optionally with an anchor (`/chapters/02-kinematics#inverse`)
    #[serde(alias = "url")]
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Citation {
    /// Parse a citation event payload
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Label shown on the citation badge
    pub fn display_text(&self) -> &str {
        match &self.text {
            Some(text) if !text.trim().is_empty() => text,
            _ if !self.section.is_empty() => &self.section,
            _ => &self.chapter,
        }
    }

    /// Split the locator into page path and anchor fragment
    pub fn anchor(&self) -> (&str, Option<&str>) {
        match self.locator.split_once('#') {
            Some((path, fragment)) if !fragment.is_empty() => (path, Some(fragment)),
            Some((path, _)) => (path, None),
            None => (self.locator.as_str(), None),
        }
    }

    /// Resolve the locator against the documentation site's base URL
    pub fn resolve(&self, base: &Url) -> Option<Url> {
        base.join(&self.locator).ok()
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Selected document text the question was asked about (user messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Still receiving tokens. Never persisted.
    #[serde(skip)]
    pub streaming: bool,
}

impl Message {
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Largest id accepted from storage; the largest integer every JSON reader
/// represents exactly, leaving room to keep counting after a restore
pub const MAX_STORED_ID: MessageId = (1 << 53) - 1;

/// Ordered log of messages for one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
    /// Highest id handed out, so removed ids are never reused
    last_id: MessageId,
}

#[derive(Serialize)]
struct PersistedView<'a> {
    messages: Vec<&'a Message>,
}

#[derive(Deserialize)]
struct Persisted {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// The assistant message currently receiving tokens, if any
    pub fn in_flight(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.streaming)
    }

    fn next_id(&mut self) -> MessageId {
        self.last_id += 1;
        self.last_id
    }

    /// Append a finished user message
    pub fn push_user(
        &mut self,
        text: impl Into<String>,
        context: Option<String>,
        at: DateTime<Utc>,
    ) -> MessageId {
        let id = self.next_id();
        self.messages.push(Message {
            id,
            role: Role::User,
            content: text.into(),
            created_at: at,
            citations: Vec::new(),
            context,
            streaming: false,
        });
        id
    }

    /// Append an empty assistant message flagged as streaming.
    ///
    /// Any message still flagged as streaming is finalized first so that at
    /// most one in-flight message exists.
    pub fn push_placeholder(&mut self, at: DateTime<Utc>) -> MessageId {
        for message in &mut self.messages {
            message.streaming = false;
        }
        let id = self.next_id();
        self.messages.push(Message {
            id,
            role: Role::Assistant,
            content: String::new(),
            created_at: at,
            citations: Vec::new(),
            context: None,
            streaming: true,
        });
        id
    }

    /// Append a token to a streaming message. Returns false if the message
    /// does not exist or is already final.
    pub fn append_token(&mut self, id: MessageId, fragment: &str) -> bool {
        match self.get_mut(id) {
            Some(message) if message.streaming => {
                message.content.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    /// Append a citation to a streaming message, keeping arrival order
    pub fn append_citation(&mut self, id: MessageId, citation: Citation) -> bool {
        match self.get_mut(id) {
            Some(message) if message.streaming => {
                message.citations.push(citation);
                true
            }
            _ => false,
        }
    }

    /// Clear the streaming flag, making the message immutable
    pub fn finalize(&mut self, id: MessageId) -> bool {
        match self.get_mut(id) {
            Some(message) if message.streaming => {
                message.streaming = false;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Serialize for storage. An in-flight message with no content yet is
    /// left out, so a restored conversation never shows an empty bubble.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let view = PersistedView {
            messages: self
                .messages
                .iter()
                .filter(|m| !(m.streaming && m.content.is_empty() && m.citations.is_empty()))
                .collect(),
        };
        serde_json::to_string(&view)
    }

    /// Parse a stored conversation. Messages come back finalized.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let persisted: Persisted = serde_json::from_str(json)?;
        let increasing = persisted.messages.windows(2).all(|w| w[0].id < w[1].id);
        if !increasing {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "message ids are not strictly increasing",
            ));
        }
        if persisted.messages.iter().any(|m| m.id > MAX_STORED_ID) {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "message id out of range",
            ));
        }
        let last_id = persisted.messages.last().map_or(0, |m| m.id);
        Ok(Self {
            messages: persisted.messages,
            last_id,
        })
    }
}
