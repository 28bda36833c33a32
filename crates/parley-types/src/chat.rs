//! Conversation and message types for Parley.
//!
//! A conversation is a named thread owned by exactly one user. Its messages
//! form an append-only ledger ordered by a store-assigned sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::identity::UserId;

/// Identifier of a conversation.
///
/// Either generated by the server (UUID v7 text) or supplied by the caller
/// as a handle. Caller-supplied handles are limited to ASCII letters, digits,
/// `-` and `_`, at most [`ConversationId::MAX_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    pub const MAX_LEN: usize = 128;

    /// Mint a fresh server-side identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The conversation a request-scoped key opens when no handle is given.
    ///
    /// A UUID v5 of the key in the owner's namespace, so every retry of the
    /// same first message lands on the same conversation.
    pub fn for_request(owner: &UserId, request_id: &str) -> Self {
        Self(Uuid::new_v5(&owner.0, request_id.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConversationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("conversation id must not be empty".to_string());
        }
        if s.len() > Self::MAX_LEN {
            return Err(format!(
                "conversation id must be at most {} characters",
                Self::MAX_LEN
            ));
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(format!("conversation id contains invalid character '{bad}'"));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ConversationId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConversationId> for String {
    fn from(value: ConversationId) -> Self {
        value.0
    }
}

/// A conversation thread.
///
/// Identity and ownership are immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub owner_id: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Who authored a ledger message. Only these two parties may post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// Generation lifecycle of a message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (status IN ('pending', 'completed', 'failed'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Completed => write!(f, "completed"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MessageStatus::Pending),
            "completed" => Ok(MessageStatus::Completed),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("invalid message status: '{other}'")),
        }
    }
}

/// One turn in a conversation's ledger.
///
/// `seq` is 1-based and gap-free within a conversation; `created_at` is
/// strictly increasing along `seq`. Both are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub seq: u64,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    /// Request-scoped idempotency key (user messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// The user message this assistant message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

impl ChatMessage {
    /// Whether this is a model answer that actually completed.
    pub fn is_completed_reply(&self) -> bool {
        self.role == MessageRole::Assistant && self.status == MessageStatus::Completed
    }
}

/// A message to be appended; the store fills in id, seq and created_at.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub status: MessageStatus,
    pub request_id: Option<String>,
    pub reply_to: Option<Uuid>,
}

impl NewMessage {
    /// A user turn. User turns are always stored as completed.
    pub fn user(
        conversation_id: ConversationId,
        content: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Self {
            conversation_id,
            role: MessageRole::User,
            content: content.into(),
            status: MessageStatus::Completed,
            request_id,
            reply_to: None,
        }
    }

    /// An assistant turn answering `reply_to`.
    pub fn assistant(
        conversation_id: ConversationId,
        reply_to: Uuid,
        content: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            conversation_id,
            role: MessageRole::Assistant,
            content: content.into(),
            status,
            request_id: None,
            reply_to: Some(reply_to),
        }
    }
}
