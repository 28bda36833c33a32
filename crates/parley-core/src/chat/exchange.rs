//! Request and result types for one message exchange.

use std::fmt;

use parley_types::chat::{ChatMessage, Conversation, ConversationId};
use parley_types::error::ChatError;
use serde::Serialize;
use uuid::Uuid;

/// Longest accepted request-scoped idempotency key.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Lifecycle of one exchange.
///
/// `UserPersisted` is a one-way gate: past it the user's turn is durable and
/// is never appended again for the same request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStage {
    Received,
    Authenticated,
    ConversationResolved,
    UserPersisted,
    ContextBuilt,
    Generated,
    AssistantPersisted,
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeStage::Received => "received",
            ExchangeStage::Authenticated => "authenticated",
            ExchangeStage::ConversationResolved => "conversation_resolved",
            ExchangeStage::UserPersisted => "user_persisted",
            ExchangeStage::ContextBuilt => "context_built",
            ExchangeStage::Generated => "generated",
            ExchangeStage::AssistantPersisted => "assistant_persisted",
        };
        f.write_str(name)
    }
}

/// A message submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct SubmitMessage {
    /// Conversation handle; `None` starts a new conversation.
    pub conversation_id: Option<ConversationId>,
    pub content: String,
    /// Request-scoped idempotency key.
    pub request_id: Option<String>,
}

impl SubmitMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn in_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Shape checks that need no I/O.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.content.trim().is_empty() {
            return Err(ChatError::InvalidArgument(
                "content must not be empty".to_string(),
            ));
        }
        if let Some(request_id) = &self.request_id {
            if request_id.trim().is_empty() || request_id.len() > MAX_REQUEST_ID_LEN {
                return Err(ChatError::InvalidArgument(format!(
                    "request_id must be 1 to {MAX_REQUEST_ID_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

/// Result of a successful exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeOutcome {
    pub conversation: Conversation,
    /// Whether this exchange created the conversation.
    pub conversation_created: bool,
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    /// The reply was already stored by an earlier attempt with the same
    /// request id; no generation happened.
    pub replayed: bool,
}

/// A failed exchange, with how far it got.
#[derive(Debug, thiserror::Error)]
#[error("exchange failed after {stage}: {error}")]
pub struct ExchangeError {
    /// Last stage reached before the failure.
    pub stage: ExchangeStage,
    pub conversation_id: Option<ConversationId>,
    /// Set once the user's turn is durable.
    pub user_message_id: Option<Uuid>,
    #[source]
    pub error: ChatError,
}

impl ExchangeError {
    pub fn new(stage: ExchangeStage, error: ChatError) -> Self {
        Self {
            stage,
            conversation_id: None,
            user_message_id: None,
            error,
        }
    }

    pub fn in_conversation(mut self, id: &ConversationId) -> Self {
        self.conversation_id = Some(id.clone());
        self
    }

    pub fn for_user_message(mut self, id: Uuid) -> Self {
        self.user_message_id = Some(id);
        self
    }

    /// Whether the user's turn was persisted before the failure.
    pub fn user_message_persisted(&self) -> bool {
        self.stage >= ExchangeStage::UserPersisted
    }
}
