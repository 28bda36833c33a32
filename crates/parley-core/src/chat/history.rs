//! History Store: the append-only, ordered ledger of a conversation.
//!
//! Ordering is the store's job. `HistoryStore` adds the idempotent user
//! append on top of the raw repository and maps store errors into the
//! engine's taxonomy. Ownership checks happen before anything here runs.
//!
//! A user message has at most one assistant message answering it. A failed
//! marker is later settled in place by a successful retry; its position in
//! the ledger never changes.

use parley_types::chat::{ChatMessage, ConversationId, NewMessage};
use parley_types::error::{ChatError, RepositoryError};
use tracing::debug;
use uuid::Uuid;

use crate::repository::message::MessageRepository;

/// Outcome of an idempotent user append.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAppend {
    /// The message was written by this call.
    Appended(ChatMessage),
    /// A message with the same request id already existed.
    Existing(ChatMessage),
}

pub struct HistoryStore<M: MessageRepository> {
    messages: M,
}

impl<M: MessageRepository> HistoryStore<M> {
    pub fn new(messages: M) -> Self {
        Self { messages }
    }

    pub fn repo(&self) -> &M {
        &self.messages
    }

    /// Append one message. The store assigns id, seq and timestamp.
    pub async fn append(&self, message: &NewMessage) -> Result<ChatMessage, RepositoryError> {
        let stored = self.messages.append_message(message).await?;
        debug!(
            conversation_id = %stored.conversation_id,
            seq = stored.seq,
            role = %stored.role,
            status = %stored.status,
            "appended message"
        );
        Ok(stored)
    }

    /// Append a user message at most once per request id.
    ///
    /// Without a request id every call appends. With one, a repeat returns
    /// the message persisted by the first call, including when two repeats
    /// race and the store rejects the loser's insert.
    pub async fn append_user_once(&self, message: &NewMessage) -> Result<UserAppend, ChatError> {
        let Some(request_id) = message.request_id.as_deref() else {
            return Ok(UserAppend::Appended(self.append(message).await?));
        };

        if let Some(existing) = self
            .messages
            .find_by_request_id(&message.conversation_id, request_id)
            .await?
        {
            return Ok(UserAppend::Existing(existing));
        }

        match self.append(message).await {
            Ok(stored) => Ok(UserAppend::Appended(stored)),
            Err(RepositoryError::Conflict(_)) => self
                .messages
                .find_by_request_id(&message.conversation_id, request_id)
                .await?
                .map(UserAppend::Existing)
                .ok_or_else(|| {
                    ChatError::Internal("request id conflict without a stored message".to_string())
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// The full ledger, oldest first.
    pub async fn list(&self, conversation_id: &ConversationId) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self.messages.list_messages(conversation_id, None, None).await?)
    }

    /// A page of the ledger, oldest first.
    pub async fn list_page(
        &self,
        conversation_id: &ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self
            .messages
            .list_messages(conversation_id, limit, offset)
            .await?)
    }

    /// The assistant message answering `user_message_id`, completed or not.
    pub async fn reply_to(
        &self,
        conversation_id: &ConversationId,
        user_message_id: &Uuid,
    ) -> Result<Option<ChatMessage>, ChatError> {
        Ok(self
            .messages
            .find_reply(conversation_id, user_message_id)
            .await?)
    }

    pub async fn completed_reply(
        &self,
        conversation_id: &ConversationId,
        user_message_id: &Uuid,
    ) -> Result<Option<ChatMessage>, ChatError> {
        Ok(self
            .reply_to(conversation_id, user_message_id)
            .await?
            .filter(ChatMessage::is_completed_reply))
    }

    /// Complete a failed or pending reply with `content`.
    ///
    /// `None` means another caller completed it first.
    pub async fn settle(
        &self,
        conversation_id: &ConversationId,
        reply_id: &Uuid,
        content: &str,
    ) -> Result<Option<ChatMessage>, ChatError> {
        let settled = self
            .messages
            .settle_reply(conversation_id, reply_id, content)
            .await?;
        if let Some(reply) = &settled {
            debug!(conversation_id = %conversation_id, seq = reply.seq, "settled reply in place");
        }
        Ok(settled)
    }
}
