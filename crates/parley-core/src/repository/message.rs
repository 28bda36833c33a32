//! MessageRepository trait definition.

use parley_types::chat::{ChatMessage, ConversationId, NewMessage};
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for the per-conversation message ledger.
pub trait MessageRepository: Send + Sync {
    /// Append a message to its conversation's ledger.
    ///
    /// The store assigns the id, the next `seq` and a `created_at` strictly
    /// greater than the previous message's, all inside one linearized step
    /// per conversation.
    ///
    /// Errors:
    /// - `NotFound` if the conversation does not exist.
    /// - `Conflict` if `request_id` was already used in this conversation, or
    ///   `reply_to` already has an assistant message (of any status).
    fn append_message(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, RepositoryError>> + Send;

    /// Messages of a conversation in ascending `seq` order.
    ///
    /// Returns `NotFound` if the conversation does not exist.
    fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// The user message stored under a request-scoped idempotency key.
    fn find_by_request_id(
        &self,
        conversation_id: &ConversationId,
        request_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// The assistant message answering a user message, whatever its status.
    fn find_reply(
        &self,
        conversation_id: &ConversationId,
        user_message_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Turn a pending or failed assistant message into a completed one with
    /// `content`, keeping its id, `seq` and `created_at`.
    ///
    /// Compare-and-set on the status: returns `None` when the message is
    /// already completed or does not exist.
    fn settle_reply(
        &self,
        conversation_id: &ConversationId,
        reply_id: &Uuid,
        content: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Count all messages across conversations.
    fn count_messages(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
