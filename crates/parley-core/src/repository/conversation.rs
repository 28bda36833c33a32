//! ConversationRepository trait definition.

use parley_types::chat::{Conversation, ConversationId};
use parley_types::error::RepositoryError;
use parley_types::identity::UserId;

use super::InsertOutcome;

/// Repository trait for conversation persistence.
pub trait ConversationRepository: Send + Sync {
    /// Atomically create `conversation` unless its id is already taken.
    ///
    /// There is no window between the existence check and the insert that
    /// another caller can observe. When the id is taken the existing row is
    /// returned, whoever owns it; the caller decides what that means.
    fn create_if_absent(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<InsertOutcome<Conversation>, RepositoryError>> + Send;

    /// Get a conversation by id, regardless of owner.
    fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// List an owner's conversations, newest first.
    fn list_conversations(
        &self,
        owner_id: &UserId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;

    /// Count all conversations.
    fn count_conversations(
        &self,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
