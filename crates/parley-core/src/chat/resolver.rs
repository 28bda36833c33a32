//! Conversation Resolver: finds or atomically creates the conversation a
//! message belongs to, and enforces ownership on every lookup.

use chrono::Utc;
use parley_types::chat::{Conversation, ConversationId};
use parley_types::error::ChatError;
use parley_types::identity::UserId;
use tracing::{debug, info, warn};

use super::title::resolve_title;
use crate::repository::conversation::ConversationRepository;

/// A conversation plus whether this call created it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConversation {
    pub conversation: Conversation,
    pub created: bool,
}

pub struct ConversationResolver<C: ConversationRepository> {
    conversations: C,
}

impl<C: ConversationRepository> ConversationResolver<C> {
    pub fn new(conversations: C) -> Self {
        Self { conversations }
    }

    pub fn repo(&self) -> &C {
        &self.conversations
    }

    /// Resolve the conversation for an incoming message.
    ///
    /// - No handle: always create a new conversation.
    /// - Handle owned by `owner`: return it.
    /// - Handle owned by someone else: `Forbidden`, nothing written.
    /// - Unknown handle: create it under that id. If another request wins
    ///   the race to create it, this call resolves to the winner's row
    ///   (or `Forbidden` if the winner is a different user).
    pub async fn resolve(
        &self,
        owner: &UserId,
        handle: Option<&ConversationId>,
        seed: Option<&str>,
    ) -> Result<ResolvedConversation, ChatError> {
        let Some(handle) = handle else {
            let conversation = self.create(owner, None, seed).await?;
            return Ok(ResolvedConversation {
                conversation,
                created: true,
            });
        };

        if let Some(existing) = self.conversations.get_conversation(handle).await? {
            ensure_owner(&existing, owner)?;
            debug!(conversation_id = %handle, "resolved existing conversation");
            return Ok(ResolvedConversation {
                conversation: existing,
                created: false,
            });
        }

        let candidate = Conversation {
            id: handle.clone(),
            owner_id: owner.clone(),
            title: resolve_title(None, seed),
            created_at: Utc::now(),
        };
        let outcome = self.conversations.create_if_absent(&candidate).await?;
        ensure_owner(&outcome.record, owner)?;

        if outcome.inserted {
            info!(conversation_id = %handle, "created conversation from handle");
        } else {
            debug!(conversation_id = %handle, "lost creation race, resolved to winner");
        }
        Ok(ResolvedConversation {
            conversation: outcome.record,
            created: outcome.inserted,
        })
    }

    /// Create a conversation with a fresh server-side id.
    pub async fn create(
        &self,
        owner: &UserId,
        title: Option<&str>,
        seed: Option<&str>,
    ) -> Result<Conversation, ChatError> {
        let candidate = Conversation {
            id: ConversationId::generate(),
            owner_id: owner.clone(),
            title: resolve_title(title, seed),
            created_at: Utc::now(),
        };
        let outcome = self.conversations.create_if_absent(&candidate).await?;
        if !outcome.inserted {
            // A v7 collision means the id generator is broken; never hand
            // back someone else's row.
            return Err(ChatError::Internal(
                "generated conversation id already exists".to_string(),
            ));
        }
        info!(conversation_id = %outcome.record.id, "created conversation");
        Ok(outcome.record)
    }

    /// Fetch a conversation, checking that `owner` owns it.
    pub async fn get_owned(
        &self,
        owner: &UserId,
        id: &ConversationId,
    ) -> Result<Conversation, ChatError> {
        let conversation = self
            .conversations
            .get_conversation(id)
            .await?
            .ok_or(ChatError::NotFound)?;
        ensure_owner(&conversation, owner)?;
        Ok(conversation)
    }

    /// An owner's conversations, newest first.
    pub async fn list_owned(
        &self,
        owner: &UserId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, ChatError> {
        Ok(self
            .conversations
            .list_conversations(owner, limit, offset)
            .await?)
    }
}

fn ensure_owner(conversation: &Conversation, owner: &UserId) -> Result<(), ChatError> {
    if conversation.owner_id == *owner {
        Ok(())
    } else {
        warn!(
            conversation_id = %conversation.id,
            caller = %owner,
            "rejected access to conversation owned by another user"
        );
        Err(ChatError::Forbidden)
    }
}
