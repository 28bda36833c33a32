//! In-memory store implementing every repository trait.
//!
//! Backed by `DashMap`s. Each conversation's ledger sits behind its own
//! async mutex, which linearizes appends per conversation without any
//! global lock. Nothing is persisted; useful for ephemeral deployments and
//! tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_core::repository::InsertOutcome;
use parley_core::repository::conversation::ConversationRepository;
use parley_core::repository::message::MessageRepository;
use parley_core::repository::user::UserRepository;
use parley_types::chat::{
    ChatMessage, Conversation, ConversationId, MessageRole, MessageStatus, NewMessage,
};
use parley_types::error::RepositoryError;
use parley_types::identity::{User, UserId};
use tokio::sync::Mutex;
use uuid::Uuid;

type Ledger = Arc<Mutex<Vec<ChatMessage>>>;

#[derive(Default)]
struct Inner {
    /// Keyed by normalized email.
    users: DashMap<String, User>,
    conversations: DashMap<ConversationId, Conversation>,
    ledgers: DashMap<ConversationId, Ledger>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone the ledger handle out so no map guard is held while awaiting.
    fn ledger(&self, id: &ConversationId) -> Option<Ledger> {
        self.inner.ledgers.get(id).map(|l| Arc::clone(l.value()))
    }
}

fn page<T>(items: impl Iterator<Item = T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let offset = offset.unwrap_or(0).max(0) as usize;
    let limit = match limit {
        Some(l) if l >= 0 => l as usize,
        _ => usize::MAX,
    };
    items.skip(offset).take(limit).collect()
}

fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(at) if now <= at => at + Duration::microseconds(1),
        _ => now,
    }
}

impl UserRepository for InMemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.inner.users.get(email).map(|u| u.value().clone()))
    }

    async fn insert_if_absent(&self, user: &User) -> Result<InsertOutcome<User>, RepositoryError> {
        Ok(match self.inner.users.entry(user.email.clone()) {
            Entry::Occupied(existing) => InsertOutcome::existing(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                InsertOutcome::inserted(user.clone())
            }
        })
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        Ok(self.inner.users.len() as u64)
    }
}

impl ConversationRepository for InMemoryStore {
    async fn create_if_absent(
        &self,
        conversation: &Conversation,
    ) -> Result<InsertOutcome<Conversation>, RepositoryError> {
        let owner_known = self
            .inner
            .users
            .iter()
            .any(|u| u.value().id == conversation.owner_id);
        if !owner_known {
            return Err(RepositoryError::Query(format!(
                "owner {} does not exist",
                conversation.owner_id
            )));
        }

        Ok(match self.inner.conversations.entry(conversation.id.clone()) {
            Entry::Occupied(existing) => InsertOutcome::existing(existing.get().clone()),
            Entry::Vacant(slot) => {
                // Ledger first, so a visible conversation always has one.
                self.inner
                    .ledgers
                    .insert(conversation.id.clone(), Arc::new(Mutex::new(Vec::new())));
                slot.insert(conversation.clone());
                InsertOutcome::inserted(conversation.clone())
            }
        })
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.inner.conversations.get(id).map(|c| c.value().clone()))
    }

    async fn list_conversations(
        &self,
        owner_id: &UserId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let mut owned: Vec<Conversation> = self
            .inner
            .conversations
            .iter()
            .filter(|c| c.value().owner_id == *owner_id)
            .map(|c| c.value().clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page(owned.into_iter(), limit, offset))
    }

    async fn count_conversations(&self) -> Result<u64, RepositoryError> {
        Ok(self.inner.conversations.len() as u64)
    }
}

impl MessageRepository for InMemoryStore {
    async fn append_message(&self, message: &NewMessage) -> Result<ChatMessage, RepositoryError> {
        let ledger = self
            .ledger(&message.conversation_id)
            .ok_or(RepositoryError::NotFound)?;
        let mut ledger = ledger.lock().await;

        if let Some(request_id) = &message.request_id {
            if ledger.iter().any(|m| m.request_id.as_ref() == Some(request_id)) {
                return Err(RepositoryError::Conflict("request id already used".to_string()));
            }
        }
        if message.reply_to.is_some() && ledger.iter().any(|m| m.reply_to == message.reply_to) {
            return Err(RepositoryError::Conflict("message already answered".to_string()));
        }

        let stored = ChatMessage {
            id: Uuid::now_v7(),
            conversation_id: message.conversation_id.clone(),
            seq: ledger.len() as u64 + 1,
            role: message.role,
            content: message.content.clone(),
            status: message.status,
            created_at: next_timestamp(ledger.last().map(|m| m.created_at)),
            request_id: message.request_id.clone(),
            reply_to: message.reply_to,
        };

        ledger.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let ledger = self.ledger(conversation_id).ok_or(RepositoryError::NotFound)?;
        let ledger = ledger.lock().await;
        Ok(page(ledger.iter().cloned(), limit, offset))
    }

    async fn find_by_request_id(
        &self,
        conversation_id: &ConversationId,
        request_id: &str,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let Some(ledger) = self.ledger(conversation_id) else {
            return Ok(None);
        };
        let ledger = ledger.lock().await;
        Ok(ledger
            .iter()
            .find(|m| m.request_id.as_deref() == Some(request_id))
            .cloned())
    }

    async fn find_reply(
        &self,
        conversation_id: &ConversationId,
        user_message_id: &Uuid,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let Some(ledger) = self.ledger(conversation_id) else {
            return Ok(None);
        };
        let ledger = ledger.lock().await;
        Ok(ledger
            .iter()
            .find(|m| m.reply_to == Some(*user_message_id))
            .cloned())
    }

    async fn settle_reply(
        &self,
        conversation_id: &ConversationId,
        reply_id: &Uuid,
        content: &str,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let Some(ledger) = self.ledger(conversation_id) else {
            return Ok(None);
        };
        let mut ledger = ledger.lock().await;
        let Some(reply) = ledger.iter_mut().find(|m| m.id == *reply_id) else {
            return Ok(None);
        };
        if reply.role != MessageRole::Assistant || reply.status == MessageStatus::Completed {
            return Ok(None);
        }
        reply.status = MessageStatus::Completed;
        reply.content = content.to_string();
        Ok(Some(reply.clone()))
    }

    async fn count_messages(&self) -> Result<u64, RepositoryError> {
        let ledgers: Vec<Ledger> = self
            .inner
            .ledgers
            .iter()
            .map(|l| Arc::clone(l.value()))
            .collect();
        let mut total = 0;
        for ledger in ledgers {
            total += ledger.lock().await.len() as u64;
        }
        Ok(total)
    }
}
