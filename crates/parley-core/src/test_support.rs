//! In-test doubles: a mutex-backed store implementing every repository and
//! a scripted generator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use parley_types::chat::{ChatMessage, Conversation, ConversationId, MessageRole, MessageStatus, NewMessage};
use parley_types::error::RepositoryError;
use parley_types::identity::{User, UserId};
use parley_types::llm::{GenerationError, GenerationRequest, GenerationResponse, Usage};
use uuid::Uuid;

use crate::llm::generator::Generator;
use crate::repository::InsertOutcome;
use crate::repository::conversation::ConversationRepository;
use crate::repository::message::MessageRepository;
use crate::repository::user::UserRepository;

#[derive(Default)]
struct State {
    users: Vec<User>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<ChatMessage>>,
}

/// Every operation takes the lock once and never awaits while holding it,
/// which makes each call atomic.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
}

impl MockStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn seed_user(&self, email: &str) -> UserId {
        let user = User {
            id: UserId::new(),
            email: email.to_string(),
            display_name: None,
            created_at: Utc::now(),
        };
        let id = user.id.clone();
        self.lock().users.push(user);
        id
    }

    pub fn seed_conversation(&self, email: &str, id: &str) -> ConversationId {
        let owner = self.seed_user(email);
        let id: ConversationId = id.parse().unwrap();
        self.lock().conversations.insert(
            id.clone(),
            Conversation {
                id: id.clone(),
                owner_id: owner,
                title: "seeded".to_string(),
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.lock().conversations.len()
    }

    pub fn messages(&self, id: &ConversationId) -> Vec<ChatMessage> {
        self.lock().messages.get(id).cloned().unwrap_or_default()
    }
}

impl UserRepository for MockStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        tokio::task::yield_now().await;
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_if_absent(&self, user: &User) -> Result<InsertOutcome<User>, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if let Some(existing) = state.users.iter().find(|u| u.email == user.email) {
            return Ok(InsertOutcome::existing(existing.clone()));
        }
        state.users.push(user.clone());
        Ok(InsertOutcome::inserted(user.clone()))
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        Ok(self.lock().users.len() as u64)
    }
}

impl ConversationRepository for MockStore {
    async fn create_if_absent(
        &self,
        conversation: &Conversation,
    ) -> Result<InsertOutcome<Conversation>, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if let Some(existing) = state.conversations.get(&conversation.id) {
            return Ok(InsertOutcome::existing(existing.clone()));
        }
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(InsertOutcome::inserted(conversation.clone()))
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        tokio::task::yield_now().await;
        Ok(self.lock().conversations.get(id).cloned())
    }

    async fn list_conversations(
        &self,
        owner_id: &UserId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let mut owned: Vec<Conversation> = self
            .lock()
            .conversations
            .values()
            .filter(|c| c.owner_id == *owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page(owned, limit, offset))
    }

    async fn count_conversations(&self) -> Result<u64, RepositoryError> {
        Ok(self.lock().conversations.len() as u64)
    }
}

impl MessageRepository for MockStore {
    async fn append_message(&self, message: &NewMessage) -> Result<ChatMessage, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(RepositoryError::NotFound);
        }
        let ledger = state
            .messages
            .entry(message.conversation_id.clone())
            .or_default();

        if let Some(request_id) = &message.request_id {
            if ledger.iter().any(|m| m.request_id.as_ref() == Some(request_id)) {
                return Err(RepositoryError::Conflict("duplicate request_id".to_string()));
            }
        }
        if message.reply_to.is_some() && ledger.iter().any(|m| m.reply_to == message.reply_to) {
            return Err(RepositoryError::Conflict("reply already stored".to_string()));
        }

        let now = Utc::now();
        let created_at = match ledger.last() {
            Some(last) if now <= last.created_at => last.created_at + chrono::Duration::microseconds(1),
            _ => now,
        };
        let stored = ChatMessage {
            id: Uuid::now_v7(),
            conversation_id: message.conversation_id.clone(),
            seq: ledger.len() as u64 + 1,
            role: message.role,
            content: message.content.clone(),
            status: message.status,
            created_at,
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
        tokio::task::yield_now().await;
        let state = self.lock();
        if !state.conversations.contains_key(conversation_id) {
            return Err(RepositoryError::NotFound);
        }
        let ledger = state.messages.get(conversation_id).cloned().unwrap_or_default();
        Ok(page(ledger, limit, offset))
    }

    async fn find_by_request_id(
        &self,
        conversation_id: &ConversationId,
        request_id: &str,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        Ok(self.lock().messages.get(conversation_id).and_then(|ledger| {
            ledger
                .iter()
                .find(|m| m.request_id.as_deref() == Some(request_id))
                .cloned()
        }))
    }

    async fn find_reply(
        &self,
        conversation_id: &ConversationId,
        user_message_id: &Uuid,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        tokio::task::yield_now().await;
        Ok(self.lock().messages.get(conversation_id).and_then(|ledger| {
            ledger
                .iter()
                .find(|m| m.reply_to == Some(*user_message_id))
                .cloned()
        }))
    }

    async fn settle_reply(
        &self,
        conversation_id: &ConversationId,
        reply_id: &Uuid,
        content: &str,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        let Some(reply) = state
            .messages
            .get_mut(conversation_id)
            .and_then(|ledger| ledger.iter_mut().find(|m| m.id == *reply_id))
        else {
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
        Ok(self.lock().messages.values().map(|l| l.len() as u64).sum())
    }
}

fn page<T>(items: Vec<T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let offset = offset.unwrap_or(0).max(0) as usize;
    let limit = limit.map_or(usize::MAX, |l| l.max(0) as usize);
    items.into_iter().skip(offset).take(limit).collect()
}

/// What the scripted generator does on each call.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Reply `"Echo: <last user turn>"`.
    Echo,
    /// Fail with a provider error.
    Fail,
    /// Reply with whitespace only.
    Empty,
    /// Echo after sleeping.
    Delay(Duration),
}

#[derive(Clone)]
pub struct ScriptedGenerator {
    behavior: Arc<Mutex<Behavior>>,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<GenerationRequest>>>,
}

impl ScriptedGenerator {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let behavior = *self.behavior.lock().unwrap();

        let echo = || GenerationResponse {
            content: format!("Echo: {}", request.last_user_turn().unwrap_or_default()),
            model: "scripted-1".to_string(),
            usage: Usage::default(),
        };
        match behavior {
            Behavior::Echo => Ok(echo()),
            Behavior::Fail => Err(GenerationError::Provider {
                status: Some(500),
                message: "scripted failure".to_string(),
            }),
            Behavior::Empty => Ok(GenerationResponse {
                content: "  ".to_string(),
                model: "scripted-1".to_string(),
                usage: Usage::default(),
            }),
            Behavior::Delay(wait) => {
                tokio::time::sleep(wait).await;
                Ok(echo())
            }
        }
    }
}
