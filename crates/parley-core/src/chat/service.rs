//! Chat service: the engine's surface for callers.
//!
//! Wraps the exchange orchestrator and adds the read/create operations.
//! Every operation starts from an `AuthContext` and re-checks ownership, so
//! no path reads or writes another user's conversation.

use std::sync::Arc;

use parley_types::chat::{ChatMessage, Conversation, ConversationId};
use parley_types::config::GlobalConfig;
use parley_types::error::ChatError;
use parley_types::identity::User;

use super::exchange::{ExchangeError, ExchangeOutcome, SubmitMessage};
use super::orchestrator::{EngineOptions, ExchangeOrchestrator};
use crate::auth::AuthContext;
use crate::llm::box_generator::BoxGenerator;
use crate::repository::conversation::ConversationRepository;
use crate::repository::message::MessageRepository;
use crate::repository::user::UserRepository;

/// Generic over the repositories (parley-core never depends on
/// parley-infra).
pub struct ChatService<U, C, M>
where
    U: UserRepository + 'static,
    C: ConversationRepository + 'static,
    M: MessageRepository + 'static,
{
    exchange: ExchangeOrchestrator<U, C, M>,
}

impl<U, C, M> ChatService<U, C, M>
where
    U: UserRepository + 'static,
    C: ConversationRepository + 'static,
    M: MessageRepository + 'static,
{
    pub fn new(exchange: ExchangeOrchestrator<U, C, M>) -> Self {
        Self { exchange }
    }

    pub fn from_config(
        users: U,
        conversations: C,
        messages: M,
        generator: Arc<BoxGenerator>,
        config: &GlobalConfig,
    ) -> Self {
        Self::new(ExchangeOrchestrator::new(
            users,
            conversations,
            messages,
            generator,
            EngineOptions::from_config(config),
        ))
    }

    pub fn exchange(&self) -> &ExchangeOrchestrator<U, C, M> {
        &self.exchange
    }

    /// The user behind the current principal.
    pub async fn current_user<A: AuthContext + ?Sized>(&self, auth: &A) -> Result<User, ChatError> {
        let principal = auth.current_principal();
        self.exchange.identity().resolve(principal.as_ref()).await
    }

    /// Create an empty conversation. Blank titles fall back to the default.
    pub async fn create_conversation<A: AuthContext + ?Sized>(
        &self,
        auth: &A,
        title: Option<&str>,
    ) -> Result<Conversation, ChatError> {
        let user = self.current_user(auth).await?;
        self.exchange.conversations().create(&user.id, title, None).await
    }

    /// The caller's conversations, newest first.
    pub async fn list_conversations<A: AuthContext + ?Sized>(
        &self,
        auth: &A,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Conversation>, ChatError> {
        let user = self.current_user(auth).await?;
        self.exchange
            .conversations()
            .list_owned(&user.id, limit, offset)
            .await
    }

    pub async fn get_conversation<A: AuthContext + ?Sized>(
        &self,
        auth: &A,
        id: &ConversationId,
    ) -> Result<Conversation, ChatError> {
        let user = self.current_user(auth).await?;
        self.exchange.conversations().get_owned(&user.id, id).await
    }

    /// Messages of one of the caller's conversations, oldest first.
    pub async fn list_messages<A: AuthContext + ?Sized>(
        &self,
        auth: &A,
        id: &ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let user = self.current_user(auth).await?;
        let conversation = self.exchange.conversations().get_owned(&user.id, id).await?;
        self.exchange
            .history()
            .list_page(&conversation.id, limit, offset)
            .await
    }

    /// Submit a message and wait for the reply.
    pub async fn submit_message<A: AuthContext + ?Sized>(
        &self,
        auth: &A,
        request: SubmitMessage,
    ) -> Result<ExchangeOutcome, ExchangeError> {
        self.exchange.submit(auth, request).await
    }
}
