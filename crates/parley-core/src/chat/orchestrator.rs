//! Exchange Orchestrator: drives one message exchange end to end.
//!
//! Received -> Authenticated -> ConversationResolved -> UserPersisted ->
//! ContextBuilt -> Generated -> AssistantPersisted, with a typed failure
//! reachable from every stage.
//!
//! Everything after `UserPersisted` runs on a spawned task. If the caller
//! goes away (HTTP client disconnects, request future dropped) the reply is
//! still generated and persisted, so a durable user turn is not left
//! unanswered. The generator call itself is bounded by a timeout.
//!
//! A request id scopes idempotency to the owner. Without a handle, the key
//! names the conversation (`ConversationId::for_request`), so a retry of a
//! lost first exchange resolves to the conversation the first attempt made.

use std::sync::Arc;
use std::time::Duration;

use parley_types::chat::{ChatMessage, Conversation, ConversationId, MessageStatus, NewMessage};
use parley_types::config::{GlobalConfig, IdentityPolicy};
use parley_types::error::{ChatError, RepositoryError};
use parley_types::llm::{GenerationError, GenerationRequest, GenerationResponse};
use tracing::{Instrument, debug, info, warn};

use super::exchange::{ExchangeError, ExchangeOutcome, ExchangeStage, SubmitMessage};
use super::history::{HistoryStore, UserAppend};
use super::resolver::ConversationResolver;
use crate::auth::AuthContext;
use crate::context::assembler::{ContextAssembler, PendingTurn};
use crate::context::window::{FullHistory, WindowPolicy, window_policy_from_config};
use crate::identity::resolver::IdentityResolver;
use crate::llm::box_generator::BoxGenerator;
use crate::repository::conversation::ConversationRepository;
use crate::repository::message::MessageRepository;
use crate::repository::user::UserRepository;

/// Failure and timing policy for exchanges.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub generation_timeout: Duration,
    /// Persist a `failed` assistant marker when generation fails.
    pub persist_failed_marker: bool,
    pub failure_notice: String,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self::from_config(&GlobalConfig::default())
    }
}

impl ExchangeSettings {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            generation_timeout: Duration::from_secs(config.generator.timeout_secs.max(1)),
            persist_failed_marker: config.exchange.persist_failed_marker,
            failure_notice: config.exchange.failure_notice.clone(),
        }
    }
}

/// Everything the engine needs besides its stores and generator.
#[derive(Debug)]
pub struct EngineOptions {
    pub identity_policy: IdentityPolicy,
    pub window: Box<dyn WindowPolicy>,
    pub system_prompt: Option<String>,
    pub exchange: ExchangeSettings,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            identity_policy: IdentityPolicy::default(),
            window: Box::new(FullHistory),
            system_prompt: None,
            exchange: ExchangeSettings::default(),
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            identity_policy: config.identity.policy,
            window: window_policy_from_config(&config.context),
            system_prompt: config.generator.system_prompt.clone(),
            exchange: ExchangeSettings::from_config(config),
        }
    }
}

struct Engine<U: UserRepository, C: ConversationRepository, M: MessageRepository> {
    identity: IdentityResolver<U>,
    conversations: ConversationResolver<C>,
    history: HistoryStore<M>,
    assembler: ContextAssembler,
    generator: Arc<BoxGenerator>,
    settings: ExchangeSettings,
}

/// Coordinates identity, conversation, history, context and generation.
///
/// Cheap to clone; clones share one engine.
pub struct ExchangeOrchestrator<U, C, M>
where
    U: UserRepository + 'static,
    C: ConversationRepository + 'static,
    M: MessageRepository + 'static,
{
    inner: Arc<Engine<U, C, M>>,
}

impl<U, C, M> Clone for ExchangeOrchestrator<U, C, M>
where
    U: UserRepository + 'static,
    C: ConversationRepository + 'static,
    M: MessageRepository + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U, C, M> ExchangeOrchestrator<U, C, M>
where
    U: UserRepository + 'static,
    C: ConversationRepository + 'static,
    M: MessageRepository + 'static,
{
    pub fn new(
        users: U,
        conversations: C,
        messages: M,
        generator: Arc<BoxGenerator>,
        options: EngineOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Engine {
                identity: IdentityResolver::new(users, options.identity_policy),
                conversations: ConversationResolver::new(conversations),
                history: HistoryStore::new(messages),
                assembler: ContextAssembler::new(options.window, options.system_prompt),
                generator,
                settings: options.exchange,
            }),
        }
    }

    pub fn identity(&self) -> &IdentityResolver<U> {
        &self.inner.identity
    }

    pub fn conversations(&self) -> &ConversationResolver<C> {
        &self.inner.conversations
    }

    pub fn history(&self) -> &HistoryStore<M> {
        &self.inner.history
    }

    pub fn generator(&self) -> &BoxGenerator {
        &self.inner.generator
    }

    pub fn settings(&self) -> &ExchangeSettings {
        &self.inner.settings
    }

    /// Run one exchange.
    ///
    /// Failures before `UserPersisted` leave no messages behind. Failures
    /// after it keep the user's turn and report `user_message_id`, so the
    /// caller can retry (ideally with the same request id).
    #[tracing::instrument(
        name = "exchange",
        skip_all,
        fields(
            conversation_id = tracing::field::Empty,
            request_id = request.request_id.as_deref().unwrap_or("-"),
        )
    )]
    pub async fn submit<A: AuthContext + ?Sized>(
        &self,
        auth: &A,
        request: SubmitMessage,
    ) -> Result<ExchangeOutcome, ExchangeError> {
        use ExchangeStage::*;

        let principal = auth
            .current_principal()
            .ok_or_else(|| ExchangeError::new(Received, ChatError::Unauthenticated))?;
        request
            .validate()
            .map_err(|e| ExchangeError::new(Received, e))?;

        let user = self
            .inner
            .identity
            .resolve(Some(&principal))
            .await
            .map_err(|e| ExchangeError::new(Received, e))?;
        debug!(stage = %Authenticated, user_id = %user.id, "exchange stage reached");

        let handle = request.conversation_id.clone().or_else(|| {
            request
                .request_id
                .as_deref()
                .map(|key| ConversationId::for_request(&user.id, key))
        });
        let resolved = self
            .inner
            .conversations
            .resolve(&user.id, handle.as_ref(), Some(&request.content))
            .await
            .map_err(|e| {
                let err = ExchangeError::new(Authenticated, e);
                match &handle {
                    Some(id) => err.in_conversation(id),
                    None => err,
                }
            })?;
        let conversation = resolved.conversation;
        tracing::Span::current().record("conversation_id", tracing::field::display(&conversation.id));
        debug!(stage = %ConversationResolved, created = resolved.created, "exchange stage reached");

        let new_user = NewMessage::user(
            conversation.id.clone(),
            request.content.clone(),
            request.request_id.clone(),
        );
        let user_message = match self
            .inner
            .history
            .append_user_once(&new_user)
            .await
            .map_err(|e| ExchangeError::new(ConversationResolved, e).in_conversation(&conversation.id))?
        {
            UserAppend::Appended(message) => message,
            UserAppend::Existing(message) => {
                if message.content != request.content {
                    return Err(ExchangeError::new(
                        ConversationResolved,
                        ChatError::InvalidArgument(
                            "request_id was already used for a different message".to_string(),
                        ),
                    )
                    .in_conversation(&conversation.id));
                }

                let previous = self
                    .inner
                    .history
                    .completed_reply(&conversation.id, &message.id)
                    .await
                    .map_err(|e| {
                        ExchangeError::new(UserPersisted, e)
                            .in_conversation(&conversation.id)
                            .for_user_message(message.id)
                    })?;
                if let Some(reply) = previous {
                    info!(user_message_id = %message.id, "replaying stored reply for repeated request");
                    return Ok(ExchangeOutcome {
                        conversation,
                        conversation_created: false,
                        user_message: message,
                        assistant_message: reply,
                        replayed: true,
                    });
                }
                debug!(user_message_id = %message.id, "reusing persisted user turn for repeated request");
                message
            }
        };
        debug!(stage = %UserPersisted, user_message_id = %user_message.id, "exchange stage reached");

        let engine = Arc::clone(&self.inner);
        let task_conversation = conversation.clone();
        let task_message = user_message.clone();
        let completion = tokio::spawn(
            async move { engine.complete(&task_conversation, &task_message).await }
                .instrument(tracing::Span::current()),
        );

        let (assistant_message, replayed) = completion
            .await
            .map_err(|e| {
                ExchangeError::new(UserPersisted, ChatError::Internal(e.to_string()))
                    .in_conversation(&conversation.id)
                    .for_user_message(user_message.id)
            })??;

        Ok(ExchangeOutcome {
            conversation,
            conversation_created: resolved.created,
            user_message,
            assistant_message,
            replayed,
        })
    }
}

impl<U, C, M> Engine<U, C, M>
where
    U: UserRepository,
    C: ConversationRepository,
    M: MessageRepository,
{
    /// Steps after the user's turn is durable. Returns the reply and whether
    /// it was stored by someone else.
    async fn complete(
        &self,
        conversation: &Conversation,
        user_message: &ChatMessage,
    ) -> Result<(ChatMessage, bool), ExchangeError> {
        use ExchangeStage::*;

        let fail = |stage: ExchangeStage, error: ChatError| {
            ExchangeError::new(stage, error)
                .in_conversation(&conversation.id)
                .for_user_message(user_message.id)
        };

        let ledger = self
            .history
            .list(&conversation.id)
            .await
            .map_err(|e| fail(UserPersisted, e))?;
        let request = self
            .assembler
            .build_request(&ledger, &PendingTurn::persisted(user_message));
        debug!(
            stage = %ContextBuilt,
            turns = request.turns.len(),
            window = self.assembler.policy_name(),
            "exchange stage reached"
        );

        let response = match self.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, generator = self.generator.name(), "generation failed");
                self.record_failure(conversation, user_message).await;
                return Err(fail(ContextBuilt, e.into()));
            }
        };
        debug!(
            stage = %Generated,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "exchange stage reached"
        );

        let reply = NewMessage::assistant(
            conversation.id.clone(),
            user_message.id,
            response.content,
            MessageStatus::Completed,
        );
        let (stored, replayed) = match self.history.append(&reply).await {
            Ok(stored) => (stored, false),
            // An earlier attempt left a marker, or a concurrent retry answered.
            Err(RepositoryError::Conflict(_)) => self
                .settle_existing(&conversation.id, user_message, &reply.content)
                .await
                .map_err(|e| fail(Generated, e))?,
            Err(e) => {
                warn!(error = %e, "failed to persist assistant reply");
                return Err(fail(Generated, e.into()));
            }
        };
        debug!(
            stage = %AssistantPersisted,
            message_id = %stored.id,
            replayed,
            "exchange stage reached"
        );
        Ok((stored, replayed))
    }

    /// Complete the reply slot another attempt already occupies.
    async fn settle_existing(
        &self,
        conversation_id: &ConversationId,
        user_message: &ChatMessage,
        content: &str,
    ) -> Result<(ChatMessage, bool), ChatError> {
        let missing = || ChatError::Internal("reply conflict without a stored reply".to_string());

        let existing = self
            .history
            .reply_to(conversation_id, &user_message.id)
            .await?
            .ok_or_else(missing)?;
        if existing.is_completed_reply() {
            return Ok((existing, true));
        }
        if let Some(settled) = self.history.settle(conversation_id, &existing.id, content).await? {
            info!(message_id = %settled.id, "retry completed an earlier failed reply");
            return Ok((settled, false));
        }
        self.history
            .completed_reply(conversation_id, &user_message.id)
            .await?
            .map(|winner| (winner, true))
            .ok_or_else(missing)
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let limit = self.settings.generation_timeout;
        let response = tokio::time::timeout(limit, self.generator.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout {
                after_ms: limit.as_millis() as u64,
            })??;
        if response.content.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        Ok(response)
    }

    async fn record_failure(&self, conversation: &Conversation, user_message: &ChatMessage) {
        if !self.settings.persist_failed_marker {
            return;
        }
        let marker = NewMessage::assistant(
            conversation.id.clone(),
            user_message.id,
            self.settings.failure_notice.clone(),
            MessageStatus::Failed,
        );
        match self.history.append(&marker).await {
            Ok(_) => {}
            Err(RepositoryError::Conflict(_)) => {
                debug!(user_message_id = %user_message.id, "user message already has a reply row");
            }
            Err(e) => warn!(error = %e, "failed to persist failure marker"),
        }
    }
}
