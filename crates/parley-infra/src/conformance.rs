//! End-to-end engine properties, run against every store adapter.
//!
//! Each suite wires a real store into `ExchangeOrchestrator` with the echo
//! generator (or an always-failing one) and checks the observable ledger.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parley_core::chat::orchestrator::{EngineOptions, ExchangeOrchestrator, ExchangeSettings};
use parley_core::llm::box_generator::BoxGenerator;
use parley_core::llm::generator::Generator;
use parley_types::identity::Principal;
use parley_types::llm::{GenerationError, GenerationRequest, GenerationResponse};

use crate::llm::echo::EchoGenerator;
use crate::memory::InMemoryStore;
use crate::sqlite::conversation::SqliteConversationRepository;
use crate::sqlite::message::SqliteMessageRepository;
use crate::sqlite::test_pool;
use crate::sqlite::user::SqliteUserRepository;

struct Unreachable;

impl Generator for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn model(&self) -> &str {
        "none"
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        Err(GenerationError::Transport("connection refused".to_string()))
    }
}

/// Fails until told to recover, then echoes.
#[derive(Clone)]
struct Outage {
    down: Arc<AtomicBool>,
    echo: Arc<EchoGenerator>,
}

impl Outage {
    fn new() -> Self {
        Self {
            down: Arc::new(AtomicBool::new(true)),
            echo: Arc::new(EchoGenerator::new()),
        }
    }

    fn recover(&self) {
        self.down.store(false, Ordering::SeqCst);
    }
}

impl Generator for Outage {
    fn name(&self) -> &str {
        "outage"
    }

    fn model(&self) -> &str {
        self.echo.model()
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(GenerationError::Transport("connection reset".to_string()));
        }
        self.echo.generate(request).await
    }
}

fn echo() -> BoxGenerator {
    BoxGenerator::new(EchoGenerator::new())
}

fn failing() -> BoxGenerator {
    BoxGenerator::new(Unreachable)
}

fn principal(email: &str) -> Principal {
    Principal::new(email)
}

fn options(exchange: ExchangeSettings) -> EngineOptions {
    EngineOptions {
        exchange,
        ..Default::default()
    }
}

async fn sqlite_engine(
    generator: BoxGenerator,
    exchange: ExchangeSettings,
) -> ExchangeOrchestrator<SqliteUserRepository, SqliteConversationRepository, SqliteMessageRepository>
{
    let pool = test_pool::fresh().await;
    ExchangeOrchestrator::new(
        SqliteUserRepository::new(pool.clone()),
        SqliteConversationRepository::new(pool.clone()),
        SqliteMessageRepository::new(pool),
        Arc::new(generator),
        options(exchange),
    )
}

async fn memory_engine(
    generator: BoxGenerator,
    exchange: ExchangeSettings,
) -> ExchangeOrchestrator<InMemoryStore, InMemoryStore, InMemoryStore> {
    let store = InMemoryStore::new();
    ExchangeOrchestrator::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(generator),
        options(exchange),
    )
}

macro_rules! conformance_suite {
    ($suite:ident, $engine:ident) => {
        mod $suite {
            use parley_core::chat::exchange::{ExchangeStage, SubmitMessage};
            use parley_core::chat::orchestrator::ExchangeSettings;
            use parley_types::chat::{ConversationId, MessageRole, MessageStatus};
            use parley_types::error::ChatError;

            use super::*;

            #[tokio::test]
            async fn test_two_exchange_scenario() {
                let exchange = $engine(echo(), ExchangeSettings::default()).await;
                let u1 = principal("u1@example.com");

                let first = exchange.submit(&u1, SubmitMessage::new("Hi")).await.unwrap();
                assert!(first.conversation_created);
                assert_eq!(first.user_message.content, "Hi");
                assert_eq!(first.assistant_message.content, "Echo: Hi");

                let conv = first.conversation.id.clone();
                exchange
                    .submit(&u1, SubmitMessage::new("How are you?").in_conversation(conv.clone()))
                    .await
                    .unwrap();

                let ledger = exchange.history().list(&conv).await.unwrap();
                let roles: Vec<MessageRole> = ledger.iter().map(|m| m.role).collect();
                assert_eq!(
                    roles,
                    vec![
                        MessageRole::User,
                        MessageRole::Assistant,
                        MessageRole::User,
                        MessageRole::Assistant
                    ]
                );
                assert_eq!(ledger[2].content, "How are you?");
                assert_eq!(ledger[3].content, "Echo: How are you?");
                assert!(ledger.iter().all(|m| m.status == MessageStatus::Completed));
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn test_concurrent_submits_keep_ledger_gap_free() {
                let exchange = $engine(echo(), ExchangeSettings::default()).await;
                let conv: ConversationId = "crowded".parse().unwrap();
                let n = 12;

                let calls = (0..n).map(|i| {
                    let exchange = exchange.clone();
                    let conv = conv.clone();
                    async move {
                        exchange
                            .submit(
                                &principal("busy@example.com"),
                                SubmitMessage::new(format!("message {i}")).in_conversation(conv),
                            )
                            .await
                            .unwrap()
                    }
                });
                let outcomes = futures_util::future::join_all(calls).await;
                assert_eq!(outcomes.iter().filter(|o| o.conversation_created).count(), 1);

                let ledger = exchange.history().list(&conv).await.unwrap();
                assert_eq!(ledger.len(), 2 * n);
                assert_eq!(
                    ledger.iter().map(|m| m.seq).collect::<Vec<_>>(),
                    (1..=(2 * n) as u64).collect::<Vec<_>>()
                );
                assert!(ledger.windows(2).all(|w| w[0].created_at < w[1].created_at));
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn test_concurrent_first_messages_share_one_conversation() {
                let exchange = $engine(echo(), ExchangeSettings::default()).await;
                let handle: ConversationId = "brand-new".parse().unwrap();
                let k = 8;

                let calls = (0..k).map(|i| {
                    let exchange = exchange.clone();
                    let handle = handle.clone();
                    async move {
                        exchange
                            .submit(
                                &principal("racer@example.com"),
                                SubmitMessage::new(format!("first {i}")).in_conversation(handle),
                            )
                            .await
                            .unwrap()
                    }
                });
                let outcomes = futures_util::future::join_all(calls).await;

                assert!(outcomes.iter().all(|o| o.conversation.id == handle));
                assert_eq!(outcomes.iter().filter(|o| o.conversation_created).count(), 1);

                let user = exchange
                    .identity()
                    .resolve(Some(&principal("racer@example.com")))
                    .await
                    .unwrap();
                let owned = exchange
                    .conversations()
                    .list_owned(&user.id, None, None)
                    .await
                    .unwrap();
                assert_eq!(owned.len(), 1);
            }

            #[tokio::test]
            async fn test_foreign_conversation_is_forbidden() {
                let exchange = $engine(echo(), ExchangeSettings::default()).await;
                let owner = exchange
                    .submit(&principal("a@example.com"), SubmitMessage::new("mine"))
                    .await
                    .unwrap();
                let conv = owner.conversation.id.clone();

                let err = exchange
                    .submit(
                        &principal("b@example.com"),
                        SubmitMessage::new("hello?").in_conversation(conv.clone()),
                    )
                    .await
                    .unwrap_err();
                assert!(matches!(err.error, ChatError::Forbidden));
                assert!(!err.user_message_persisted());
                assert_eq!(exchange.history().list(&conv).await.unwrap().len(), 2);
            }

            #[tokio::test]
            async fn test_generation_failure_keeps_user_turn() {
                let exchange = $engine(failing(), ExchangeSettings::default()).await;
                let err = exchange
                    .submit(&principal("a@example.com"), SubmitMessage::new("Hi"))
                    .await
                    .unwrap_err();
                assert!(matches!(err.error, ChatError::GenerationFailed(_)));
                assert_eq!(err.stage, ExchangeStage::ContextBuilt);

                let conv = err.conversation_id.clone().unwrap();
                let ledger = exchange.history().list(&conv).await.unwrap();
                assert_eq!(ledger.len(), 2);
                assert_eq!(ledger[0].role, MessageRole::User);
                assert_eq!(Some(ledger[0].id), err.user_message_id);
                assert_eq!(ledger[1].status, MessageStatus::Failed);
                assert!(!ledger.iter().any(|m| m.is_completed_reply()));
            }

            #[tokio::test]
            async fn test_generation_failure_without_marker() {
                let settings = ExchangeSettings {
                    persist_failed_marker: false,
                    ..Default::default()
                };
                let exchange = $engine(failing(), settings).await;
                let err = exchange
                    .submit(&principal("a@example.com"), SubmitMessage::new("Hi"))
                    .await
                    .unwrap_err();

                let ledger = exchange
                    .history()
                    .list(&err.conversation_id.unwrap())
                    .await
                    .unwrap();
                assert_eq!(ledger.len(), 1);
                assert_eq!(ledger[0].content, "Hi");
            }

            #[tokio::test]
            async fn test_request_id_replays_stored_reply() {
                let exchange = $engine(echo(), ExchangeSettings::default()).await;
                let request = SubmitMessage::new("Hi")
                    .in_conversation("replay".parse().unwrap())
                    .with_request_id("req-1");
                let alice = principal("alice@example.com");

                let first = exchange.submit(&alice, request.clone()).await.unwrap();
                let second = exchange.submit(&alice, request).await.unwrap();
                assert!(second.replayed);
                assert_eq!(first.assistant_message.id, second.assistant_message.id);
                assert_eq!(
                    exchange.history().list(&first.conversation.id).await.unwrap().len(),
                    2
                );
            }

            #[tokio::test]
            async fn test_failed_retries_leave_one_reply_per_user_message() {
                let outage = Outage::new();
                let exchange =
                    $engine(BoxGenerator::new(outage.clone()), ExchangeSettings::default()).await;
                let alice = principal("alice@example.com");
                let request = SubmitMessage::new("Hi")
                    .in_conversation("c".parse().unwrap())
                    .with_request_id("r1");

                for _ in 0..3 {
                    let err = exchange.submit(&alice, request.clone()).await.unwrap_err();
                    assert!(matches!(err.error, ChatError::GenerationFailed(_)));
                }
                outage.recover();
                let outcome = exchange.submit(&alice, request).await.unwrap();

                let ledger = exchange.history().list(&outcome.conversation.id).await.unwrap();
                let shape: Vec<(MessageRole, MessageStatus)> =
                    ledger.iter().map(|m| (m.role, m.status)).collect();
                assert_eq!(
                    shape,
                    vec![
                        (MessageRole::User, MessageStatus::Completed),
                        (MessageRole::Assistant, MessageStatus::Completed)
                    ]
                );
                assert_eq!(ledger[1].id, outcome.assistant_message.id);
                assert_eq!(ledger[1].content, "Echo: Hi");
            }

            #[tokio::test]
            async fn test_retry_without_handle_resolves_first_conversation() {
                let outage = Outage::new();
                let exchange =
                    $engine(BoxGenerator::new(outage.clone()), ExchangeSettings::default()).await;
                let alice = principal("alice@example.com");
                let request = SubmitMessage::new("Hi").with_request_id("lost-1");

                let err = exchange.submit(&alice, request.clone()).await.unwrap_err();
                assert!(err.user_message_persisted());
                outage.recover();

                let retried = exchange.submit(&alice, request.clone()).await.unwrap();
                assert!(!retried.conversation_created);
                assert_eq!(Some(retried.conversation.id.clone()), err.conversation_id);
                assert_eq!(Some(retried.user_message.id), err.user_message_id);

                let replay = exchange.submit(&alice, request).await.unwrap();
                assert!(replay.replayed);
                assert_eq!(replay.assistant_message.id, retried.assistant_message.id);

                let user = exchange.identity().resolve(Some(&alice)).await.unwrap();
                let owned = exchange
                    .conversations()
                    .list_owned(&user.id, None, None)
                    .await
                    .unwrap();
                assert_eq!(owned.len(), 1);
                assert_eq!(
                    exchange.history().list(&retried.conversation.id).await.unwrap().len(),
                    2
                );
            }

            #[tokio::test]
            async fn test_derived_titles() {
                let exchange = $engine(echo(), ExchangeSettings::default()).await;
                let alice = principal("alice@example.com");

                let short = exchange.submit(&alice, SubmitMessage::new("Hello")).await.unwrap();
                assert_eq!(short.conversation.title, "Hello");

                let seed = "x".repeat(60);
                let long = exchange.submit(&alice, SubmitMessage::new(seed)).await.unwrap();
                assert_eq!(long.conversation.title, format!("{}...", "x".repeat(25)));
            }
        }
    };
}

conformance_suite!(sqlite_store, sqlite_engine);
conformance_suite!(memory_store, memory_engine);
