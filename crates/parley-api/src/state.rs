//! Application state wiring the engine to its concrete adapters.
//!
//! AppState holds the service instances used by both the CLI and the REST
//! API. `ChatService` is generic over the repository traits; AppState pins it
//! to the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use parley_core::chat::service::ChatService;
use parley_core::llm::box_generator::BoxGenerator;
use parley_core::llm::generator::Generator;
use parley_infra::config::{database_url, load_global_config, resolve_data_dir};
use parley_infra::llm::{api_key_from_env, create_generator};
use parley_infra::sqlite::api_key::SqliteApiKeyRepository;
use parley_infra::sqlite::conversation::SqliteConversationRepository;
use parley_infra::sqlite::message::SqliteMessageRepository;
use parley_infra::sqlite::pool::DatabasePool;
use parley_infra::sqlite::user::SqliteUserRepository;
use parley_types::config::GlobalConfig;
use parley_types::llm::{GenerationError, GenerationRequest, GenerationResponse};

/// Chat service pinned to the SQLite store.
pub type ConcreteChatService =
    ChatService<SqliteUserRepository, SqliteConversationRepository, SqliteMessageRepository>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub api_keys: SqliteApiKeyRepository,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    /// Why the configured generator could not be built.
    pub generator_error: Option<String>,
}

impl AppState {
    /// Resolve the data dir, load config, open the database and build the
    /// generator.
    ///
    /// A generator that cannot be built (usually a missing API key) does not
    /// fail start-up: read-only commands still work, and `require_generator`
    /// reports the problem to the commands that need one.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open database")?;

        let (generator, generator_error) =
            match create_generator(&config.generator, api_key_from_env(&config.generator)) {
                Ok(generator) => (generator, None),
                Err(e) => {
                    let reason = match e {
                        GenerationError::AuthenticationFailed => format!(
                            "no API key found in ${} (or set provider = \"echo\" in config.toml)",
                            config.generator.api_key_env
                        ),
                        other => other.to_string(),
                    };
                    tracing::warn!(reason = %reason, "generator unavailable");
                    (BoxGenerator::new(Unconfigured), Some(reason))
                }
            };

        let mut state = Self::from_parts(db_pool, config, generator, data_dir);
        state.generator_error = generator_error;
        Ok(state)
    }

    /// Wire state from already-built parts.
    pub fn from_parts(
        db_pool: DatabasePool,
        config: GlobalConfig,
        generator: BoxGenerator,
        data_dir: PathBuf,
    ) -> Self {
        let chat_service = ChatService::from_config(
            SqliteUserRepository::new(db_pool.clone()),
            SqliteConversationRepository::new(db_pool.clone()),
            SqliteMessageRepository::new(db_pool.clone()),
            Arc::new(generator),
            &config,
        );

        Self {
            chat_service: Arc::new(chat_service),
            api_keys: SqliteApiKeyRepository::new(db_pool.clone()),
            config: Arc::new(config),
            data_dir,
            db_pool,
            generator_error: None,
        }
    }

    /// Fail unless a working generator was configured.
    pub fn require_generator(&self) -> anyhow::Result<()> {
        match &self.generator_error {
            Some(reason) => anyhow::bail!("generator unavailable: {reason}"),
            None => Ok(()),
        }
    }
}

/// Stand-in when the configured generator could not be built.
struct Unconfigured;

impl Generator for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn model(&self) -> &str {
        "none"
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        Err(GenerationError::AuthenticationFailed)
    }
}
