//! Global configuration types for Parley.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! server address, identity policy, generator, context window and failure
//! handling. Every section and field has a default, so an empty file is a
//! valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from `~/.parley/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// What to do when an authenticated principal has no user record yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Create the user on first contact (demo / anonymous deployments).
    #[default]
    AutoProvision,
    /// Reject principals without an existing user.
    RequireExisting,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub policy: IdentityPolicy,
}

/// Which generator backend to build at start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    #[default]
    Gemini,
    /// Deterministic offline generator, for demos and tests.
    Echo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub provider: GeneratorKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Override the provider's default base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Upper bound on a single generation call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: GeneratorKind::default(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            system_prompt: None,
        }
    }
}

/// Context window limits. With neither set, the full history is replayed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub max_turns: Option<usize>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Persist a `failed` assistant marker when generation fails.
    #[serde(default = "default_persist_failed_marker")]
    pub persist_failed_marker: bool,
    /// Content of the failed marker.
    #[serde(default = "default_failure_notice")]
    pub failure_notice: String,
}

fn default_persist_failed_marker() -> bool {
    true
}

fn default_failure_notice() -> String {
    "The assistant could not answer this message.".to_string()
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            persist_failed_marker: default_persist_failed_marker(),
            failure_notice: default_failure_notice(),
        }
    }
}
