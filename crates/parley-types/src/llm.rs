//! Generator request/response types for Parley.
//!
//! These model the data shapes handed to the generative-model capability:
//! an ordered list of prompt turns in, a single text reply out.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a turn in a prompt.
///
/// Ledger `user` messages map to `User` (the request role) and ledger
/// `assistant` messages map to `Model` (the response role).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Model => write!(f, "model"),
        }
    }
}

/// A single turn in the context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTurn {
    pub role: TurnRole,
    pub content: String,
}

impl PromptTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            content: content.into(),
        }
    }
}

/// Request to a generator for one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Ordered turns; the last one is always a `User` turn.
    pub turns: Vec<PromptTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl GenerationRequest {
    /// Content of the final request turn, if any.
    pub fn last_user_turn(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
    }
}

/// Token usage reported by a generator, when it reports any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A generator's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
}

/// Errors from generator operations.
///
/// Display strings may contain provider text and are meant for logs only;
/// use [`GenerationError::public_reason`] for anything user-facing.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("provider error (status {status:?}): {message}")]
    Provider { status: Option<u16>, message: String },

    #[error("generation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("generator returned an empty reply")]
    EmptyReply,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GenerationError {
    /// A short reason that is safe to show to end users.
    pub fn public_reason(&self) -> &'static str {
        match self {
            GenerationError::Timeout { .. } => "the model did not respond in time",
            GenerationError::EmptyReply => "the model returned an empty reply",
            GenerationError::AuthenticationFailed => "the model provider rejected our credentials",
            GenerationError::Transport(_) => "the model provider could not be reached",
            GenerationError::Provider { .. }
            | GenerationError::Deserialization(_)
            | GenerationError::InvalidRequest(_) => "the model provider returned an error",
        }
    }
}
