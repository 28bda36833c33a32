use thiserror::Error;

use crate::llm::GenerationError;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the chat engine to its callers.
///
/// Every failure path maps to exactly one of these kinds. Messages carried by
/// `StoreUnavailable` and `Internal` are for logs; the API layer replaces
/// them with generic text.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no authenticated principal")]
    Unauthenticated,

    #[error("no user exists for this principal and automatic provisioning is disabled")]
    IdentityConflict,

    #[error("resource belongs to another user")]
    Forbidden,

    #[error("resource not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Unauthenticated => "unauthenticated",
            ChatError::IdentityConflict => "identity_conflict",
            ChatError::Forbidden => "forbidden",
            ChatError::NotFound => "not_found",
            ChatError::InvalidArgument(_) => "invalid_argument",
            ChatError::GenerationFailed(_) => "generation_failed",
            ChatError::StoreUnavailable(_) => "store_unavailable",
            ChatError::Internal(_) => "internal",
        }
    }
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => ChatError::NotFound,
            other => ChatError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<GenerationError> for ChatError {
    fn from(e: GenerationError) -> Self {
        ChatError::GenerationFailed(e.public_reason().to_string())
    }
}
