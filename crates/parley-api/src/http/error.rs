//! Application error type mapping to HTTP status codes and envelope format.
//!
//! Store and internal error text goes to the log only; callers see a generic
//! message. Generation failures carry the already-sanitized reason.

use axum::response::{IntoResponse, Response};
use serde_json::json;

use parley_core::chat::exchange::ExchangeError;
use parley_types::error::ChatError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Engine errors from read/create operations.
    Chat(ChatError),
    /// A failed exchange, with the stage it reached.
    Exchange(ExchangeError),
    /// Malformed request detected at the boundary.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl From<ExchangeError> for AppError {
    fn from(e: ExchangeError) -> Self {
        AppError::Exchange(e)
    }
}

/// Code and caller-safe message for an engine error.
fn describe(error: &ChatError) -> (&'static str, String) {
    match error {
        ChatError::Unauthenticated => (
            "UNAUTHENTICATED",
            "Missing or invalid API key. Provide one via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
        ),
        ChatError::IdentityConflict => (
            "IDENTITY_CONFLICT",
            "No user exists for this principal".to_string(),
        ),
        ChatError::Forbidden => (
            "FORBIDDEN",
            "Conversation belongs to another user".to_string(),
        ),
        ChatError::NotFound => ("NOT_FOUND", "Conversation not found".to_string()),
        ChatError::InvalidArgument(msg) => ("VALIDATION_ERROR", msg.clone()),
        ChatError::GenerationFailed(reason) => (
            "GENERATION_FAILED",
            format!("The assistant could not reply: {reason}"),
        ),
        ChatError::StoreUnavailable(_) => (
            "STORE_UNAVAILABLE",
            "Storage is temporarily unavailable".to_string(),
        ),
        ChatError::Internal(_) => ("INTERNAL_ERROR", "Internal server error".to_string()),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message, details) = match &self {
            AppError::Chat(e) => {
                let (code, message) = describe(e);
                (code, message, None)
            }
            AppError::Exchange(e) => {
                let (code, message) = describe(&e.error);
                let details = json!({
                    "stage": e.stage.to_string(),
                    "conversation_id": e.conversation_id,
                    "user_message_id": e.user_message_id,
                    "user_message_persisted": e.user_message_persisted(),
                });
                (code, message, Some(details))
            }
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone(), None),
        };

        if matches!(code, "STORE_UNAVAILABLE" | "INTERNAL_ERROR") {
            tracing::error!(error = ?self, "request failed");
        }

        ApiResponse::error(code, &message, details).into_response()
    }
}
