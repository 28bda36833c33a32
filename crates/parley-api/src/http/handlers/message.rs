//! Message submission HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/messages                    - Submit, optionally naming a conversation
//! - POST /api/v1/conversations/{id}/messages - Submit to the conversation in the path
//!
//! Both accept an `Idempotency-Key` header as an alternative to the body's
//! `request_id`. Retrying with the same key never appends the user's turn
//! twice.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use parley_core::chat::exchange::{ExchangeOutcome, SubmitMessage};
use parley_types::chat::{ChatMessage, ConversationId};
use parley_types::error::ChatError;

use super::conversation::parse_conversation_id;
use crate::http::error::AppError;
use crate::http::extractors::auth::RequestAuth;
use crate::http::extractors::json::{Validate, ValidatedJson};
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Body of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct SubmitMessageRequest {
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    pub content: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Body of `POST /conversations/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct ConversationMessageRequest {
    pub content: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Result of a completed exchange.
#[derive(Debug, Serialize)]
pub struct SubmitMessageResponse {
    pub conversation_id: ConversationId,
    pub conversation_created: bool,
    /// The reply was stored by an earlier attempt with the same request id.
    pub replayed: bool,
    pub user_message: ChatMessage,
    /// The assistant's reply.
    pub message: ChatMessage,
}

impl From<ExchangeOutcome> for SubmitMessageResponse {
    fn from(outcome: ExchangeOutcome) -> Self {
        Self {
            conversation_id: outcome.conversation.id,
            conversation_created: outcome.conversation_created,
            replayed: outcome.replayed,
            user_message: outcome.user_message,
            message: outcome.assistant_message,
        }
    }
}

fn check_shape(submit: &SubmitMessage) -> Result<(), String> {
    submit.validate().map_err(|e| match e {
        ChatError::InvalidArgument(msg) => msg,
        other => other.to_string(),
    })
}

impl SubmitMessageRequest {
    fn to_submit(&self) -> SubmitMessage {
        SubmitMessage {
            conversation_id: self.conversation_id.clone(),
            content: self.content.clone(),
            request_id: self.request_id.clone(),
        }
    }
}

impl Validate for SubmitMessageRequest {
    fn validate(&self) -> Result<(), String> {
        check_shape(&self.to_submit())
    }
}

impl Validate for ConversationMessageRequest {
    fn validate(&self) -> Result<(), String> {
        check_shape(&SubmitMessage {
            conversation_id: None,
            content: self.content.clone(),
            request_id: self.request_id.clone(),
        })
    }
}

/// Merge the body's request id with the `Idempotency-Key` header.
fn request_id(body: Option<String>, headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let header = match headers.get(IDEMPOTENCY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::Validation("Idempotency-Key must be ASCII".to_string()))?
                .trim()
                .to_string(),
        ),
        None => None,
    };

    match (body, header) {
        (Some(body), Some(header)) if body != header => Err(AppError::Validation(
            "request_id and Idempotency-Key disagree".to_string(),
        )),
        (Some(id), _) | (None, Some(id)) => Ok(Some(id)),
        (None, None) => Ok(None),
    }
}

async fn submit(
    state: &AppState,
    auth: &RequestAuth,
    submit: SubmitMessage,
) -> Result<Json<ApiResponse<SubmitMessageResponse>>, AppError> {
    let clock = RequestClock::start();
    // A header-supplied key has not been through body validation yet.
    submit.validate().map_err(AppError::from)?;

    let outcome = state.chat_service.submit_message(auth, submit).await?;
    let id = outcome.conversation.id.clone();

    Ok(Json(
        clock
            .respond(SubmitMessageResponse::from(outcome))
            .with_link("conversation", &format!("/api/v1/conversations/{id}"))
            .with_link("messages", &format!("/api/v1/conversations/{id}/messages")),
    ))
}

/// POST /api/v1/messages - Submit a message and wait for the reply.
pub async fn submit_message(
    State(state): State<AppState>,
    auth: RequestAuth,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<SubmitMessageRequest>,
) -> Result<Json<ApiResponse<SubmitMessageResponse>>, AppError> {
    let mut request = body.to_submit();
    request.request_id = request_id(body.request_id, &headers)?;
    submit(&state, &auth, request).await
}

/// POST /api/v1/conversations/{id}/messages - Submit to a named conversation.
pub async fn submit_conversation_message(
    State(state): State<AppState>,
    auth: RequestAuth,
    Path(id): Path<String>,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<ConversationMessageRequest>,
) -> Result<Json<ApiResponse<SubmitMessageResponse>>, AppError> {
    let conversation_id = parse_conversation_id(&id)?;
    let request = SubmitMessage {
        conversation_id: Some(conversation_id),
        content: body.content,
        request_id: request_id(body.request_id, &headers)?,
    };
    submit(&state, &auth, request).await
}
