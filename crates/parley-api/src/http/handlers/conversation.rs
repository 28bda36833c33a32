//! Conversation HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/conversations                - Create an empty conversation
//! - GET  /api/v1/conversations                - List the caller's conversations
//! - GET  /api/v1/conversations/{id}           - Get one conversation
//! - GET  /api/v1/conversations/{id}/messages  - List its messages, oldest first

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use parley_types::chat::{ChatMessage, Conversation, ConversationId};

use crate::http::error::AppError;
use crate::http::extractors::auth::RequestAuth;
use crate::http::extractors::json::{Validate, ValidatedJson};
use crate::http::extractors::query::PageQuery;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// Longest accepted explicit title, in characters.
pub const MAX_TITLE_LEN: usize = 200;

const DEFAULT_CONVERSATION_PAGE: i64 = 50;

/// Request body for creating a conversation.
#[derive(Debug, Deserialize, Default)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

impl Validate for CreateConversationRequest {
    fn validate(&self) -> Result<(), String> {
        match &self.title {
            Some(title) if title.chars().count() > MAX_TITLE_LEN => {
                Err(format!("title must be at most {MAX_TITLE_LEN} characters"))
            }
            _ => Ok(()),
        }
    }
}

/// Parse a conversation id from a path parameter.
pub(crate) fn parse_conversation_id(raw: &str) -> Result<ConversationId, AppError> {
    raw.parse()
        .map_err(|e| AppError::Validation(format!("invalid conversation id: {e}")))
}

/// POST /api/v1/conversations - Create a conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: RequestAuth,
    ValidatedJson(body): ValidatedJson<CreateConversationRequest>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let clock = RequestClock::start();

    let conversation = state
        .chat_service
        .create_conversation(&auth, body.title.as_deref())
        .await?;

    tracing::info!(conversation_id = %conversation.id, "conversation created");
    let links = conversation_links(&conversation.id);
    Ok(Json(with_links(clock.respond(conversation), &links)))
}

/// GET /api/v1/conversations - List the caller's conversations, newest first.
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: RequestAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Conversation>>>, AppError> {
    let clock = RequestClock::start();
    let (limit, offset) = query.bounds(Some(DEFAULT_CONVERSATION_PAGE))?;

    let conversations = state
        .chat_service
        .list_conversations(&auth, limit, offset)
        .await?;

    Ok(Json(
        clock
            .respond(conversations)
            .with_link("self", "/api/v1/conversations"),
    ))
}

/// GET /api/v1/conversations/{id} - Get a conversation the caller owns.
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: RequestAuth,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Conversation>>, AppError> {
    let clock = RequestClock::start();
    let id = parse_conversation_id(&id)?;

    let conversation = state.chat_service.get_conversation(&auth, &id).await?;

    let links = conversation_links(&conversation.id);
    Ok(Json(with_links(clock.respond(conversation), &links)))
}

/// GET /api/v1/conversations/{id}/messages - The ledger, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    auth: RequestAuth,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, AppError> {
    let clock = RequestClock::start();
    let id = parse_conversation_id(&id)?;
    let (limit, offset) = query.bounds(None)?;

    let messages = state
        .chat_service
        .list_messages(&auth, &id, limit, offset)
        .await?;

    Ok(Json(
        clock
            .respond(messages)
            .with_link("self", &format!("/api/v1/conversations/{id}/messages"))
            .with_link("conversation", &format!("/api/v1/conversations/{id}")),
    ))
}

fn conversation_links(id: &ConversationId) -> [(&'static str, String); 2] {
    [
        ("self", format!("/api/v1/conversations/{id}")),
        ("messages", format!("/api/v1/conversations/{id}/messages")),
    ]
}

fn with_links<T: serde::Serialize>(
    mut response: ApiResponse<T>,
    links: &[(&'static str, String)],
) -> ApiResponse<T> {
    for (rel, href) in links {
        response = response.with_link(rel, href);
    }
    response
}
