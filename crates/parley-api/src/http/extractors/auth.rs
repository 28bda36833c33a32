//! API key authentication extractor.
//!
//! Extracts API keys from:
//! - `Authorization: Bearer <key>` header
//! - `X-API-Key: <key>` header
//!
//! The key is looked up by its SHA-256 hash and resolved to the principal it
//! was issued for. A missing or unknown key is not rejected here: the request
//! carries no principal and the engine answers `Unauthenticated`, so every
//! route reports identity failures the same way.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use parley_core::auth::AuthContext;
use parley_types::error::ChatError;
use parley_types::identity::Principal;

use crate::http::error::AppError;
use crate::state::AppState;

/// The caller's identity for one request.
#[derive(Debug, Clone)]
pub struct RequestAuth(Option<Principal>);

impl AuthContext for RequestAuth {
    fn current_principal(&self) -> Option<Principal> {
        self.0.clone()
    }
}

impl FromRequestParts<AppState> for RequestAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(api_key) = extract_api_key(parts) else {
            return Ok(RequestAuth(None));
        };

        let principal = state
            .api_keys
            .principal_for_key(&api_key)
            .await
            .map_err(|e| AppError::Chat(ChatError::from(e)))?;
        if principal.is_none() {
            tracing::debug!("unknown API key presented");
        }
        Ok(RequestAuth(principal))
    }
}

/// Extract the API key from request headers.
///
/// Headers that are not valid ASCII count as absent.
fn extract_api_key(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|key| key.trim().to_string());

    bearer
        .or_else(|| {
            parts
                .headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(|key| key.trim().to_string())
        })
        .filter(|key| !key.is_empty())
}
