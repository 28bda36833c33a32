//! The JSON envelope every endpoint answers with.
//!
//! ```json
//! {
//!   "data": { "conversation_id": "...", "message": { ... } },
//!   "meta": { "request_id": "...", "timestamp": "...", "response_time_ms": 12 },
//!   "errors": [{ "code": "FORBIDDEN", "message": "...", "details": null }],
//!   "_links": { "conversation": "/api/v1/conversations/..." }
//! }
//! ```
//!
//! `data` is absent on failure and `errors` is absent on success.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub meta: ApiMeta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,
    /// Related resources, keyed by relation name.
    #[serde(rename = "_links", skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ApiMeta {
    /// Per-response id, echoed in logs.
    pub request_id: String,
    pub timestamp: String,
    pub response_time_ms: u64,
}

impl ApiMeta {
    fn stamped(request_id: String, response_time_ms: u64) -> Self {
        Self {
            request_id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            response_time_ms,
        }
    }
}

/// One entry of `errors`. `code` is one of the stable upper-case codes
/// mapped by [`status_for_code`].
#[derive(Debug, Serialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Started when a handler begins; stamps the envelope it returns.
pub struct RequestClock {
    start: Instant,
    request_id: String,
}

impl RequestClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            request_id: Uuid::now_v7().to_string(),
        }
    }

    pub fn respond<T: Serialize>(self, data: T) -> ApiResponse<T> {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        ApiResponse::envelope(Some(data), Vec::new(), ApiMeta::stamped(self.request_id, elapsed))
    }
}

impl<T: Serialize> ApiResponse<T> {
    fn envelope(data: Option<T>, errors: Vec<ApiErrorDetail>, meta: ApiMeta) -> Self {
        Self {
            data,
            meta,
            errors,
            links: BTreeMap::new(),
        }
    }

    pub fn with_link(mut self, rel: &str, href: &str) -> Self {
        self.links.insert(rel.to_owned(), href.to_owned());
        self
    }
}

impl ApiResponse<()> {
    /// A failure envelope carrying a single error.
    pub fn error(code: &str, message: &str, details: Option<serde_json::Value>) -> Self {
        let detail = ApiErrorDetail {
            code: code.to_owned(),
            message: message.to_owned(),
            details,
        };
        Self::envelope(
            None,
            vec![detail],
            ApiMeta::stamped(Uuid::now_v7().to_string(), 0),
        )
    }
}

/// HTTP status for an envelope error code. Unknown codes are 500.
pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        "UNAUTHENTICATED" => StatusCode::UNAUTHORIZED,
        "FORBIDDEN" | "IDENTITY_CONFLICT" => StatusCode::FORBIDDEN,
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
        "GENERATION_FAILED" => StatusCode::BAD_GATEWAY,
        "STORE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self
            .errors
            .first()
            .map_or(StatusCode::OK, |e| status_for_code(&e.code));

        match serde_json::to_vec(&self) {
            Ok(body) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response envelope");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let response = RequestClock::start()
            .respond(vec![1, 2])
            .with_link("self", "/api/v1/conversations");
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["data"], serde_json::json!([1, 2]));
        assert!(value.get("errors").is_none());
        assert_eq!(value["_links"]["self"], "/api/v1/conversations");
        assert!(value["meta"]["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn test_error_envelope_status() {
        let response = ApiResponse::error("NOT_FOUND", "Conversation not found", None);
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("data").is_none());
        assert_eq!(value["errors"][0]["code"], "NOT_FOUND");

        assert_eq!(response.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(status_for_code("SOMETHING_ELSE"), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
