//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`, plus an unauthenticated `/health`.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Conversations
        .route(
            "/conversations",
            post(handlers::conversation::create_conversation)
                .get(handlers::conversation::list_conversations),
        )
        .route(
            "/conversations/{id}",
            get(handlers::conversation::get_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(handlers::conversation::list_messages)
                .post(handlers::message::submit_conversation_message),
        )
        // Exchanges
        .route("/messages", post(handlers::message::submit_message));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use parley_core::llm::box_generator::BoxGenerator;
    use parley_infra::llm::echo::EchoGenerator;
    use parley_infra::sqlite::pool::DatabasePool;
    use parley_types::config::{GeneratorKind, GlobalConfig};
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    struct TestApp {
        router: Router,
        state: AppState,
        _dir: TempDir,
    }

    impl TestApp {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let pool = DatabasePool::new(&parley_infra::config::database_url(dir.path()))
                .await
                .unwrap();
            let mut config = GlobalConfig::default();
            config.generator.provider = GeneratorKind::Echo;
            let state = AppState::from_parts(
                pool,
                config,
                BoxGenerator::new(EchoGenerator::new()),
                dir.path().to_path_buf(),
            );
            Self {
                router: build_router(state.clone()),
                state,
                _dir: dir,
            }
        }

        async fn key_for(&self, email: &str) -> String {
            self.state
                .api_keys
                .create_key(email, "test")
                .await
                .unwrap()
                .plaintext
        }

        async fn call(
            &self,
            method: &str,
            uri: &str,
            key: Option<&str>,
            body: Option<Value>,
            extra: &[(&str, &str)],
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(key) = key {
                builder = builder.header("authorization", format!("Bearer {key}"));
            }
            for (name, value) in extra {
                builder = builder.header(*name, *value);
            }
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;
        let (status, body) = app.call("GET", "/health", None, None, &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_or_unknown_key_is_unauthenticated() {
        let app = TestApp::new().await;

        let (status, body) = app
            .call("POST", "/api/v1/messages", None, Some(json!({"content": "Hi"})), &[])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errors"][0]["code"], "UNAUTHENTICATED");

        let (status, _) = app
            .call("GET", "/api/v1/conversations", Some("parley_nope"), None, &[])
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_two_exchanges_then_list() {
        let app = TestApp::new().await;
        let key = app.key_for("u1@example.com").await;

        let (status, first) = app
            .call("POST", "/api/v1/messages", Some(&key), Some(json!({"content": "Hi"})), &[])
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"]["conversation_created"], true);
        assert_eq!(first["data"]["message"]["role"], "assistant");
        assert_eq!(first["data"]["message"]["content"], "Echo: Hi");
        assert_eq!(first["data"]["message"]["status"], "completed");
        let conv = first["data"]["conversation_id"].as_str().unwrap().to_string();

        let (status, second) = app
            .call(
                "POST",
                &format!("/api/v1/conversations/{conv}/messages"),
                Some(&key),
                Some(json!({"content": "How are you?"})),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["data"]["conversation_created"], false);

        let (status, listed) = app
            .call("GET", &format!("/api/v1/conversations/{conv}/messages"), Some(&key), None, &[])
            .await;
        assert_eq!(status, StatusCode::OK);
        let roles: Vec<&str> = listed["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);

        let (_, conversation) = app
            .call("GET", &format!("/api/v1/conversations/{conv}"), Some(&key), None, &[])
            .await;
        assert_eq!(conversation["data"]["title"], "Hi");
    }

    #[tokio::test]
    async fn test_foreign_conversation_forbidden() {
        let app = TestApp::new().await;
        let alice = app.key_for("alice@example.com").await;
        let bob = app.key_for("bob@example.com").await;

        let (_, created) = app
            .call("POST", "/api/v1/conversations", Some(&alice), Some(json!({"title": "Private"})), &[])
            .await;
        let conv = created["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                "POST",
                "/api/v1/messages",
                Some(&bob),
                Some(json!({"conversation_id": conv, "content": "peek"})),
                &[],
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["errors"][0]["code"], "FORBIDDEN");

        let (status, _) = app
            .call("GET", &format!("/api/v1/conversations/{conv}/messages"), Some(&bob), None, &[])
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, listed) = app
            .call("GET", &format!("/api/v1/conversations/{conv}/messages"), Some(&alice), None, &[])
            .await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let app = TestApp::new().await;
        let key = app.key_for("v@example.com").await;

        let (status, body) = app
            .call("POST", "/api/v1/messages", Some(&key), Some(json!({"content": "  "})), &[])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");

        let (status, _) = app
            .call("POST", "/api/v1/messages", Some(&key), Some(json!({"text": "Hi"})), &[])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call("GET", "/api/v1/conversations/bad%20id", Some(&key), None, &[])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call("GET", "/api/v1/conversations?limit=0", Some(&key), None, &[])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_conversation_not_found() {
        let app = TestApp::new().await;
        let key = app.key_for("n@example.com").await;
        let (status, body) = app
            .call("GET", "/api/v1/conversations/nowhere", Some(&key), None, &[])
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_idempotency_key_replays() {
        let app = TestApp::new().await;
        let key = app.key_for("i@example.com").await;
        let body = json!({"conversation_id": "retry-1", "content": "Hi"});
        let header = [("idempotency-key", "req-1")];

        let (_, first) = app
            .call("POST", "/api/v1/messages", Some(&key), Some(body.clone()), &header)
            .await;
        let (status, second) = app
            .call("POST", "/api/v1/messages", Some(&key), Some(body), &header)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["data"]["replayed"], false);
        assert_eq!(second["data"]["replayed"], true);
        assert_eq!(first["data"]["message"]["id"], second["data"]["message"]["id"]);

        let (_, listed) = app
            .call("GET", "/api/v1/conversations/retry-1/messages", Some(&key), None, &[])
            .await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_conversations_listed_newest_first() {
        let app = TestApp::new().await;
        let key = app.key_for("l@example.com").await;
        for title in ["first", "second", "third"] {
            app.call("POST", "/api/v1/conversations", Some(&key), Some(json!({"title": title})), &[])
                .await;
        }
        // Someone else's conversation must not show up.
        let other = app.key_for("other@example.com").await;
        app.call("POST", "/api/v1/conversations", Some(&other), Some(json!({})), &[])
            .await;

        let (_, listed) = app
            .call("GET", "/api/v1/conversations", Some(&key), None, &[])
            .await;
        let titles: Vec<&str> = listed["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }
}
