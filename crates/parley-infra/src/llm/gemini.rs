//! GeminiGenerator: [`Generator`] over the Gemini `generateContent` API.
//!
//! The API key is held as a [`SecretString`] and only exposed when the
//! request header is built.

use std::time::Duration;

use parley_core::llm::generator::Generator;
use parley_types::llm::{
    GenerationError, GenerationRequest, GenerationResponse, PromptTurn, TurnRole, Usage,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Transport-level cap. The orchestrator applies its own, usually tighter,
/// generation timeout on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<Role>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

fn text_content(role: Option<Role>, text: &str) -> Content {
    Content {
        role,
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

impl From<&PromptTurn> for Content {
    fn from(turn: &PromptTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => Role::User,
            TurnRole::Model => Role::Model,
        };
        text_content(Some(role), &turn.content)
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: SecretString, model: String) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
        })
    }

    /// Override the base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn to_wire(request: &GenerationRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: request.turns.iter().map(Content::from).collect(),
            system_instruction: request
                .system
                .as_deref()
                .map(|system| text_content(None, system)),
        }
    }
}

impl Generator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        if request.turns.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "request has no turns".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&Self::to_wire(request))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => GenerationError::AuthenticationFailed,
                400 => GenerationError::InvalidRequest(error_body),
                code => GenerationError::Provider {
                    status: Some(code),
                    message: error_body,
                },
            });
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            GenerationError::Deserialization(format!("failed to parse response: {e}"))
        })?;

        let content = body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyReply);
        }

        let usage = body.usage_metadata.unwrap_or_default();
        Ok(GenerationResponse {
            content,
            model: body.model_version.unwrap_or_else(|| self.model.clone()),
            usage: Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::{Value, json};

    use super::*;

    /// Fake Gemini endpoint: replies with the number of contents it got, or
    /// an error chosen by the model name.
    async fn fake_generate(
        Path(rest): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": 401}})));
        }
        let model = rest.trim_end_matches(":generateContent");
        match model {
            "empty" => (
                StatusCode::OK,
                Json(json!({"candidates": [{"content": {"role": "model", "parts": [{"text": ""}]}}]})),
            ),
            "broken" => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": {"message": "boom"}})),
            ),
            _ => {
                let contents = body["contents"].as_array().map_or(0, |c| c.len());
                let roles: Vec<String> = body["contents"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|c| c["role"].as_str().map(str::to_string))
                    .collect();
                let system = body["systemInstruction"]["parts"][0]["text"]
                    .as_str()
                    .unwrap_or("none")
                    .to_string();
                (
                    StatusCode::OK,
                    Json(json!({
                        "candidates": [{
                            "content": {"role": "model", "parts": [
                                {"text": format!("{contents} turns ")},
                                {"text": format!("{} system={system}", roles.join(","))}
                            ]},
                            "finishReason": "STOP"
                        }],
                        "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3},
                        "modelVersion": model
                    })),
                )
            }
        }
    }

    async fn spawn_fake() -> String {
        let app = Router::new().route("/v1beta/models/{*rest}", post(fake_generate));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn generator(base: &str, model: &str, key: &str) -> GeminiGenerator {
        GeminiGenerator::new(SecretString::from(key.to_string()), model.to_string())
            .unwrap()
            .with_base_url(base.to_string())
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            turns: vec![
                PromptTurn::user("Hi"),
                PromptTurn::model("Hello"),
                PromptTurn::user("How are you?"),
            ],
            system: Some("Be brief.".to_string()),
        }
    }

    #[test]
    fn test_wire_format() {
        let wire = serde_json::to_value(GeminiGenerator::to_wire(&request())).unwrap();
        assert_eq!(wire["contents"][1]["role"], "model");
        assert_eq!(wire["contents"][2]["parts"][0]["text"], "How are you?");
        assert_eq!(wire["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert!(wire["systemInstruction"].get("role").is_none());
    }

    #[tokio::test]
    async fn test_generate_success() {
        let base = spawn_fake().await;
        let response = generator(&base, "gemini-test", "test-key")
            .generate(&request())
            .await
            .unwrap();
        assert_eq!(response.content, "3 turns user,model,user system=Be brief.");
        assert_eq!(response.model, "gemini-test");
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 3);
    }

    #[tokio::test]
    async fn test_generate_errors() {
        let base = spawn_fake().await;

        let err = generator(&base, "gemini-test", "wrong-key")
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::AuthenticationFailed));

        let err = generator(&base, "empty", "test-key")
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyReply));

        let err = generator(&base, "broken", "test-key")
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Provider { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_unreachable_is_transport_error() {
        let err = generator("http://127.0.0.1:9", "gemini-test", "test-key")
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }
}
