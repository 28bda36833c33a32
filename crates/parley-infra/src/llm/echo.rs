//! EchoGenerator: a deterministic, offline generator.
//!
//! Replies `"Echo: <last request turn>"`. Used for demos without provider
//! credentials and for end-to-end tests.

use parley_core::llm::generator::Generator;
use parley_types::llm::{GenerationError, GenerationRequest, GenerationResponse, Usage};

#[derive(Debug, Clone, Default)]
pub struct EchoGenerator;

impl EchoGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let last = request.last_user_turn().ok_or_else(|| {
            GenerationError::InvalidRequest("request has no user turn".to_string())
        })?;
        let input_chars: usize = request.turns.iter().map(|t| t.content.chars().count()).sum();
        let content = format!("Echo: {last}");

        Ok(GenerationResponse {
            usage: Usage {
                input_tokens: (input_chars / 4) as u32,
                output_tokens: (content.chars().count() / 4) as u32,
            },
            content,
            model: "echo".to_string(),
        })
    }
}
