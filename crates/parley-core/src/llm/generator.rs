//! Generator trait definition.
//!
//! The generative model is an external, possibly slow and flaky dependency.
//! The engine only ever talks to it through this trait; concrete backends
//! (Gemini, echo) live in parley-infra.

use parley_types::llm::{GenerationError, GenerationRequest, GenerationResponse};

/// A backend that produces one reply for an ordered list of prompt turns.
///
/// Uses native async fn in traits (RPITIT). Wrap implementations in
/// [`BoxGenerator`](super::box_generator::BoxGenerator) for runtime selection.
pub trait Generator: Send + Sync {
    /// Human-readable backend name (e.g., "gemini", "echo").
    fn name(&self) -> &str;

    /// Model identifier the backend calls.
    fn model(&self) -> &str;

    /// Produce a reply. Implementations should not apply their own retries.
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl std::future::Future<Output = Result<GenerationResponse, GenerationError>> + Send;
}
