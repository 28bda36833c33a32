//! BoxGenerator: object-safe dynamic dispatch wrapper for [`Generator`].
//!
//! 1. `GeneratorDyn` is an object-safe mirror of `Generator` with boxed futures
//! 2. Every `T: Generator` gets `GeneratorDyn` through a blanket impl
//! 3. `BoxGenerator` wraps `Box<dyn GeneratorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use parley_types::llm::{GenerationError, GenerationRequest, GenerationResponse};

use super::generator::Generator;

/// Object-safe version of [`Generator`].
pub trait GeneratorDyn: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResponse, GenerationError>> + Send + 'a>>;
}

impl<T: Generator> GeneratorDyn for T {
    fn name(&self) -> &str {
        Generator::name(self)
    }

    fn model(&self) -> &str {
        Generator::model(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<GenerationResponse, GenerationError>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }
}

/// Type-erased generator, chosen at start-up from configuration.
///
/// `Generator` uses RPITIT and cannot be a trait object itself, so this
/// wrapper exposes the same methods over a `dyn GeneratorDyn`.
pub struct BoxGenerator {
    inner: Box<dyn GeneratorDyn + Send + Sync>,
}

impl BoxGenerator {
    pub fn new<T: Generator + 'static>(generator: T) -> Self {
        Self {
            inner: Box::new(generator),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn model(&self) -> &str {
        self.inner.model()
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        self.inner.generate_boxed(request).await
    }
}

impl std::fmt::Debug for BoxGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxGenerator")
            .field("name", &self.name())
            .field("model", &self.model())
            .finish()
    }
}
