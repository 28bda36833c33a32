//! Generator backends.
//!
//! Concrete implementations of the [`Generator`] trait from `parley-core`,
//! plus [`create_generator`], which builds the configured backend once at
//! start-up.
//!
//! [`Generator`]: parley_core::llm::generator::Generator

pub mod echo;
pub mod gemini;

use parley_core::llm::box_generator::BoxGenerator;
use parley_types::config::{GeneratorConfig, GeneratorKind};
use parley_types::llm::GenerationError;
use secrecy::SecretString;

use self::echo::EchoGenerator;
use self::gemini::GeminiGenerator;

/// Build the configured generator.
///
/// `api_key` is the resolved secret for providers that need one.
///
/// # Errors
///
/// `AuthenticationFailed` when the provider needs a key and none is given,
/// `Transport` when the HTTP client cannot be built.
pub fn create_generator(
    config: &GeneratorConfig,
    api_key: Option<SecretString>,
) -> Result<BoxGenerator, GenerationError> {
    match config.provider {
        GeneratorKind::Gemini => {
            let key = api_key.ok_or(GenerationError::AuthenticationFailed)?;
            let mut generator = GeminiGenerator::new(key, config.model.clone())?;
            if let Some(base_url) = &config.base_url {
                generator = generator.with_base_url(base_url.clone());
            }
            Ok(BoxGenerator::new(generator))
        }
        GeneratorKind::Echo => Ok(BoxGenerator::new(EchoGenerator::new())),
    }
}

/// Read the provider key from the environment variable named in config.
pub fn api_key_from_env(config: &GeneratorConfig) -> Option<SecretString> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}
