//! Completion-provider boundary.
//!
//! The core treats model completion as an opaque capability with unspecified
//! latency. Providers are constructed once at startup and passed around as
//! `Arc<dyn CompletionProvider>` handles, so tests substitute scripted fakes
//! without touching global state.

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned status {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} response contained no completion text")]
    EmptyCompletion { provider: &'static str },
    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

/// Opaque completion capability.
///
/// `history` entries are prior utterances of the same agent, presented to the
/// model as its own previous turns. Implementations must tolerate arbitrary
/// response text; callers own the parsing.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name for logs and errors.
    fn name(&self) -> &'static str;

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        system_prompt: &str,
        history: &[String],
    ) -> Result<String, ProviderError>;
}
