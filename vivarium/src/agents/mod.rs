//! Agent types and the capability seam environments drive them through.

mod chat;
mod donor;
pub mod prompt;

pub use chat::{ChatAgent, ChatAgentConfig};
pub use donor::{DonationContext, DonorAgent};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::parse::ParseError;
use crate::messaging::BrokerError;
use crate::providers::ProviderError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("completion failed: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no strategy marker in response after retry: {response:?}")]
    MissingStrategy { response: String },
    #[error("message send failed: {0}")]
    Broker(#[from] BrokerError),
}

/// An autonomous participant in an environment.
///
/// `act` produces a textual action from context the agent builds out of its
/// own memory; environments fan these calls out concurrently and treat
/// per-agent failures as isolated.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn id(&self) -> &str;

    async fn act(&self) -> Result<String, AgentError>;

    /// Teardown hook invoked when an environment discards the agent
    /// (removal or reset). Default: nothing to release.
    fn on_removed(&self) {}
}
