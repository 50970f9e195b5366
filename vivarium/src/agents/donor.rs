//! Donor-game participant: strategy generation and donation decisions.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::{prompt, AgentError};
use crate::core::memory::MemoryLog;
use crate::core::parse::{extract_strategy, parse_donation_answer};
use crate::providers::CompletionProvider;

/// Everything a donor sees when deciding how much to give.
#[derive(Debug, Clone)]
pub struct DonationContext {
    pub generation: u32,
    /// 1-based round number within the generation.
    pub round: u32,
    pub recipient_id: String,
    pub recipient_balance: f64,
    /// The recipient's recent memory entries, or the no-history sentinel.
    pub recipient_history: String,
    pub donor_balance: f64,
}

/// An agent playing the donor game.
///
/// The environment calls decision methods directly rather than routing
/// through the broker: an economic round is a structured exchange, not
/// free-form chat.
pub struct DonorAgent {
    id: String,
    model: String,
    provider: Arc<dyn CompletionProvider>,
    memory: MemoryLog,
    strategy: RwLock<String>,
    system_prompt: String,
    survivor_percent: u32,
}

impl DonorAgent {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        provider: Arc<dyn CompletionProvider>,
        memory_capacity: usize,
        game: &prompt::GameParams,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            provider,
            memory: MemoryLog::new(memory_capacity),
            strategy: RwLock::new(String::new()),
            system_prompt: prompt::render_system(game),
            survivor_percent: game.survivor_percent,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn memory(&self) -> &MemoryLog {
        &self.memory
    }

    pub fn strategy(&self) -> String {
        self.strategy.read().expect("strategy lock poisoned").clone()
    }

    /// Generate and store a strategy for the coming generation.
    ///
    /// The response must contain a line starting `My strategy will be`; a
    /// response without it gets exactly one reformulation retry before the
    /// generation fails.
    pub async fn generate_strategy(
        &self,
        advice: Option<&str>,
    ) -> Result<String, AgentError> {
        let strategy_prompt = prompt::render_strategy(&self.id, advice, self.survivor_percent);
        let response = self
            .provider
            .complete(&self.model, &strategy_prompt, &self.system_prompt, &[])
            .await?;

        let strategy = match extract_strategy(&response) {
            Some(strategy) => strategy,
            None => {
                debug!(agent = %self.id, "strategy marker missing, retrying once");
                let retry_prompt = prompt::render_strategy_retry(&response);
                let retry_response = self
                    .provider
                    .complete(&self.model, &retry_prompt, &self.system_prompt, &[])
                    .await?;
                extract_strategy(&retry_response).ok_or(AgentError::MissingStrategy {
                    response: retry_response,
                })?
            }
        };

        info!(agent = %self.id, strategy = %strategy, "strategy set");
        *self.strategy.write().expect("strategy lock poisoned") = strategy.clone();
        Ok(strategy)
    }

    /// Decide how many units to give up for this pairing.
    ///
    /// The answer is clamped to the donor's current balance; a response with
    /// no `ANSWER:` line is a parse error the environment records as a failed
    /// donation.
    pub async fn decide_donation(&self, ctx: &DonationContext) -> Result<f64, AgentError> {
        let strategy = self.strategy();
        let decision_prompt = prompt::render_donation(&prompt::DonationPromptInputs {
            name: &self.id,
            strategy: &strategy,
            generation: ctx.generation,
            round: ctx.round,
            recipient_id: &ctx.recipient_id,
            recipient_balance: ctx.recipient_balance,
            recipient_history: &ctx.recipient_history,
            donor_balance: ctx.donor_balance,
        });

        let response = self
            .provider
            .complete(
                &self.model,
                &decision_prompt,
                &self.system_prompt,
                &self.memory.snapshot(),
            )
            .await?;
        debug!(agent = %self.id, response = %response, "donation response");

        let amount = parse_donation_answer(&response)?;
        Ok(amount.min(ctx.donor_balance))
    }
}
