//! Prompt rendering for agent decisions.
//!
//! Templates are embedded markdown rendered with minijinja. Balances are
//! formatted to two decimals before rendering so prompts stay stable across
//! float noise.

use minijinja::{context, Environment};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const STRATEGY_TEMPLATE: &str = include_str!("prompts/strategy.md");
const STRATEGY_RETRY_TEMPLATE: &str = include_str!("prompts/strategy_retry.md");
const DONATION_TEMPLATE: &str = include_str!("prompts/donation.md");
const CHAT_TEMPLATE: &str = include_str!("prompts/chat.md");

/// Economic parameters rendered into the donor-game system prompt.
#[derive(Debug, Clone, Copy)]
pub struct GameParams {
    pub initial_balance: f64,
    pub donation_multiplier: f64,
    /// Fraction of agents that survive a generation, as a whole percentage.
    pub survivor_percent: u32,
}

/// Inputs for one donation decision prompt.
#[derive(Debug, Clone)]
pub struct DonationPromptInputs<'a> {
    pub name: &'a str,
    pub strategy: &'a str,
    pub generation: u32,
    pub round: u32,
    pub recipient_id: &'a str,
    pub recipient_balance: f64,
    pub recipient_history: &'a str,
    pub donor_balance: f64,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("strategy", STRATEGY_TEMPLATE)
            .expect("strategy template should be valid");
        env.add_template("strategy_retry", STRATEGY_RETRY_TEMPLATE)
            .expect("strategy retry template should be valid");
        env.add_template("donation", DONATION_TEMPLATE)
            .expect("donation template should be valid");
        env.add_template("chat", CHAT_TEMPLATE)
            .expect("chat template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> String {
        let template = self.env.get_template(name).expect("template registered");
        let rendered = template
            .render(ctx)
            .expect("prompt template rendering should not fail");
        rendered.trim().to_string()
    }
}

/// Donor-game system prompt describing the rules of the game.
pub fn render_system(params: &GameParams) -> String {
    PromptEngine::new().render(
        "system",
        context! {
            initial_balance => format_units(params.initial_balance),
            donation_multiplier => trim_float(params.donation_multiplier),
            survivor_percent => params.survivor_percent,
        },
    )
}

/// Strategy-generation prompt; `advice` carries survivor strategies from the
/// previous generation and is absent for the first one.
pub fn render_strategy(name: &str, advice: Option<&str>, survivor_percent: u32) -> String {
    PromptEngine::new().render(
        "strategy",
        context! {
            name => name,
            advice => advice.map(str::trim).filter(|s| !s.is_empty()),
            survivor_percent => survivor_percent,
        },
    )
}

/// Reformulation prompt used after a strategy response missed the marker.
pub fn render_strategy_retry(response: &str) -> String {
    PromptEngine::new().render("strategy_retry", context! { response => response })
}

/// Donation-decision prompt for one pairing.
pub fn render_donation(inputs: &DonationPromptInputs<'_>) -> String {
    PromptEngine::new().render(
        "donation",
        context! {
            name => inputs.name,
            strategy => inputs.strategy,
            generation => inputs.generation,
            round => inputs.round,
            recipient => inputs.recipient_id,
            recipient_balance => format_units(inputs.recipient_balance),
            history => inputs.recipient_history,
            donor_balance => format_units(inputs.donor_balance),
        },
    )
}

/// Free-form chat action prompt built from the agent's task and memory.
pub fn render_chat(name: &str, task: &str, history: Option<&str>) -> String {
    PromptEngine::new().render(
        "chat",
        context! {
            name => name,
            task => task,
            history => history.map(str::trim).filter(|s| !s.is_empty()),
        },
    )
}

fn format_units(value: f64) -> String {
    format!("{value:.2}")
}

/// Render a multiplier without trailing zeros (2 rather than 2.00).
fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
