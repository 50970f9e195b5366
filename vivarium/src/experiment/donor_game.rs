//! Generational donor-game orchestrator.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::agents::prompt::GameParams;
use crate::agents::DonorAgent;
use crate::cancel::StopSignal;
use crate::core::stats::GenerationStats;
use crate::env::{DonorGameEnvironment, DonorGameState, Environment};
use crate::io::stats::StatsSink;
use crate::providers::CompletionProvider;

/// Knobs for the generational loop; the economic parameters live on the
/// environment itself.
#[derive(Debug, Clone)]
pub struct DonorGameExperimentConfig {
    pub num_agents: usize,
    pub num_generations: u32,
    /// Fraction of agents whose strategies seed the next generation.
    pub survivor_ratio: f64,
    pub model: String,
    pub memory_capacity: usize,
}

/// Runs the donor game across generations: fresh cohorts play a fixed number
/// of rounds, the best performers' strategies become advice for the next
/// cohort.
pub struct DonorGameExperiment<S: StatsSink> {
    env: Arc<DonorGameEnvironment>,
    provider: Arc<dyn CompletionProvider>,
    config: DonorGameExperimentConfig,
    game: GameParams,
    sink: S,
}

impl<S: StatsSink> DonorGameExperiment<S> {
    pub fn new(
        env: Arc<DonorGameEnvironment>,
        provider: Arc<dyn CompletionProvider>,
        config: DonorGameExperimentConfig,
        sink: S,
    ) -> Self {
        let game = GameParams {
            initial_balance: env.initial_balance(),
            donation_multiplier: env.donation_multiplier(),
            survivor_percent: (config.survivor_ratio * 100.0).round() as u32,
        };
        Self {
            env,
            provider,
            config,
            game,
            sink,
        }
    }

    /// Run all generations. Structural failures abort the experiment;
    /// individual decision failures only surface in the statistics.
    pub async fn run(&mut self, stop: &StopSignal) -> Result<()> {
        let mut advice: Option<String> = None;

        for generation in 1..=self.config.num_generations {
            if stop.is_stopped() {
                anyhow::bail!("experiment stopped before generation {generation}");
            }
            info!(generation, "initializing generation");
            self.spawn_cohort(generation, advice.as_deref()).await?;

            let rounds = self.env.rounds_per_generation();
            for round in 1..=rounds {
                info!(generation, round, of = rounds, "running round");
                self.env
                    .step(stop)
                    .await
                    .with_context(|| format!("generation {generation}, round {round}"))?;
            }

            let state = self.env.state().await;
            let stats = GenerationStats::from_ledger(
                &state.resources,
                state.successful_donations,
                state.failed_donations,
            );
            log_generation_stats(generation, &stats);
            self.sink
                .record(generation, &stats)
                .context("record generation stats")?;

            if generation < self.config.num_generations {
                advice = Some(self.survivor_advice(&state).await);
            }
        }
        Ok(())
    }

    /// Reset the environment and populate it with a fresh, strategy-seeded
    /// cohort.
    async fn spawn_cohort(&self, generation: u32, advice: Option<&str>) -> Result<()> {
        self.env.reset().await;
        self.env.set_generation(generation).await;

        for index in 0..self.config.num_agents {
            let agent = Arc::new(DonorAgent::new(
                format!("{generation}_{index}"),
                &self.config.model,
                Arc::clone(&self.provider),
                self.config.memory_capacity,
                &self.game,
            ));
            agent
                .generate_strategy(advice)
                .await
                .with_context(|| format!("generate strategy for agent {}", agent.id()))?;
            self.env
                .add_agent(agent)
                .await
                .context("add agent to environment")?;
        }
        Ok(())
    }

    fn survivor_count(&self) -> usize {
        (self.config.num_agents as f64 * self.config.survivor_ratio) as usize
    }

    /// Collect the survivors' strategies (with final scores) as advice text
    /// for the next generation.
    async fn survivor_advice(&self, state: &DonorGameState) -> String {
        let survivors = self.env.top_agents(self.survivor_count()).await;
        let agents = self.env.agents().await;

        let lines: Vec<String> = survivors
            .iter()
            .filter_map(|id| {
                let agent = agents.iter().find(|a| a.id() == id.as_str())?;
                let resources = state.resources.get(id).copied().unwrap_or(0.0);
                Some(format!(
                    "Agent {id} ({resources:.2} resources): {}",
                    agent.strategy()
                ))
            })
            .collect();

        format!(
            "Successful strategies from previous generation:\n{}",
            lines.join("\n")
        )
    }
}

fn log_generation_stats(generation: u32, stats: &GenerationStats) {
    info!(
        generation,
        total = format!("{:.2}", stats.total_resources),
        average = format!("{:.2}", stats.average_resources),
        std_dev = format!("{:.2}", stats.std_dev),
        inequality = format!("{:.2}", stats.inequality),
        successful = stats.successful_donations,
        failed = stats.failed_donations,
        success_rate = format!("{:.1}%", stats.success_rate_percent()),
        "generation statistics"
    );
}
