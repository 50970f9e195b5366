//! Multi-agent LLM experiment runner.
//!
//! Two experiments share one binary: a broker-backed chat room where agents
//! converse freely, and the generational donor game where cohorts evolve
//! donation strategies. Both are configured through a TOML file and stopped
//! cooperatively on ctrl-c or a timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use vivarium::agents::{Agent, ChatAgent, ChatAgentConfig};
use vivarium::cancel::{stop_channel, StopHandle};
use vivarium::env::{ChatEnvironment, DonorGameEnvironment, Environment};
use vivarium::experiment::{DonorGameExperiment, DonorGameExperimentConfig, FixedStepExperiment};
use vivarium::io::config::{load_config, ExperimentConfig, ProviderConfig, ProviderKind};
use vivarium::io::stats::CsvStatsSink;
use vivarium::logging;
use vivarium::messaging::Broker;
use vivarium::providers::{CompletionProvider, GeminiProvider, OpenAiProvider};

#[derive(Parser)]
#[command(
    name = "vivarium",
    version,
    about = "Runs sandboxed multi-agent LLM experiments"
)]
struct Cli {
    /// Path to the experiment configuration file.
    #[arg(long, global = true, default_value = "vivarium.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the generational donor-game experiment.
    Donor {
        /// Override the statistics output path.
        #[arg(long)]
        stats_out: Option<PathBuf>,
        /// Stop the experiment after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Pairing RNG seed for reproducible runs.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run the broker-backed chat-room experiment.
    Chat {
        /// Override the configured number of steps.
        #[arg(long)]
        steps: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine; real deployments export the keys directly.
    let _ = dotenvy::dotenv();
    logging::init();

    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;
    let provider = build_provider(&config.provider)?;

    let (handle, signal) = stop_channel();
    let handle = Arc::new(handle);
    spawn_ctrl_c_stop(Arc::clone(&handle));

    match cli.command {
        Command::Donor {
            stats_out,
            timeout_secs,
            seed,
        } => {
            if let Some(secs) = timeout_secs {
                spawn_timeout_stop(Arc::clone(&handle), Duration::from_secs(secs));
            }
            run_donor(&config, provider, signal, stats_out, seed).await
        }
        Command::Chat { steps } => run_chat(&config, provider, signal, steps).await,
    }
}

fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn CompletionProvider>> {
    let provider: Arc<dyn CompletionProvider> = match config.kind {
        ProviderKind::OpenAi => match &config.base_url {
            Some(base_url) => {
                let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;
                Arc::new(OpenAiProvider::new(base_url, api_key))
            }
            None => Arc::new(OpenAiProvider::from_env().context("configure openai provider")?),
        },
        ProviderKind::Gemini => {
            Arc::new(GeminiProvider::from_env().context("configure gemini provider")?)
        }
    };
    Ok(provider)
}

fn spawn_ctrl_c_stop(handle: Arc<StopHandle>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping");
            handle.stop();
        }
    });
}

fn spawn_timeout_stop(handle: Arc<StopHandle>, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        info!(timeout_secs = after.as_secs(), "timeout reached, stopping");
        handle.stop();
    });
}

async fn run_donor(
    config: &ExperimentConfig,
    provider: Arc<dyn CompletionProvider>,
    signal: vivarium::cancel::StopSignal,
    stats_out: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<()> {
    let donor = &config.donor_game;
    let env = match seed.or(donor.seed) {
        Some(seed) => DonorGameEnvironment::with_seed(
            donor.rounds_per_generation,
            donor.donation_multiplier,
            donor.initial_balance,
            seed,
        ),
        None => DonorGameEnvironment::new(
            donor.rounds_per_generation,
            donor.donation_multiplier,
            donor.initial_balance,
        ),
    };

    let stats_path = stats_out.unwrap_or_else(|| donor.stats_path.clone());
    let sink = CsvStatsSink::create(&stats_path)?;
    info!(path = %stats_path.display(), "writing generation statistics");

    let mut experiment = DonorGameExperiment::new(
        Arc::new(env),
        provider,
        DonorGameExperimentConfig {
            num_agents: donor.num_agents,
            num_generations: donor.num_generations,
            survivor_ratio: donor.survivor_ratio,
            model: config.provider.model.clone(),
            memory_capacity: donor.memory_capacity,
        },
        sink,
    );
    experiment.run(&signal).await?;
    info!("donor-game experiment complete");
    Ok(())
}

async fn run_chat(
    config: &ExperimentConfig,
    provider: Arc<dyn CompletionProvider>,
    signal: vivarium::cancel::StopSignal,
    steps: Option<u32>,
) -> Result<()> {
    let chat = &config.chat;
    let broker = Arc::new(Broker::new());
    let env = Arc::new(ChatEnvironment::new());

    let mut pumps = Vec::with_capacity(chat.num_agents);
    for _ in 0..chat.num_agents {
        let agent = ChatAgent::new(
            ChatAgentConfig {
                id: None,
                model: config.provider.model.clone(),
                task: chat.task.clone(),
                memory_capacity: chat.memory_capacity,
                mailbox_capacity: chat.mailbox_capacity,
            },
            Arc::clone(&provider),
            Arc::clone(&broker),
        )
        .context("create chat agent")?;
        info!(agent = %agent.id(), "created agent");
        pumps.push(agent.spawn_message_pump(signal.clone()));
        env.add_agent(agent).await.context("add agent")?;
    }

    let experiment = FixedStepExperiment::new(
        config.name.clone(),
        Arc::clone(&env),
        steps.unwrap_or(chat.steps),
        Duration::from_secs(chat.step_interval_secs),
    );
    let outcome = experiment.run(&signal).await;

    // Unsubscribe agents and wind the pumps down before reporting.
    env.reset().await;
    for pump in pumps {
        pump.abort();
    }
    broker.reset();

    let executed = outcome?;
    info!(steps = executed, "chat experiment complete");
    Ok(())
}
