//! Experiment configuration (TOML).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Experiment configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    pub name: String,
    pub provider: ProviderConfig,
    pub donor_game: DonorGameConfig,
    pub chat: ChatConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "vivarium".to_string(),
            provider: ProviderConfig::default(),
            donor_game: DonorGameConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Override for the provider's API base URL (e.g. a local proxy).
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DonorGameConfig {
    /// Cohort size per generation; must be even for pairing.
    pub num_agents: usize,
    pub num_generations: u32,
    pub rounds_per_generation: u32,
    /// Fraction of agents whose strategies seed the next generation.
    pub survivor_ratio: f64,
    /// Recipients receive `amount * donation_multiplier`.
    pub donation_multiplier: f64,
    pub initial_balance: f64,
    pub memory_capacity: usize,
    /// Pairing RNG seed; omit for a fresh shuffle per run.
    pub seed: Option<u64>,
    pub stats_path: PathBuf,
}

impl Default for DonorGameConfig {
    fn default() -> Self {
        Self {
            num_agents: 4,
            num_generations: 3,
            rounds_per_generation: 5,
            survivor_ratio: 0.5,
            donation_multiplier: 2.0,
            initial_balance: 10.0,
            memory_capacity: 100,
            seed: None,
            stats_path: PathBuf::from("experiment_stats.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub num_agents: usize,
    pub steps: u32,
    /// Pause between steps, in seconds; spaces out provider calls.
    pub step_interval_secs: u64,
    /// Conversation goal handed to every agent.
    pub task: String,
    pub memory_capacity: usize,
    pub mailbox_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            num_agents: 3,
            steps: 5,
            step_interval_secs: 1,
            task: "Have a friendly conversation about artificial intelligence with other agents."
                .to_string(),
            memory_capacity: 100,
            mailbox_capacity: 100,
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        let donor = &self.donor_game;
        if donor.num_agents == 0 || donor.num_agents % 2 != 0 {
            return Err(anyhow!(
                "donor_game.num_agents must be positive and even, got {}",
                donor.num_agents
            ));
        }
        if donor.num_generations == 0 {
            return Err(anyhow!("donor_game.num_generations must be > 0"));
        }
        if donor.rounds_per_generation == 0 {
            return Err(anyhow!("donor_game.rounds_per_generation must be > 0"));
        }
        if !(donor.survivor_ratio > 0.0 && donor.survivor_ratio <= 1.0) {
            return Err(anyhow!(
                "donor_game.survivor_ratio must be in (0, 1], got {}",
                donor.survivor_ratio
            ));
        }
        if donor.donation_multiplier <= 0.0 {
            return Err(anyhow!("donor_game.donation_multiplier must be > 0"));
        }
        if donor.initial_balance <= 0.0 {
            return Err(anyhow!("donor_game.initial_balance must be > 0"));
        }
        if donor.memory_capacity == 0 {
            return Err(anyhow!("donor_game.memory_capacity must be > 0"));
        }
        if self.provider.model.trim().is_empty() {
            return Err(anyhow!("provider.model must be non-empty"));
        }
        if self.chat.num_agents == 0 {
            return Err(anyhow!("chat.num_agents must be > 0"));
        }
        if self.chat.steps == 0 {
            return Err(anyhow!("chat.steps must be > 0"));
        }
        if self.chat.memory_capacity == 0 || self.chat.mailbox_capacity == 0 {
            return Err(anyhow!("chat capacities must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ExperimentConfig::default()`.
pub fn load_config(path: &Path) -> Result<ExperimentConfig> {
    if !path.exists() {
        let cfg = ExperimentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ExperimentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ExperimentConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "name = \"my-run\"\n\n[donor_game]\nnum_agents = 8\n\n[provider]\nkind = \"gemini\"\nmodel = \"gemini-2.0-flash\"\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.name, "my-run");
        assert_eq!(cfg.donor_game.num_agents, 8);
        assert_eq!(cfg.donor_game.num_generations, 3, "defaulted");
        assert_eq!(cfg.provider.kind, ProviderKind::Gemini);
        assert_eq!(cfg.chat, ChatConfig::default());
    }

    #[test]
    fn odd_cohort_size_is_rejected() {
        let cfg = ExperimentConfig {
            donor_game: DonorGameConfig {
                num_agents: 5,
                ..DonorGameConfig::default()
            },
            ..ExperimentConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("even"));
    }

    #[test]
    fn out_of_range_survivor_ratio_is_rejected() {
        for ratio in [0.0, 1.5] {
            let cfg = ExperimentConfig {
                donor_game: DonorGameConfig {
                    survivor_ratio: ratio,
                    ..DonorGameConfig::default()
                },
                ..ExperimentConfig::default()
            };
            assert!(cfg.validate().is_err(), "ratio {ratio} should fail");
        }
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = ExperimentConfig::default();
        let serialized = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: ExperimentConfig = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed, cfg);
    }
}
