//! Donor-game environment: paired donation rounds over a shared ledger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::{BaseState, EnvError, EnvStatus, Environment};
use crate::agents::{AgentError, DonationContext, DonorAgent};
use crate::cancel::StopSignal;
use crate::core::pairing::random_pairs;

/// History string handed to donors paired with an agent that has no memory yet.
pub const NO_HISTORY_SENTINEL: &str =
    "This is the first round, so there is no history of previous interactions.";

/// How many of the recipient's memory entries a donor gets to see.
const HISTORY_WINDOW: usize = 3;

/// Donor-game state: the base fields plus the resource ledger and counters.
#[derive(Debug, Clone)]
pub struct DonorGameState {
    pub base: BaseState,
    pub generation: u32,
    /// Round within the current generation; wraps to 0 at the boundary.
    pub round: u32,
    /// Rounds played across the environment's lifetime.
    pub total_rounds: u32,
    /// Resource balance per agent id. Exactly one entry per roster member.
    pub resources: HashMap<String, f64>,
    pub successful_donations: u32,
    pub failed_donations: u32,
}

impl Default for DonorGameState {
    fn default() -> Self {
        Self {
            base: BaseState::default(),
            generation: 0,
            round: 0,
            total_rounds: 0,
            resources: HashMap::new(),
            successful_donations: 0,
            failed_donations: 0,
        }
    }
}

/// Outcome of one pairing's decision task. Lives only for the round's fan-in.
struct DonationRecord {
    donor_id: String,
    recipient_id: String,
    outcome: Result<f64, AgentError>,
}

/// The donor game: each round pairs the roster at random, donors give up
/// units, recipients receive them multiplied.
///
/// The roster and ledger share one exclusive lock held for the whole round:
/// pairing, collection and application.
pub struct DonorGameEnvironment {
    rounds_per_generation: u32,
    donation_multiplier: f64,
    initial_balance: f64,
    inner: RwLock<Inner>,
    rng: Mutex<StdRng>,
}

struct Inner {
    agents: Vec<Arc<DonorAgent>>,
    state: DonorGameState,
}

impl DonorGameEnvironment {
    pub fn new(rounds_per_generation: u32, donation_multiplier: f64, initial_balance: f64) -> Self {
        Self::with_rng(
            rounds_per_generation,
            donation_multiplier,
            initial_balance,
            StdRng::from_entropy(),
        )
    }

    /// Seeded variant for reproducible pairings.
    pub fn with_seed(
        rounds_per_generation: u32,
        donation_multiplier: f64,
        initial_balance: f64,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            rounds_per_generation,
            donation_multiplier,
            initial_balance,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        rounds_per_generation: u32,
        donation_multiplier: f64,
        initial_balance: f64,
        rng: StdRng,
    ) -> Self {
        Self {
            rounds_per_generation,
            donation_multiplier,
            initial_balance,
            inner: RwLock::new(Inner {
                agents: Vec::new(),
                state: DonorGameState::default(),
            }),
            rng: Mutex::new(rng),
        }
    }

    pub fn rounds_per_generation(&self) -> u32 {
        self.rounds_per_generation
    }

    pub fn donation_multiplier(&self) -> f64 {
        self.donation_multiplier
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    /// Record which generation the cohort belongs to; threaded into decision
    /// prompts.
    pub async fn set_generation(&self, generation: u32) {
        self.inner.write().await.state.generation = generation;
    }

    pub async fn agents(&self) -> Vec<Arc<DonorAgent>> {
        self.inner.read().await.agents.clone()
    }

    /// The `min(n, roster)` agent ids with the highest balances.
    ///
    /// Sorted by descending balance; ties break by ascending id so survivor
    /// selection is reproducible even though the ledger map is unordered.
    pub async fn top_agents(&self, n: usize) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut scores: Vec<(&String, f64)> = inner
            .state
            .resources
            .iter()
            .map(|(id, balance)| (id, *balance))
            .collect();
        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scores.into_iter().take(n).map(|(id, _)| id.clone()).collect()
    }

    /// The recipient's recent interactions as shown to its donor.
    fn recent_history(agent: &DonorAgent) -> String {
        let entries = agent.memory().recent(HISTORY_WINDOW);
        if entries.is_empty() {
            NO_HISTORY_SENTINEL.to_string()
        } else {
            entries.join("\n")
        }
    }
}

#[async_trait]
impl Environment for DonorGameEnvironment {
    type Agent = DonorAgent;
    type State = DonorGameState;

    async fn state(&self) -> DonorGameState {
        self.inner.read().await.state.clone()
    }

    /// Add an agent and seed its ledger entry with the initial balance.
    ///
    /// Identity is the ledger's join key, so duplicates are rejected here.
    async fn add_agent(&self, agent: Arc<DonorAgent>) -> Result<(), EnvError> {
        let mut inner = self.inner.write().await;
        if inner.agents.iter().any(|a| a.id() == agent.id()) {
            return Err(EnvError::DuplicateAgent(agent.id().to_string()));
        }
        inner
            .state
            .resources
            .insert(agent.id().to_string(), self.initial_balance);
        inner.agents.push(agent);
        Ok(())
    }

    async fn remove_agent(&self, id: &str) -> Result<(), EnvError> {
        let mut inner = self.inner.write().await;
        let position = inner
            .agents
            .iter()
            .position(|agent| agent.id() == id)
            .ok_or_else(|| EnvError::AgentNotFound(id.to_string()))?;
        inner.agents.remove(position);
        inner.state.resources.remove(id);
        Ok(())
    }

    /// Play one round of the donor game.
    ///
    /// Requires an even roster. Pairs the shuffled roster, runs every donor's
    /// decision concurrently, collects exactly one record per pair (bounded
    /// by the stop signal), advances the round counters, then applies the
    /// successful donations and writes provenance into both memories.
    async fn step(&self, stop: &StopSignal) -> Result<(), EnvError> {
        let mut inner = self.inner.write().await;

        let roster = inner.agents.clone();
        if roster.len() % 2 != 0 {
            return Err(EnvError::OddRoster(roster.len()));
        }

        inner.state.base.status = EnvStatus::Running;
        inner.state.base.step += 1;
        inner.state.base.timestamp = Utc::now();

        let pairs = {
            let mut rng = self.rng.lock().expect("rng lock poisoned");
            random_pairs(&roster, &mut *rng)
        };
        let generation = inner.state.generation;
        let round_number = inner.state.round + 1;
        debug!(
            generation,
            round = round_number,
            pairs = pairs.len(),
            "starting donation round"
        );

        // Fan out one decision task per pair; the channel is sized so every
        // task can deliver its record without waiting on the collector.
        let (tx, mut rx) = mpsc::channel::<DonationRecord>(pairs.len().max(1));
        for pair in &pairs {
            let donor = Arc::clone(&pair.donor);
            let context = DonationContext {
                generation,
                round: round_number,
                recipient_id: pair.recipient.id().to_string(),
                recipient_balance: inner
                    .state
                    .resources
                    .get(pair.recipient.id())
                    .copied()
                    .unwrap_or(0.0),
                recipient_history: Self::recent_history(&pair.recipient),
                donor_balance: inner.state.resources.get(donor.id()).copied().unwrap_or(0.0),
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = donor.decide_donation(&context).await;
                let record = DonationRecord {
                    donor_id: donor.id().to_string(),
                    recipient_id: context.recipient_id.clone(),
                    outcome,
                };
                // Collector may be gone if the round was aborted; the late
                // result is simply discarded.
                let _ = tx.send(record).await;
            });
        }
        drop(tx);

        // Collect exactly one record per pair, in completion order.
        let mut donations = Vec::with_capacity(pairs.len());
        for _ in 0..pairs.len() {
            let record = tokio::select! {
                _ = stop.stopped() => return Err(EnvError::Stopped),
                received = rx.recv() => match received {
                    Some(record) => record,
                    None => break,
                },
            };
            match record.outcome {
                Ok(amount) => {
                    inner.state.successful_donations += 1;
                    donations.push((record.donor_id, record.recipient_id, amount));
                }
                Err(err) => {
                    warn!(donor = %record.donor_id, error = %err, "donation failed");
                    inner.state.failed_donations += 1;
                }
            }
        }

        // Counters advance once per round, before application.
        inner.state.round += 1;
        inner.state.total_rounds += 1;

        for (donor_id, recipient_id, amount) in donations {
            let donor_before = inner.state.resources.get(&donor_id).copied().unwrap_or(0.0);
            let pct_donated = if donor_before > 0.0 {
                amount / donor_before * 100.0
            } else {
                0.0
            };
            let credited = amount * self.donation_multiplier;

            *inner.state.resources.entry(donor_id.clone()).or_insert(0.0) -= amount;
            *inner
                .state
                .resources
                .entry(recipient_id.clone())
                .or_insert(0.0) += credited;

            let donor_after = inner.state.resources.get(&donor_id).copied().unwrap_or(0.0);
            let recipient_after = inner
                .state
                .resources
                .get(&recipient_id)
                .copied()
                .unwrap_or(0.0);

            if let Some(donor) = inner.agents.iter().find(|a| a.id() == donor_id) {
                donor.memory().store(format!(
                    "Round {round_number}: I donated {pct_donated:.2}% ({amount:.2}) of my \
                     resources to {recipient_id}, leaving me with {donor_after:.2} resources"
                ));
            }
            if let Some(recipient) = inner.agents.iter().find(|a| a.id() == recipient_id) {
                recipient.memory().store(format!(
                    "Round {round_number}: I received {pct_donated:.2}% ({amount:.2} multiplied \
                     to {credited:.2}) from {donor_id}, bringing my resources to \
                     {recipient_after:.2}"
                ));
            }
        }

        if inner.state.round >= self.rounds_per_generation {
            inner.state.round = 0;
        }
        Ok(())
    }

    async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.agents.clear();
        inner.state = DonorGameState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompt::GameParams;
    use crate::cancel::stop_channel;
    use crate::providers::CompletionProvider;
    use crate::test_support::{PendingProvider, ScriptedProvider};
    use std::time::Duration;

    fn game() -> GameParams {
        GameParams {
            initial_balance: 10.0,
            donation_multiplier: 2.0,
            survivor_percent: 50,
        }
    }

    fn agent(id: &str, provider: Arc<dyn CompletionProvider>) -> Arc<DonorAgent> {
        Arc::new(DonorAgent::new(id, "test-model", provider, 100, &game()))
    }

    async fn populated_env(n: usize, provider: Arc<dyn CompletionProvider>) -> DonorGameEnvironment {
        let env = DonorGameEnvironment::with_seed(5, 2.0, 10.0, 42);
        for i in 0..n {
            env.add_agent(agent(&format!("1_{i}"), Arc::clone(&provider)))
                .await
                .expect("add agent");
        }
        env
    }

    #[tokio::test]
    async fn add_agent_seeds_ledger_and_rejects_duplicates() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 1"));
        let env = DonorGameEnvironment::new(5, 2.0, 10.0);
        env.add_agent(agent("1_0", Arc::clone(&provider)))
            .await
            .expect("add");

        let state = env.state().await;
        assert_eq!(state.resources.get("1_0"), Some(&10.0));

        let err = env
            .add_agent(agent("1_0", provider))
            .await
            .unwrap_err();
        assert!(matches!(err, EnvError::DuplicateAgent(id) if id == "1_0"));
    }

    #[tokio::test]
    async fn remove_agent_drops_its_ledger_entry() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 1"));
        let env = populated_env(2, provider).await;

        env.remove_agent("1_0").await.expect("remove");
        let state = env.state().await;
        assert!(!state.resources.contains_key("1_0"));
        assert_eq!(env.agents().await.len(), 1);

        let err = env.remove_agent("1_0").await.unwrap_err();
        assert!(matches!(err, EnvError::AgentNotFound(_)));
    }

    /// A round with an odd roster fails and leaves the ledger untouched.
    #[tokio::test]
    async fn odd_roster_fails_without_mutating_state() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 5"));
        let env = populated_env(3, provider).await;
        let (_handle, signal) = stop_channel();

        let err = env.step(&signal).await.unwrap_err();
        assert!(matches!(err, EnvError::OddRoster(3)));

        let state = env.state().await;
        assert_eq!(state.round, 0);
        assert_eq!(state.total_rounds, 0);
        assert_eq!(state.successful_donations, 0);
        assert!(state.resources.values().all(|balance| *balance == 10.0));
    }

    /// Ledger conservation for one pair: donor loses the amount, the
    /// recipient gains it multiplied.
    #[tokio::test]
    async fn donation_debits_donor_and_credits_recipient_multiplied() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 5"));
        let env = populated_env(2, provider).await;
        let (_handle, signal) = stop_channel();

        env.step(&signal).await.expect("step");

        let state = env.state().await;
        let mut balances: Vec<f64> = state.resources.values().copied().collect();
        balances.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        assert_eq!(balances, vec![5.0, 20.0]);
        assert_eq!(state.successful_donations, 1);
        assert_eq!(state.failed_donations, 0);
        assert_eq!(state.round, 1);
        assert_eq!(state.total_rounds, 1);
    }

    /// Four agents, two pairs, every donor gives 5: both pairs settle at
    /// 5 / 20 and two successful donations are recorded.
    #[tokio::test]
    async fn full_round_accounts_every_pair_exactly_once() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 5"));
        let env = populated_env(4, provider).await;
        let (_handle, signal) = stop_channel();

        env.step(&signal).await.expect("step");

        let state = env.state().await;
        let mut balances: Vec<f64> = state.resources.values().copied().collect();
        balances.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        assert_eq!(balances, vec![5.0, 5.0, 20.0, 20.0]);
        assert_eq!(state.successful_donations, 2);
        // Total grew by pairs * amount * (multiplier - 1).
        let total: f64 = state.resources.values().sum();
        assert_eq!(total, 50.0);
    }

    #[tokio::test]
    async fn oversized_decision_is_clamped_to_the_donor_balance() {
        let provider: Arc<dyn CompletionProvider> =
            Arc::new(ScriptedProvider::always("ANSWER: 50"));
        let env = populated_env(2, provider).await;
        let (_handle, signal) = stop_channel();

        env.step(&signal).await.expect("step");

        let state = env.state().await;
        let mut balances: Vec<f64> = state.resources.values().copied().collect();
        balances.sort_by(|a, b| a.partial_cmp(b).expect("finite"));
        // Donor gave everything (10), recipient got 20 on top of its 10.
        assert_eq!(balances, vec![0.0, 30.0]);
    }

    /// A response without an ANSWER line yields a failed donation and leaves
    /// both balances in the pair unchanged.
    #[tokio::test]
    async fn unparseable_decision_is_a_failed_donation() {
        let provider: Arc<dyn CompletionProvider> =
            Arc::new(ScriptedProvider::always("I keep everything"));
        let env = populated_env(2, provider).await;
        let (_handle, signal) = stop_channel();

        env.step(&signal).await.expect("step tolerates decision failures");

        let state = env.state().await;
        assert_eq!(state.failed_donations, 1);
        assert_eq!(state.successful_donations, 0);
        assert!(state.resources.values().all(|balance| *balance == 10.0));
        // Counters still advanced: the round happened, it just had no effect.
        assert_eq!(state.round, 1);
    }

    #[tokio::test]
    async fn provenance_lines_land_in_both_memories() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 4"));
        let env = populated_env(2, provider).await;
        let (_handle, signal) = stop_channel();

        env.step(&signal).await.expect("step");

        let agents = env.agents().await;
        let mut donated = 0;
        let mut received = 0;
        for agent in &agents {
            let entries = agent.memory().snapshot();
            assert_eq!(entries.len(), 1, "exactly one provenance line per agent");
            if entries[0].contains("I donated 40.00% (4.00)") {
                donated += 1;
            }
            if entries[0].contains("I received 40.00% (4.00 multiplied to 8.00)") {
                received += 1;
            }
        }
        assert_eq!((donated, received), (1, 1));
    }

    #[tokio::test]
    async fn round_counter_wraps_at_the_generation_boundary() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 1"));
        let env = DonorGameEnvironment::with_seed(2, 2.0, 10.0, 7);
        for i in 0..2 {
            env.add_agent(agent(&format!("1_{i}"), Arc::clone(&provider)))
                .await
                .expect("add");
        }
        let (_handle, signal) = stop_channel();

        env.step(&signal).await.expect("round 1");
        assert_eq!(env.state().await.round, 1);
        env.step(&signal).await.expect("round 2");

        let state = env.state().await;
        assert_eq!(state.round, 0, "wraps after rounds_per_generation");
        assert_eq!(state.total_rounds, 2);
    }

    #[tokio::test]
    async fn stop_signal_aborts_collection_mid_round() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(PendingProvider);
        let env = populated_env(2, provider).await;
        let (handle, signal) = stop_channel();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.stop();
        });

        let err = env.step(&signal).await.unwrap_err();
        assert!(matches!(err, EnvError::Stopped));
        stopper.await.expect("stopper");

        // Nothing was applied and the round never advanced.
        let state = env.state().await;
        assert_eq!(state.round, 0);
        assert!(state.resources.values().all(|balance| *balance == 10.0));
    }

    #[tokio::test]
    async fn top_agents_sorts_by_balance_with_id_tie_break() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 3"));
        let env = DonorGameEnvironment::with_seed(5, 2.0, 10.0, 11);
        for id in ["b", "d", "a", "c"] {
            env.add_agent(agent(id, Arc::clone(&provider)))
                .await
                .expect("add");
        }

        // All balances equal: ties break by ascending id.
        assert_eq!(env.top_agents(2).await, vec!["a", "b"]);
        assert_eq!(env.top_agents(10).await.len(), 4, "capped at roster size");

        let (_handle, signal) = stop_channel();
        env.step(&signal).await.expect("step");

        // Recipients (10 + 6 = 16) now outrank donors (10 - 3 = 7).
        let state = env.state().await;
        let top = env.top_agents(2).await;
        for id in &top {
            assert_eq!(state.resources.get(id), Some(&16.0));
        }
    }

    #[tokio::test]
    async fn recipient_history_reaches_the_donor_prompt() {
        let provider = Arc::new(ScriptedProvider::always("ANSWER: 1"));
        let env = populated_env(2, Arc::clone(&provider) as _).await;
        let (_handle, signal) = stop_channel();

        env.step(&signal).await.expect("round 1");
        provider.clear_calls();
        env.step(&signal).await.expect("round 2");

        let calls = provider.calls();
        assert_eq!(calls.len(), 1, "one donor decision in round 2");
        // Round 2's donor sees the recipient's round-1 provenance, not the
        // first-round sentinel.
        assert!(calls[0].prompt.contains("Round 1:"));
        assert!(!calls[0].prompt.contains(NO_HISTORY_SENTINEL));
    }

    #[tokio::test]
    async fn reset_clears_roster_ledger_and_counters() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::always("ANSWER: 2"));
        let env = populated_env(2, provider).await;
        let (_handle, signal) = stop_channel();
        env.set_generation(3).await;
        env.step(&signal).await.expect("step");

        env.reset().await;

        let state = env.state().await;
        assert!(env.agents().await.is_empty());
        assert!(state.resources.is_empty());
        assert_eq!(state.generation, 0);
        assert_eq!(state.round, 0);
        assert_eq!(state.successful_donations, 0);
        assert_eq!(state.base.status, EnvStatus::Idle);
    }
}
