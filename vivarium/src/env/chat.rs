//! Free-form environment: every agent acts once per step, concurrently.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{BaseState, EnvError, EnvStatus, Environment};
use crate::agents::Agent;
use crate::cancel::StopSignal;

/// Environment for chat-style experiments.
///
/// Holds the roster and a [`BaseState`]; a step invokes every agent's `act`
/// in its own task and waits for all of them. Duplicate ids are tolerated
/// here; only the donor game's ledger demands unique identities.
pub struct ChatEnvironment<A: Agent> {
    inner: RwLock<Inner<A>>,
}

struct Inner<A> {
    agents: Vec<Arc<A>>,
    state: BaseState,
}

impl<A: Agent> ChatEnvironment<A> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                agents: Vec::new(),
                state: BaseState::default(),
            }),
        }
    }

    pub async fn agents(&self) -> Vec<Arc<A>> {
        self.inner.read().await.agents.clone()
    }
}

impl<A: Agent> Default for ChatEnvironment<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<A: Agent> Environment for ChatEnvironment<A> {
    type Agent = A;
    type State = BaseState;

    async fn state(&self) -> BaseState {
        self.inner.read().await.state.clone()
    }

    async fn add_agent(&self, agent: Arc<A>) -> Result<(), EnvError> {
        self.inner.write().await.agents.push(agent);
        Ok(())
    }

    async fn remove_agent(&self, id: &str) -> Result<(), EnvError> {
        let mut inner = self.inner.write().await;
        let position = inner
            .agents
            .iter()
            .position(|agent| agent.id() == id)
            .ok_or_else(|| EnvError::AgentNotFound(id.to_string()))?;
        let removed = inner.agents.remove(position);
        removed.on_removed();
        Ok(())
    }

    /// Run every agent's action concurrently; wait for all of them.
    ///
    /// An individual agent failure is logged and swallowed; it must not
    /// abort the step or its peers. A stop signal aborts the whole step.
    async fn step(&self, stop: &StopSignal) -> Result<(), EnvError> {
        let mut inner = self.inner.write().await;
        inner.state.status = EnvStatus::Running;
        inner.state.step += 1;
        inner.state.timestamp = Utc::now();
        debug!(step = inner.state.step, agents = inner.agents.len(), "running step");

        let mut actions = JoinSet::new();
        for agent in &inner.agents {
            let agent = Arc::clone(agent);
            actions.spawn(async move { (agent.id().to_string(), agent.act().await) });
        }

        loop {
            tokio::select! {
                _ = stop.stopped() => {
                    actions.abort_all();
                    return Err(EnvError::Stopped);
                }
                next = actions.join_next() => match next {
                    None => break,
                    Some(Ok((id, Err(err)))) => {
                        warn!(agent = %id, error = %err, "agent action failed");
                    }
                    Some(Ok((_, Ok(_)))) => {}
                    Some(Err(join_err)) => {
                        warn!(error = %join_err, "agent task aborted");
                    }
                },
            }
        }
        Ok(())
    }

    async fn reset(&self) {
        let mut inner = self.inner.write().await;
        for agent in inner.agents.drain(..) {
            agent.on_removed();
        }
        inner.state = BaseState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentError;
    use crate::cancel::stop_channel;
    use crate::core::parse::ParseError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Minimal agent that counts invocations and optionally fails.
    struct CountingAgent {
        id: String,
        invocations: AtomicU32,
        fail: bool,
    }

    impl CountingAgent {
        fn new(id: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                invocations: AtomicU32::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Agent for CountingAgent {
        fn id(&self) -> &str {
            &self.id
        }

        async fn act(&self) -> Result<String, AgentError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AgentError::Parse(ParseError::MissingAnswer(
                    "scripted failure".to_string(),
                )));
            }
            Ok("acted".to_string())
        }
    }

    #[tokio::test]
    async fn step_invokes_every_agent_once() {
        let env = ChatEnvironment::new();
        let a = CountingAgent::new("a", false);
        let b = CountingAgent::new("b", false);
        env.add_agent(Arc::clone(&a)).await.expect("add a");
        env.add_agent(Arc::clone(&b)).await.expect("add b");

        let (_handle, signal) = stop_channel();
        env.step(&signal).await.expect("step");

        assert_eq!(a.invocations.load(Ordering::SeqCst), 1);
        assert_eq!(b.invocations.load(Ordering::SeqCst), 1);

        let state = env.state().await;
        assert_eq!(state.step, 1);
        assert_eq!(state.status, EnvStatus::Running);
    }

    /// One failing agent must not abort the step or its peers.
    #[tokio::test]
    async fn agent_failure_is_swallowed() {
        let env = ChatEnvironment::new();
        let ok = CountingAgent::new("ok", false);
        let bad = CountingAgent::new("bad", true);
        env.add_agent(Arc::clone(&ok)).await.expect("add");
        env.add_agent(Arc::clone(&bad)).await.expect("add");

        let (_handle, signal) = stop_channel();
        env.step(&signal).await.expect("step succeeds regardless");
        assert_eq!(ok.invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_ids_are_tolerated_here() {
        let env = ChatEnvironment::new();
        env.add_agent(CountingAgent::new("same", false))
            .await
            .expect("add");
        env.add_agent(CountingAgent::new("same", false))
            .await
            .expect("duplicates allowed in the generic roster");
        assert_eq!(env.agents().await.len(), 2);
    }

    #[tokio::test]
    async fn remove_unknown_agent_fails() {
        let env = ChatEnvironment::<CountingAgent>::new();
        let err = env.remove_agent("ghost").await.unwrap_err();
        assert!(matches!(err, EnvError::AgentNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn reset_restores_initial_state() {
        let env = ChatEnvironment::new();
        env.add_agent(CountingAgent::new("a", false))
            .await
            .expect("add");
        let (_handle, signal) = stop_channel();
        env.step(&signal).await.expect("step");

        env.reset().await;
        let state = env.state().await;
        assert_eq!(state.step, 0);
        assert_eq!(state.status, EnvStatus::Idle);
        assert!(env.agents().await.is_empty());
    }

    /// An agent whose action never completes; used to pin the step mid-flight.
    struct BlockingAgent;

    #[async_trait]
    impl Agent for BlockingAgent {
        fn id(&self) -> &str {
            "blocking"
        }

        async fn act(&self) -> Result<String, AgentError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stop_signal_aborts_a_step_in_flight() {
        let env = ChatEnvironment::new();
        env.add_agent(Arc::new(BlockingAgent)).await.expect("add");
        let (handle, signal) = stop_channel();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.stop();
        });

        let err = env.step(&signal).await.unwrap_err();
        assert!(matches!(err, EnvError::Stopped));
        stopper.await.expect("stopper");
    }
}
