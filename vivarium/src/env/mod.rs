//! Environments: the roster plus the rules that advance one time step.

mod chat;
mod donor_game;

pub use chat::ChatEnvironment;
pub use donor_game::{DonorGameEnvironment, DonorGameState, NO_HISTORY_SENTINEL};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::cancel::StopSignal;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("donor pairing needs an even roster, got {0} agents")]
    OddRoster(usize),
    #[error("agent {0} is already in the roster")]
    DuplicateAgent(String),
    #[error("agent {0} not found")]
    AgentNotFound(String),
    #[error("step aborted by stop signal")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvStatus {
    #[default]
    Idle,
    Running,
}

/// State every environment tracks; specialized states embed it.
#[derive(Debug, Clone)]
pub struct BaseState {
    pub status: EnvStatus,
    pub step: u32,
    pub timestamp: DateTime<Utc>,
}

impl Default for BaseState {
    fn default() -> Self {
        Self {
            status: EnvStatus::Idle,
            step: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Capability set shared by all environments.
///
/// `state` returns a snapshot copy; callers never observe live internals.
/// `step` advances one discrete time step, fanning agent work out
/// concurrently and collecting it before returning.
#[async_trait]
pub trait Environment: Send + Sync {
    type Agent: Send + Sync;
    type State: Clone + Send;

    async fn state(&self) -> Self::State;

    async fn add_agent(&self, agent: Arc<Self::Agent>) -> Result<(), EnvError>;

    async fn remove_agent(&self, id: &str) -> Result<(), EnvError>;

    async fn step(&self, stop: &StopSignal) -> Result<(), EnvError>;

    /// Clear the roster and restore initial state.
    async fn reset(&self);
}
