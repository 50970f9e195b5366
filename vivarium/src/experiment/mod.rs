//! Experiment orchestration: drive an environment and record what happened.

mod donor_game;

pub use donor_game::{DonorGameExperiment, DonorGameExperimentConfig};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::cancel::StopSignal;
use crate::env::{EnvError, Environment};

/// Chronological record of state snapshots taken around steps.
pub struct StateLog<S> {
    states: Mutex<Vec<S>>,
}

impl<S: Clone> StateLog<S> {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, state: S) {
        self.states.lock().expect("state log poisoned").push(state);
    }

    pub fn snapshots(&self) -> Vec<S> {
        self.states.lock().expect("state log poisoned").clone()
    }
}

impl<S: Clone> Default for StateLog<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs an environment for a fixed number of steps, snapshotting state
/// immediately before and after each step for metrics.
pub struct FixedStepExperiment<E: Environment> {
    name: String,
    env: Arc<E>,
    steps: u32,
    /// Pause between steps; spaces out provider calls.
    step_interval: Duration,
    metrics: StateLog<E::State>,
}

impl<E: Environment> FixedStepExperiment<E> {
    pub fn new(name: impl Into<String>, env: Arc<E>, steps: u32, step_interval: Duration) -> Self {
        Self {
            name: name.into(),
            env,
            steps,
            step_interval,
            metrics: StateLog::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Arc<E> {
        &self.env
    }

    /// Pre-snapshot, advance the environment, post-snapshot.
    pub async fn step(&self, stop: &StopSignal) -> Result<(), EnvError> {
        self.metrics.record(self.env.state().await);
        if let Err(err) = self.env.step(stop).await {
            warn!(experiment = %self.name, error = %err, "step failed");
            return Err(err);
        }
        self.metrics.record(self.env.state().await);
        Ok(())
    }

    /// Run the configured number of steps; stops early on cancellation or on
    /// any step error. Returns the number of steps executed.
    pub async fn run(&self, stop: &StopSignal) -> Result<u32, EnvError> {
        for executed in 0..self.steps {
            if stop.is_stopped() {
                return Err(EnvError::Stopped);
            }
            if executed > 0 && !self.step_interval.is_zero() {
                tokio::time::sleep(self.step_interval).await;
            }
            info!(experiment = %self.name, step = executed + 1, of = self.steps, "running step");
            self.step(stop).await?;
        }
        Ok(self.steps)
    }

    /// All snapshots recorded so far (two per completed step).
    pub fn metrics(&self) -> Vec<E::State> {
        self.metrics.snapshots()
    }
}
