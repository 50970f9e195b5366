//! Test-only fakes for the provider and statistics boundaries.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::stats::GenerationStats;
use crate::io::stats::StatsSink;
use crate::providers::{CompletionProvider, ProviderError};

/// One recorded call to a scripted provider.
#[derive(Debug, Clone)]
pub struct CompletionCall {
    pub model: String,
    pub prompt: String,
    pub system_prompt: String,
    pub history: Vec<String>,
}

/// Provider that replays scripted responses and records every call.
///
/// With a queue, responses pop in order and run dry into an error; with
/// [`ScriptedProvider::always`] every call gets the same response.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    calls: Mutex<Vec<CompletionCall>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls lock poisoned").clear();
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        system_prompt: &str,
        history: &[String],
    ) -> Result<String, ProviderError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(CompletionCall {
                model: model.to_string(),
                prompt: prompt.to_string(),
                system_prompt: system_prompt.to_string(),
                history: history.to_vec(),
            });

        let scripted = self.script.lock().expect("script lock poisoned").pop_front();
        scripted
            .or_else(|| self.fallback.clone())
            .ok_or(ProviderError::EmptyCompletion {
                provider: "scripted",
            })
    }
}

/// Provider whose every call fails with an API error.
pub struct FailingProvider;

#[async_trait]
impl CompletionProvider for FailingProvider {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn complete(
        &self,
        _model: &str,
        _prompt: &str,
        _system_prompt: &str,
        _history: &[String],
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Api {
            provider: "failing",
            status: 500,
            body: "scripted failure".to_string(),
        })
    }
}

/// Provider whose calls never complete; pins rounds in flight for
/// cancellation tests.
pub struct PendingProvider;

#[async_trait]
impl CompletionProvider for PendingProvider {
    fn name(&self) -> &'static str {
        "pending"
    }

    async fn complete(
        &self,
        _model: &str,
        _prompt: &str,
        _system_prompt: &str,
        _history: &[String],
    ) -> Result<String, ProviderError> {
        std::future::pending().await
    }
}

/// Stats sink that keeps rows in memory for assertions.
#[derive(Default)]
pub struct MemoryStatsSink {
    rows: Vec<(u32, GenerationStats)>,
}

impl MemoryStatsSink {
    pub fn rows(&self) -> &[(u32, GenerationStats)] {
        &self.rows
    }
}

impl StatsSink for MemoryStatsSink {
    fn record(&mut self, generation: u32, stats: &GenerationStats) -> anyhow::Result<()> {
        self.rows.push((generation, stats.clone()));
        Ok(())
    }
}
