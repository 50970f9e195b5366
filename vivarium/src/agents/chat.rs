//! Broker-connected agent for free-form conversation experiments.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::{prompt, Agent, AgentError};
use crate::cancel::StopSignal;
use crate::core::memory::MemoryLog;
use crate::messaging::{Broker, BrokerError, Message};
use crate::providers::CompletionProvider;

/// Construction parameters for a [`ChatAgent`].
#[derive(Debug, Clone)]
pub struct ChatAgentConfig {
    /// Agent id; a `agent-<uuid>` id is generated when absent.
    pub id: Option<String>,
    pub model: String,
    /// What this agent is trying to do in the conversation.
    pub task: String,
    pub memory_capacity: usize,
    pub mailbox_capacity: usize,
}

impl Default for ChatAgentConfig {
    fn default() -> Self {
        Self {
            id: None,
            model: "gpt-4o-mini".to_string(),
            task: String::new(),
            memory_capacity: 100,
            mailbox_capacity: 100,
        }
    }
}

/// An agent that converses with its peers through the message broker.
///
/// Inbound messages accumulate in a bounded mailbox; a message pump moves
/// them into memory, and [`ChatAgent::act`] turns memory into the next
/// utterance, broadcast to everyone else.
pub struct ChatAgent {
    id: String,
    model: String,
    task: String,
    provider: Arc<dyn CompletionProvider>,
    memory: MemoryLog,
    broker: Arc<Broker>,
    inbox: Mutex<Option<mpsc::Receiver<Message>>>,
}

impl ChatAgent {
    /// Build the agent and subscribe it to the broker.
    pub fn new(
        config: ChatAgentConfig,
        provider: Arc<dyn CompletionProvider>,
        broker: Arc<Broker>,
    ) -> Result<Arc<Self>, BrokerError> {
        let id = config
            .id
            .unwrap_or_else(|| format!("agent-{}", Uuid::new_v4()));
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        broker.subscribe(&id, tx)?;

        Ok(Arc::new(Self {
            id,
            model: config.model,
            task: config.task,
            provider,
            memory: MemoryLog::new(config.memory_capacity),
            broker,
            inbox: Mutex::new(Some(rx)),
        }))
    }

    pub fn memory(&self) -> &MemoryLog {
        &self.memory
    }

    /// Stamp and publish a message as this agent.
    pub fn send(&self, mut msg: Message) -> Result<(), BrokerError> {
        msg.from = self.id.clone();
        msg.timestamp = Utc::now();
        info!(agent = %self.id, content = %msg.content, "sending message");
        self.broker.publish(msg)
    }

    /// Remove this agent's broker subscription.
    pub fn unsubscribe(&self) -> Result<(), BrokerError> {
        self.broker.unsubscribe(&self.id)
    }

    /// Start the task that drains the mailbox into memory until stopped.
    ///
    /// The mailbox receiver is taken on first call; later calls are no-ops.
    pub fn spawn_message_pump(self: &Arc<Self>, stop: StopSignal) -> JoinHandle<()> {
        let agent = Arc::clone(self);
        let inbox = agent.inbox.lock().expect("inbox lock poisoned").take();
        tokio::spawn(async move {
            let Some(mut rx) = inbox else {
                return;
            };
            loop {
                tokio::select! {
                    _ = stop.stopped() => break,
                    received = rx.recv() => match received {
                        Some(msg) => {
                            agent
                                .memory
                                .store(format!("Message from {}: {}", msg.from, msg.content));
                        }
                        None => break,
                    },
                }
            }
            debug!(agent = %agent.id, "message pump stopped");
        })
    }
}

#[async_trait]
impl Agent for ChatAgent {
    fn id(&self) -> &str {
        &self.id
    }

    /// Generate the next utterance from memory and broadcast it.
    async fn act(&self) -> Result<String, AgentError> {
        let memories = self.memory.snapshot();
        let history = (!memories.is_empty()).then(|| memories.join("\n"));
        let prompt = prompt::render_chat(&self.id, &self.task, history.as_deref());

        let response = self.provider.complete(&self.model, &prompt, "", &[]).await?;

        self.send(Message::broadcast(&self.id, response.clone()))?;
        Ok(response)
    }

    /// Drop the broker subscription when the environment lets go of us.
    fn on_removed(&self) {
        if let Err(err) = self.unsubscribe() {
            debug!(agent = %self.id, error = %err, "unsubscribe on removal");
        }
    }
}
