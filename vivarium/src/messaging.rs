//! In-process publish/subscribe routing between agents.
//!
//! The broker maps agent ids to bounded mailboxes. Publishing never blocks:
//! delivery to a full mailbox fails immediately rather than suspending the
//! publisher. Subscriber lookups take a shared lock, so concurrent publishes
//! proceed in parallel; subscribe/unsubscribe take the lock exclusively.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

/// A single communication between agents. Immutable once published; each
/// recipient gets its own copy.
#[derive(Debug, Clone)]
pub struct Message {
    /// Agent id of the sender.
    pub from: String,
    /// Recipient agent ids. Empty means broadcast to everyone but the sender.
    pub to: Vec<String>,
    /// Message payload. Opaque to the broker.
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a broadcast message stamped with the current time.
    pub fn broadcast(from: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Build a direct message stamped with the current time.
    pub fn direct(
        from: impl Into<String>,
        to: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: vec![to.into()],
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("agent {0} is already subscribed")]
    AlreadySubscribed(String),
    #[error("agent {0} is not subscribed")]
    NotSubscribed(String),
    #[error("mailbox for {recipient} is full")]
    MailboxFull { recipient: String },
}

/// Routes messages between subscribed agents.
#[derive(Debug, Default)]
pub struct Broker {
    subscribers: RwLock<HashMap<String, mpsc::Sender<Message>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mailbox for `id`.
    pub fn subscribe(&self, id: &str, mailbox: mpsc::Sender<Message>) -> Result<(), BrokerError> {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        if subscribers.contains_key(id) {
            return Err(BrokerError::AlreadySubscribed(id.to_string()));
        }
        subscribers.insert(id.to_string(), mailbox);
        Ok(())
    }

    /// Remove the mailbox registered for `id`.
    pub fn unsubscribe(&self, id: &str) -> Result<(), BrokerError> {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        if subscribers.remove(id).is_none() {
            return Err(BrokerError::NotSubscribed(id.to_string()));
        }
        Ok(())
    }

    /// Deliver `msg` to its recipients.
    ///
    /// An empty `to` list broadcasts to every subscriber except the sender.
    /// Direct recipients that are not subscribed are silently skipped.
    /// Delivery is a non-blocking attempt per recipient: the first full
    /// mailbox aborts the remaining deliveries and is reported in the error;
    /// copies already delivered are not recalled.
    pub fn publish(&self, msg: Message) -> Result<(), BrokerError> {
        let subscribers = self.subscribers.read().expect("subscriber lock poisoned");

        let recipients: Vec<&String> = if msg.to.is_empty() {
            subscribers.keys().filter(|id| **id != msg.from).collect()
        } else {
            msg.to
                .iter()
                .filter(|id| subscribers.contains_key(*id))
                .collect()
        };

        for recipient in recipients {
            let mailbox = &subscribers[recipient];
            if let Err(mpsc::error::TrySendError::Full(_)) = mailbox.try_send(msg.clone()) {
                return Err(BrokerError::MailboxFull {
                    recipient: recipient.clone(),
                });
            }
        }
        Ok(())
    }

    /// Drop every subscription.
    pub fn reset(&self) {
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("subscriber lock poisoned")
            .len()
    }
}
