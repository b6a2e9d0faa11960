//! Outbound channel to the persistent store
//!
//! The store is reached only through fire-and-forget messages. Responses to
//! `request_variable` come back later through
//! [`WorldServer::variable_recovered`](super::WorldServer::variable_recovered).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::character::CharacterId;

/// Fire-and-forget requests sent to the persistent store
pub trait StoreGateway {
    /// Ask the store for a variable's value
    fn request_variable(&mut self, character: CharacterId, name: &str);

    /// Propagate a locally changed value
    fn publish_variable(&mut self, character: CharacterId, name: &str, value: &str);
}

/// Wire form of a gateway request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Fetch request
    RequestVariable {
        /// Character id
        character: CharacterId,
        /// Variable name
        name: String,
    },
    /// Update notification
    PublishVariable {
        /// Character id
        character: CharacterId,
        /// Variable name
        name: String,
        /// New value
        value: String,
    },
}

impl GatewayMessage {
    /// Character the message is about
    pub fn character(&self) -> CharacterId {
        match self {
            GatewayMessage::RequestVariable { character, .. }
            | GatewayMessage::PublishVariable { character, .. } => *character,
        }
    }

    /// Variable name the message is about
    pub fn name(&self) -> &str {
        match self {
            GatewayMessage::RequestVariable { name, .. }
            | GatewayMessage::PublishVariable { name, .. } => name,
        }
    }
}

/// Gateway that keeps every message in memory
///
/// Clones share the same log, so a test can keep one clone while the world
/// server owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    sent: Arc<Mutex<Vec<GatewayMessage>>>,
}

impl RecordingGateway {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every message sent so far
    pub fn messages(&self) -> Vec<GatewayMessage> {
        self.sent.lock().clone()
    }

    /// Remove and return every message sent so far
    pub fn take(&self) -> Vec<GatewayMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of fetch requests sent for a (character, name) pair
    pub fn request_count(&self, character: CharacterId, name: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| {
                matches!(m, GatewayMessage::RequestVariable { .. })
                    && m.character() == character
                    && m.name() == name
            })
            .count()
    }

    /// Number of publish notifications sent for a (character, name) pair
    pub fn publish_count(&self, character: CharacterId, name: &str) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| {
                matches!(m, GatewayMessage::PublishVariable { .. })
                    && m.character() == character
                    && m.name() == name
            })
            .count()
    }
}

impl StoreGateway for RecordingGateway {
    fn request_variable(&mut self, character: CharacterId, name: &str) {
        self.sent.lock().push(GatewayMessage::RequestVariable {
            character,
            name: name.to_string(),
        });
    }

    fn publish_variable(&mut self, character: CharacterId, name: &str, value: &str) {
        self.sent.lock().push(GatewayMessage::PublishVariable {
            character,
            name: name.to_string(),
            value: value.to_string(),
        });
    }
}

/// Gateway that forwards messages to a tokio task
#[derive(Debug, Clone)]
pub struct ChannelGateway {
    tx: mpsc::UnboundedSender<GatewayMessage>,
}

impl ChannelGateway {
    /// Create a gateway and the receiving end the connection task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GatewayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, message: GatewayMessage) {
        if let Err(err) = self.tx.send(message) {
            tracing::warn!(
                character = %err.0.character(),
                name = err.0.name(),
                "store connection closed, dropping gateway message"
            );
        }
    }
}

impl StoreGateway for ChannelGateway {
    fn request_variable(&mut self, character: CharacterId, name: &str) {
        self.send(GatewayMessage::RequestVariable {
            character,
            name: name.to_string(),
        });
    }

    fn publish_variable(&mut self, character: CharacterId, name: &str, value: &str) {
        self.send(GatewayMessage::PublishVariable {
            character,
            name: name.to_string(),
            value: value.to_string(),
        });
    }
}
