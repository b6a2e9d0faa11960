//! Character lifecycle notifications
//!
//! Subsystems that hold on to characters subscribe a [`Listener`] to a
//! character's channel. The world server looks up the subscribed listeners when
//! a character leaves the simulation or is destroyed and routes the event to
//! the owning subsystem.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::character::CharacterHandle;

/// Lifecycle events fired for a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Left active simulation (area transfer, logout to character select)
    Removed,
    /// About to be destroyed
    Disconnected,
}

/// Subsystems that can listen to lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Listener {
    /// Keeps the pending quest variable ledger consistent
    QuestGuard,
}

/// Unique subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof of a live subscription
///
/// Not `Clone`: revoking consumes it, so a subscription is revoked at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    character: CharacterHandle,
}

impl Subscription {
    /// Subscription id
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Per-character listener registry
#[derive(Debug, Default)]
pub struct LifecycleNotifier {
    channels: HashMap<CharacterHandle, Vec<(SubscriptionId, Listener)>>,
}

impl LifecycleNotifier {
    /// Create an empty notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener to a character
    pub fn subscribe(&mut self, character: CharacterHandle, listener: Listener) -> Subscription {
        let id = SubscriptionId::new();
        self.channels
            .entry(character)
            .or_default()
            .push((id, listener));

        Subscription { id, character }
    }

    /// Detach a listener; returns false if it was already gone
    pub fn revoke(&mut self, subscription: Subscription) -> bool {
        let Some(entries) = self.channels.get_mut(&subscription.character) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(id, _)| *id != subscription.id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            self.channels.remove(&subscription.character);
        }

        removed
    }

    /// Listeners currently attached to a character, in subscription order
    pub fn listeners(&self, character: CharacterHandle) -> Vec<Listener> {
        self.channels
            .get(&character)
            .map(|entries| entries.iter().map(|(_, listener)| *listener).collect())
            .unwrap_or_default()
    }

    /// Check whether a listener kind is attached to a character
    pub fn is_subscribed(&self, character: CharacterHandle, listener: Listener) -> bool {
        self.channels
            .get(&character)
            .is_some_and(|entries| entries.iter().any(|(_, l)| *l == listener))
    }

    /// Forget every subscription of a destroyed character
    pub fn drop_channel(&mut self, character: CharacterHandle) -> usize {
        self.channels
            .remove(&character)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Number of characters with at least one listener
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: u32) -> CharacterHandle {
        CharacterHandle {
            index,
            generation: 0,
        }
    }

    #[test]
    fn test_subscribe_and_revoke() {
        let mut notifier = LifecycleNotifier::new();
        let sub = notifier.subscribe(handle(1), Listener::QuestGuard);

        assert!(notifier.is_subscribed(handle(1), Listener::QuestGuard));
        assert_eq!(notifier.listeners(handle(1)), vec![Listener::QuestGuard]);

        assert!(notifier.revoke(sub));
        assert!(!notifier.is_subscribed(handle(1), Listener::QuestGuard));
        assert_eq!(notifier.channel_count(), 0);
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        let mut notifier = LifecycleNotifier::new();
        let first = notifier.subscribe(handle(1), Listener::QuestGuard);
        let second = notifier.subscribe(handle(1), Listener::QuestGuard);

        assert_ne!(first.id(), second.id());
        assert_eq!(first.id().to_string(), first.id().0.to_string());

        assert!(notifier.revoke(first));
        assert_eq!(notifier.listeners(handle(1)), vec![Listener::QuestGuard]);
        assert!(notifier.revoke(second));
    }

    #[test]
    fn test_revoke_after_drop_channel() {
        let mut notifier = LifecycleNotifier::new();
        let sub = notifier.subscribe(handle(3), Listener::QuestGuard);

        assert_eq!(notifier.drop_channel(handle(3)), 1);
        assert!(!notifier.revoke(sub));
    }

    #[test]
    fn test_channels_are_per_character() {
        let mut notifier = LifecycleNotifier::new();
        let a = notifier.subscribe(handle(1), Listener::QuestGuard);
        notifier.subscribe(handle(2), Listener::QuestGuard);

        notifier.revoke(a);
        assert!(notifier.listeners(handle(1)).is_empty());
        assert_eq!(notifier.listeners(handle(2)), vec![Listener::QuestGuard]);
    }
}
