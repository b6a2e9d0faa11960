//! Quest variable synchronization
//!
//! Reads are served from the per-character cache. A miss is filled
//! asynchronously: the caller registers a callback, a fetch goes out through
//! the gateway, and the response later fills the cache and fires every
//! callback waiting on that name exactly once, in registration order.
//!
//! Pending callbacks never outlive their character. A transient removal drops
//! them unfired (the response still fills the cache), and a permanent
//! disconnect erases the character's record so later responses are stale.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use super::cache::WriteOutcome;
use super::character::{Character, CharacterHandle, CharacterId};
use super::error::{QuestError, QuestResult};
use super::gateway::StoreGateway;
use super::ledger::{PendingLedger, PendingRecord};
use super::lifecycle::{LifecycleNotifier, Listener};
use super::world::World;

type QuestHandler = Box<dyn FnOnce(&mut QuestScope<'_>, &str, &str)>;

/// Continuation waiting for a recovered variable
///
/// Whatever the closure captures is the caller's context. It receives the
/// character scope, the variable name and the recovered value.
pub struct QuestCallback {
    handler: QuestHandler,
}

impl QuestCallback {
    /// Wrap a closure
    pub fn new<F>(handler: F) -> Self
    where
        F: FnOnce(&mut QuestScope<'_>, &str, &str) + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }

    fn invoke(self, scope: &mut QuestScope<'_>, name: &str, value: &str) {
        (self.handler)(scope, name, value)
    }
}

impl fmt::Debug for QuestCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QuestCallback")
    }
}

/// Live character access handed to callbacks
pub struct QuestScope<'a> {
    handle: CharacterHandle,
    character: &'a mut Character,
    gateway: &'a mut dyn StoreGateway,
}

impl<'a> QuestScope<'a> {
    /// Handle of the character
    pub fn handle(&self) -> CharacterHandle {
        self.handle
    }

    /// The character the variable belongs to
    pub fn character(&self) -> &Character {
        self.character
    }

    /// Read another cached variable of the same character
    pub fn get(&self, name: &str) -> Option<&str> {
        self.character.quest_cache().get(name)
    }

    /// Write a variable of the same character, publishing it if it changed
    pub fn set(&mut self, name: &str, value: &str) -> WriteOutcome {
        write_through(self.character, self.gateway, name, value)
    }
}

/// What happened to a response from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Cache filled and waiting callbacks fired
    Delivered {
        /// Number of callbacks invoked
        callbacks: usize,
    },
    /// The character has no pending record any more
    Stale,
    /// The character is pending, but not on this name
    Unexpected,
}

/// Update a character's cache and propagate real changes to the store
pub(crate) fn write_through(
    character: &mut Character,
    gateway: &mut dyn StoreGateway,
    name: &str,
    value: &str,
) -> WriteOutcome {
    let outcome = character.quest_cache_mut().set(name, value);
    if outcome.is_change() {
        gateway.publish_variable(character.id(), name, value);
    }
    outcome
}

/// Owner of the pending request ledger
#[derive(Debug, Default)]
pub struct QuestService {
    ledger: PendingLedger,
    dedup_requests: bool,
}

impl QuestService {
    /// Create a service
    ///
    /// With `dedup_requests`, a name that already has a fetch in flight does
    /// not send another one. Callbacks behave the same either way.
    pub fn new(dedup_requests: bool) -> Self {
        Self {
            ledger: PendingLedger::new(),
            dedup_requests,
        }
    }

    /// Pending request ledger
    pub fn ledger(&self) -> &PendingLedger {
        &self.ledger
    }

    /// Register a callback for an uncached variable and fetch it
    ///
    /// The name must not be cached. Debug builds panic on that; release builds
    /// return [`QuestError::AlreadyCached`] and change nothing.
    pub fn recover_variable(
        &mut self,
        world: &World,
        notifier: &mut LifecycleNotifier,
        gateway: &mut dyn StoreGateway,
        handle: CharacterHandle,
        name: &str,
        callback: QuestCallback,
    ) -> QuestResult<()> {
        let character = world
            .get(handle)
            .ok_or(QuestError::UnknownCharacter(handle))?;
        let id = character.id();

        let cached = character.quest_cache().contains(name);
        debug_assert!(
            !cached,
            "recover_variable called for cached variable '{name}' of character {id}"
        );
        if cached {
            return Err(QuestError::AlreadyCached {
                character: id,
                name: name.to_string(),
            });
        }

        let record = self.ledger.records.entry(id).or_insert_with(|| {
            let guard = notifier.subscribe(handle, Listener::QuestGuard);
            tracing::debug!(character = %id, subscription = %guard.id(), "attaching quest guard");
            PendingRecord {
                character: handle,
                guard,
                variables: HashMap::new(),
            }
        });
        debug_assert_eq!(record.character, handle, "pending record handle mismatch");

        let waiting = record.variables.entry(name.to_string());
        let in_flight = matches!(waiting, Entry::Occupied(_));
        waiting.or_default().push(callback);

        if in_flight && self.dedup_requests {
            tracing::debug!(character = %id, name, "quest variable already requested");
            return Ok(());
        }

        gateway.request_variable(id, name);
        Ok(())
    }

    /// Completion entry point for responses from the store
    pub fn variable_recovered(
        &mut self,
        world: &mut World,
        notifier: &mut LifecycleNotifier,
        gateway: &mut dyn StoreGateway,
        id: CharacterId,
        name: &str,
        value: &str,
    ) -> Recovery {
        let Entry::Occupied(mut entry) = self.ledger.records.entry(id) else {
            tracing::debug!(character = %id, name, "dropping stale quest variable");
            return Recovery::Stale;
        };

        let handle = entry.get().character;
        let Some(character) = world.get_mut(handle) else {
            tracing::warn!(character = %id, name, "pending record outlived its character");
            let record = entry.remove();
            notifier.revoke(record.guard);
            return Recovery::Stale;
        };

        let Some(callbacks) = entry.get_mut().variables.remove(name) else {
            tracing::error!(character = %id, name, "store recovered an unexpected quest variable");
            return Recovery::Unexpected;
        };

        character.quest_cache_mut().set(name, value);

        let count = callbacks.len();
        let mut scope = QuestScope {
            handle,
            character,
            gateway,
        };
        for callback in callbacks {
            callback.invoke(&mut scope, name, value);
        }

        if entry.get().variables.is_empty() {
            let record = entry.remove();
            let subscription = record.guard.id();
            notifier.revoke(record.guard);
            tracing::debug!(character = %id, %subscription, "quest guard detached");
        }

        Recovery::Delivered { callbacks: count }
    }

    /// Drop every waiting callback of a character, keeping the names pending
    ///
    /// Returns the number of callbacks discarded.
    pub fn on_transient_removal(&mut self, id: CharacterId) -> usize {
        let Some(record) = self.ledger.records.get_mut(&id) else {
            return 0;
        };

        let mut dropped = 0;
        for callbacks in record.variables.values_mut() {
            dropped += callbacks.len();
            callbacks.clear();
        }

        if dropped > 0 {
            tracing::debug!(character = %id, dropped, "discarded quest callbacks on removal");
        }
        dropped
    }

    /// Erase everything pending for a character that is being destroyed
    ///
    /// Returns whether a record existed.
    pub fn on_permanent_disconnect(&mut self, notifier: &mut LifecycleNotifier, id: CharacterId) -> bool {
        match self.ledger.records.remove(&id) {
            Some(record) => {
                notifier.revoke(record.guard);
                tracing::debug!(
                    character = %id,
                    pending = record.variables.len(),
                    "erased pending quest variables on disconnect"
                );
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::gateway::RecordingGateway;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        world: World,
        notifier: LifecycleNotifier,
        gateway: RecordingGateway,
        quests: QuestService,
        handle: CharacterHandle,
    }

    fn fixture(dedup: bool) -> Fixture {
        let mut world = World::new();
        let handle = world.spawn(Character::new(CharacterId(7), "Alice")).unwrap();
        Fixture {
            world,
            notifier: LifecycleNotifier::new(),
            gateway: RecordingGateway::new(),
            quests: QuestService::new(dedup),
            handle,
        }
    }

    impl Fixture {
        fn recover(&mut self, name: &str, log: &Rc<RefCell<Vec<String>>>, tag: &str) {
            let log = log.clone();
            let tag = tag.to_string();
            self.quests
                .recover_variable(
                    &self.world,
                    &mut self.notifier,
                    &mut self.gateway,
                    self.handle,
                    name,
                    QuestCallback::new(move |_, _, value| log.borrow_mut().push(format!("{tag}={value}"))),
                )
                .unwrap();
        }

        fn recovered(&mut self, name: &str, value: &str) -> Recovery {
            self.quests.variable_recovered(
                &mut self.world,
                &mut self.notifier,
                &mut self.gateway,
                CharacterId(7),
                name,
                value,
            )
        }
    }

    #[test]
    fn test_guard_attached_once_per_record() {
        let mut f = fixture(false);
        let log = Rc::new(RefCell::new(Vec::new()));

        f.recover("a", &log, "x");
        f.recover("b", &log, "y");

        assert_eq!(f.notifier.listeners(f.handle), vec![Listener::QuestGuard]);
        assert_eq!(f.quests.ledger().stats().pending_variables, 2);
    }

    #[test]
    fn test_guard_stays_until_last_name_resolves() {
        let mut f = fixture(false);
        let log = Rc::new(RefCell::new(Vec::new()));

        f.recover("a", &log, "x");
        f.recover("b", &log, "y");

        assert_eq!(f.recovered("a", "1"), Recovery::Delivered { callbacks: 1 });
        assert!(f.notifier.is_subscribed(f.handle, Listener::QuestGuard));

        assert_eq!(f.recovered("b", "2"), Recovery::Delivered { callbacks: 1 });
        assert!(!f.notifier.is_subscribed(f.handle, Listener::QuestGuard));
        assert!(f.quests.ledger().is_empty());
        assert_eq!(*log.borrow(), vec!["x=1", "y=2"]);
    }

    #[test]
    fn test_dedup_sends_single_request() {
        let mut f = fixture(true);
        let log = Rc::new(RefCell::new(Vec::new()));

        f.recover("a", &log, "first");
        f.recover("a", &log, "second");

        assert_eq!(f.gateway.request_count(CharacterId(7), "a"), 1);
        assert_eq!(f.recovered("a", "5"), Recovery::Delivered { callbacks: 2 });
        assert_eq!(*log.borrow(), vec!["first=5", "second=5"]);
    }

    #[test]
    fn test_without_dedup_every_call_requests() {
        let mut f = fixture(false);
        let log = Rc::new(RefCell::new(Vec::new()));

        f.recover("a", &log, "first");
        f.recover("a", &log, "second");

        assert_eq!(f.gateway.request_count(CharacterId(7), "a"), 2);
    }

    #[test]
    fn test_transient_removal_keeps_names() {
        let mut f = fixture(false);
        let log = Rc::new(RefCell::new(Vec::new()));

        f.recover("a", &log, "x");
        f.recover("a", &log, "y");

        assert_eq!(f.quests.on_transient_removal(CharacterId(7)), 2);
        assert!(f.quests.ledger().is_pending(CharacterId(7), "a"));
        assert_eq!(f.quests.ledger().waiting(CharacterId(7), "a"), 0);

        assert_eq!(f.recovered("a", "9"), Recovery::Delivered { callbacks: 0 });
        assert!(log.borrow().is_empty());
        assert_eq!(f.world.get(f.handle).unwrap().quest_cache().get("a"), Some("9"));
    }

    #[test]
    fn test_transient_removal_without_record_is_noop() {
        let mut f = fixture(false);
        assert_eq!(f.quests.on_transient_removal(CharacterId(7)), 0);
        assert!(f.quests.ledger().is_empty());
    }

    #[test]
    fn test_unknown_handle_rejected() {
        let mut f = fixture(false);
        let gone = f.handle;
        f.world.destroy(gone);

        let err = f
            .quests
            .recover_variable(
                &f.world,
                &mut f.notifier,
                &mut f.gateway,
                gone,
                "a",
                QuestCallback::new(|_, _, _| {}),
            )
            .unwrap_err();
        assert!(matches!(err, QuestError::UnknownCharacter(h) if h == gone));
        assert!(f.gateway.messages().is_empty());
    }

    #[test]
    fn test_record_outliving_character_is_stale() {
        let mut f = fixture(false);
        let log = Rc::new(RefCell::new(Vec::new()));
        f.recover("a", &log, "x");

        // Bypass the guard on purpose.
        f.world.destroy(f.handle);

        assert_eq!(f.recovered("a", "1"), Recovery::Stale);
        assert!(f.quests.ledger().is_empty());
        assert!(!f.notifier.is_subscribed(f.handle, Listener::QuestGuard));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_callback_can_write_through() {
        let mut f = fixture(false);
        f.quests
            .recover_variable(
                &f.world,
                &mut f.notifier,
                &mut f.gateway,
                f.handle,
                "slime_killed",
                QuestCallback::new(|scope, _, value| {
                    let next = value.parse::<u32>().unwrap_or(0) + 1;
                    scope.set("slime_killed", &next.to_string());
                }),
            )
            .unwrap();

        f.recovered("slime_killed", "3");

        let character = f.world.get(f.handle).unwrap();
        assert_eq!(character.quest_cache().get("slime_killed"), Some("4"));
        assert_eq!(f.gateway.publish_count(CharacterId(7), "slime_killed"), 1);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "cached variable")]
    fn test_recover_cached_panics_in_debug() {
        let mut f = fixture(false);
        write_through(
            f.world.get_mut(f.handle).unwrap(),
            &mut f.gateway,
            "a",
            "1",
        );
        let _ = f.quests.recover_variable(
            &f.world,
            &mut f.notifier,
            &mut f.gateway,
            f.handle,
            "a",
            QuestCallback::new(|_, _, _| {}),
        );
    }
}
