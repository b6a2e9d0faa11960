//! World server runtime and public API
//!
//! This module provides the [`WorldServer`] that owns the character arena,
//! the lifecycle notifier, the quest variable service and the store gateway,
//! and exposes the operations game logic and the store connection call.

use serde::{Deserialize, Serialize};
use std::path::Path;

// Submodules
pub mod cache;
pub mod character;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod lifecycle;
pub mod quest;
pub mod storage;
pub mod world;

use cache::WriteOutcome;
use character::{Character, CharacterHandle, CharacterId};
use error::{ConfigResult, QuestError, QuestResult};
use gateway::StoreGateway;
use ledger::LedgerStats;
use lifecycle::{LifecycleEvent, LifecycleNotifier, Listener};
use quest::{QuestCallback, QuestService, Recovery, write_through};
use world::World;

/// Configuration for the world server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Skip the store fetch when the same variable is already in flight
    pub dedup_requests: bool,

    /// Enable debug tracing
    pub debug: bool,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        storage::load_config(path)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        storage::write_config(path, self)
    }
}

/// Owner of all per-world quest state
///
/// Everything runs on the caller's thread: responses from the store are fed
/// back through [`variable_recovered`](Self::variable_recovered) from the same
/// event loop that issues requests.
pub struct WorldServer {
    config: RuntimeConfig,
    world: World,
    notifier: LifecycleNotifier,
    quests: QuestService,
    gateway: Box<dyn StoreGateway>,
}

impl WorldServer {
    /// Create a world server sending store traffic through `gateway`
    pub fn new(config: RuntimeConfig, gateway: impl StoreGateway + 'static) -> Self {
        let quests = QuestService::new(config.dedup_requests);
        Self {
            config,
            world: World::new(),
            notifier: LifecycleNotifier::new(),
            quests,
            gateway: Box::new(gateway),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the character arena
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get the lifecycle notifier
    pub fn notifier(&self) -> &LifecycleNotifier {
        &self.notifier
    }

    /// Get the quest variable service
    pub fn quests(&self) -> &QuestService {
        &self.quests
    }

    /// Summary of pending requests
    pub fn stats(&self) -> LedgerStats {
        self.quests.ledger().stats()
    }

    /// Bring a character into the world
    pub fn spawn_character(
        &mut self,
        id: CharacterId,
        name: impl Into<String>,
    ) -> QuestResult<CharacterHandle> {
        let handle = self.world.spawn(Character::new(id, name))?;
        tracing::info!(character = %id, %handle, "character entered the world");
        Ok(handle)
    }

    /// Resolve a handle
    pub fn character(&self, handle: CharacterHandle) -> Option<&Character> {
        self.world.get(handle)
    }

    /// Find a live character by persistent id
    pub fn handle_of(&self, id: CharacterId) -> Option<CharacterHandle> {
        self.world.handle_of(id)
    }

    /// Read a cached quest variable; never contacts the store
    pub fn read(&self, handle: CharacterHandle, name: &str) -> Option<&str> {
        self.world.get(handle)?.quest_cache().get(name)
    }

    /// Write a quest variable, publishing it to the store if it changed
    pub fn write(
        &mut self,
        handle: CharacterHandle,
        name: &str,
        value: &str,
    ) -> QuestResult<WriteOutcome> {
        let character = self
            .world
            .get_mut(handle)
            .ok_or(QuestError::UnknownCharacter(handle))?;
        Ok(write_through(character, self.gateway.as_mut(), name, value))
    }

    /// Fetch an uncached quest variable, calling `callback` once it arrives
    ///
    /// Callers must check [`read`](Self::read) first.
    pub fn recover_variable(
        &mut self,
        handle: CharacterHandle,
        name: &str,
        callback: QuestCallback,
    ) -> QuestResult<()> {
        self.quests.recover_variable(
            &self.world,
            &mut self.notifier,
            self.gateway.as_mut(),
            handle,
            name,
            callback,
        )
    }

    /// Response from the store for a previously requested variable
    pub fn variable_recovered(&mut self, id: CharacterId, name: &str, value: &str) -> Recovery {
        self.quests.variable_recovered(
            &mut self.world,
            &mut self.notifier,
            self.gateway.as_mut(),
            id,
            name,
            value,
        )
    }

    /// Take a character out of active simulation; it may come back later
    pub fn remove_character(&mut self, handle: CharacterHandle) -> QuestResult<()> {
        let character = self
            .world
            .get_mut(handle)
            .ok_or(QuestError::UnknownCharacter(handle))?;
        character.set_active(false);
        let id = character.id();

        self.dispatch(handle, id, LifecycleEvent::Removed);
        tracing::info!(character = %id, "character left active simulation");
        Ok(())
    }

    /// Put a transiently removed character back into the simulation
    pub fn return_character(&mut self, handle: CharacterHandle) -> QuestResult<()> {
        let character = self
            .world
            .get_mut(handle)
            .ok_or(QuestError::UnknownCharacter(handle))?;
        character.set_active(true);
        Ok(())
    }

    /// Destroy a character, returning it to the caller
    pub fn disconnect_character(&mut self, handle: CharacterHandle) -> QuestResult<Character> {
        let id = self
            .world
            .get(handle)
            .map(Character::id)
            .ok_or(QuestError::UnknownCharacter(handle))?;

        self.dispatch(handle, id, LifecycleEvent::Disconnected);
        self.notifier.drop_channel(handle);

        let character = self
            .world
            .destroy(handle)
            .ok_or(QuestError::UnknownCharacter(handle))?;
        tracing::info!(character = %id, "character disconnected");
        Ok(character)
    }

    fn dispatch(&mut self, handle: CharacterHandle, id: CharacterId, event: LifecycleEvent) {
        for listener in self.notifier.listeners(handle) {
            match (listener, event) {
                (Listener::QuestGuard, LifecycleEvent::Removed) => {
                    self.quests.on_transient_removal(id);
                }
                (Listener::QuestGuard, LifecycleEvent::Disconnected) => {
                    self.quests.on_permanent_disconnect(&mut self.notifier, id);
                }
            }
        }
    }
}

impl std::fmt::Debug for WorldServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldServer")
            .field("config", &self.config)
            .field("characters", &self.world.len())
            .field("pending", &self.quests.ledger().stats())
            .finish()
    }
}
