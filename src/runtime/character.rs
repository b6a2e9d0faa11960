//! Characters, their persistent ids, and arena handles

use serde::{Deserialize, Serialize};
use std::fmt;

use super::cache::VariableCache;

/// Persistent character identity (database id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub u32);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-owning reference to a character living in a [`World`](super::world::World)
///
/// A handle stays valid until its character is destroyed. After that the
/// slot's generation moves on and the handle resolves to nothing, even if the
/// slot is reused by another character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterHandle {
    /// Slot index in the arena
    pub index: u32,
    /// Generation of the slot when the handle was issued
    pub generation: u32,
}

impl fmt::Display for CharacterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A player character as seen by the quest subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    id: CharacterId,
    name: String,
    active: bool,
    quest_cache: VariableCache,
}

impl Character {
    /// Create a character that is active in the simulation
    pub fn new(id: CharacterId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            active: true,
            quest_cache: VariableCache::new(),
        }
    }

    /// Persistent id
    pub fn id(&self) -> CharacterId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the character takes part in the simulation right now
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Known quest variables
    pub fn quest_cache(&self) -> &VariableCache {
        &self.quest_cache
    }

    pub(crate) fn quest_cache_mut(&mut self) -> &mut VariableCache {
        &mut self.quest_cache
    }
}
