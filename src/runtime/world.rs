//! Generational arena of live characters
//!
//! The world owns every [`Character`]. Other subsystems keep
//! [`CharacterHandle`]s and must resolve them here before touching a
//! character, so a destroyed character can never be reached through an old
//! handle.

use std::collections::HashMap;

use super::character::{Character, CharacterHandle, CharacterId};
use super::error::{QuestError, QuestResult};

#[derive(Debug)]
struct Slot {
    generation: u32,
    character: Option<Character>,
}

/// Arena of characters indexed by generational handles
#[derive(Debug, Default)]
pub struct World {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<CharacterId, CharacterHandle>,
}

impl World {
    /// Create an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a character, returning its handle
    pub fn spawn(&mut self, character: Character) -> QuestResult<CharacterHandle> {
        let id = character.id();
        if self.by_id.contains_key(&id) {
            return Err(QuestError::DuplicateCharacter(id));
        }

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.character = Some(character);
                CharacterHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    character: Some(character),
                });
                CharacterHandle {
                    index,
                    generation: 0,
                }
            }
        };

        self.by_id.insert(id, handle);
        Ok(handle)
    }

    /// Resolve a handle
    pub fn get(&self, handle: CharacterHandle) -> Option<&Character> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.character.as_ref()
    }

    /// Resolve a handle mutably
    pub fn get_mut(&mut self, handle: CharacterHandle) -> Option<&mut Character> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.character.as_mut()
    }

    /// Find the handle of a live character by persistent id
    pub fn handle_of(&self, id: CharacterId) -> Option<CharacterHandle> {
        self.by_id.get(&id).copied()
    }

    /// Destroy a character, invalidating every handle to it
    pub fn destroy(&mut self, handle: CharacterHandle) -> Option<Character> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let character = slot.character.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.by_id.remove(&character.id());
        Some(character)
    }

    /// Number of live characters
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the world holds no characters
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over live characters
    pub fn iter(&self) -> impl Iterator<Item = (CharacterHandle, &Character)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.character.as_ref().map(|character| {
                (
                    CharacterHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    character,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_resolve() {
        let mut world = World::new();
        let handle = world.spawn(Character::new(CharacterId(7), "Alice")).unwrap();

        assert_eq!(world.get(handle).unwrap().name(), "Alice");
        assert_eq!(world.handle_of(CharacterId(7)), Some(handle));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut world = World::new();
        world.spawn(Character::new(CharacterId(1), "a")).unwrap();

        let err = world.spawn(Character::new(CharacterId(1), "b")).unwrap_err();
        assert!(matches!(err, QuestError::DuplicateCharacter(CharacterId(1))));
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut world = World::new();
        let old = world.spawn(Character::new(CharacterId(1), "a")).unwrap();
        let removed = world.destroy(old).unwrap();
        assert_eq!(removed.id(), CharacterId(1));

        let new = world.spawn(Character::new(CharacterId(2), "b")).unwrap();
        assert_eq!(new.index, old.index, "slot should be reused");
        assert_ne!(new.generation, old.generation);

        assert!(world.get(old).is_none());
        assert!(world.destroy(old).is_none());
        assert_eq!(world.get(new).unwrap().id(), CharacterId(2));
        assert!(world.handle_of(CharacterId(1)).is_none());
    }

    #[test]
    fn test_iter_skips_destroyed() {
        let mut world = World::new();
        let a = world.spawn(Character::new(CharacterId(1), "a")).unwrap();
        let b = world.spawn(Character::new(CharacterId(2), "b")).unwrap();
        world.destroy(a);

        let live: Vec<_> = world.iter().map(|(handle, _)| handle).collect();
        assert_eq!(live, vec![b]);

        world.destroy(b);
        assert!(world.is_empty());
        assert_eq!(world.iter().count(), 0);
    }
}
