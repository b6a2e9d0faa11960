//! Error types for the quest variable runtime
//!
//! Domain errors use thiserror; binaries convert to anyhow at the top level.

use std::io;
use thiserror::Error;

use super::character::{CharacterHandle, CharacterId};

/// Errors raised by quest variable operations
#[derive(Debug, Error)]
pub enum QuestError {
    /// Handle does not refer to a live character
    #[error("Character {0} not found")]
    UnknownCharacter(CharacterHandle),

    /// A live character already uses this id
    #[error("Character id {0} is already in the world")]
    DuplicateCharacter(CharacterId),

    /// Fill-on-miss requested for a variable that is already cached
    #[error("Quest variable '{name}' is already cached for character {character}")]
    AlreadyCached {
        /// Character id
        character: CharacterId,
        /// Variable name
        name: String,
    },
}

/// Convenience result alias for quest operations
pub type QuestResult<T> = std::result::Result<T, QuestError>;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Config file is not valid JSON for the expected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
