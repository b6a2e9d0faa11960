//! Pending quest variable requests
//!
//! One record per character with at least one outstanding fetch. A record
//! keeps the character's handle, the guard subscription that keeps the handle
//! honest, and the callbacks waiting on each variable name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::character::{CharacterHandle, CharacterId};
use super::lifecycle::Subscription;
use super::quest::QuestCallback;

/// Outstanding requests of one character
pub(crate) struct PendingRecord {
    pub(crate) character: CharacterHandle,
    pub(crate) guard: Subscription,
    /// Names with an in-flight fetch. An empty list means the waiters were
    /// dropped by a transient removal but the response is still expected.
    pub(crate) variables: HashMap<String, Vec<QuestCallback>>,
}

/// Table of pending requests keyed by character id
#[derive(Default)]
pub struct PendingLedger {
    pub(crate) records: HashMap<CharacterId, PendingRecord>,
}

/// Summary of the ledger contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Characters with a pending record
    pub characters: usize,
    /// Variable names awaiting a response
    pub pending_variables: usize,
    /// Callbacks that will fire when responses arrive
    pub waiting_callbacks: usize,
}

impl PendingLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a character has a pending record
    pub fn contains(&self, character: CharacterId) -> bool {
        self.records.contains_key(&character)
    }

    /// Whether a response is expected for a (character, name) pair
    pub fn is_pending(&self, character: CharacterId, name: &str) -> bool {
        self.records
            .get(&character)
            .is_some_and(|record| record.variables.contains_key(name))
    }

    /// Number of callbacks waiting on a (character, name) pair
    pub fn waiting(&self, character: CharacterId, name: &str) -> usize {
        self.records
            .get(&character)
            .and_then(|record| record.variables.get(name))
            .map_or(0, Vec::len)
    }

    /// Whether no request is pending
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Count records, names and callbacks
    pub fn stats(&self) -> LedgerStats {
        self.records
            .values()
            .fold(LedgerStats::default(), |mut stats, record| {
                stats.characters += 1;
                stats.pending_variables += record.variables.len();
                stats.waiting_callbacks += record.variables.values().map(Vec::len).sum::<usize>();
                stats
            })
    }
}

impl std::fmt::Debug for PendingLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLedger")
            .field("stats", &self.stats())
            .finish()
    }
}
