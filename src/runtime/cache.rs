//! Per-character quest variable cache
//!
//! Holds the values this server already knows for one character. A present
//! entry is always the last value written locally or received from the store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Result of writing a value into a [`VariableCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// The name was not cached before
    Inserted,
    /// The cached value changed
    Updated,
    /// The cached value was already equal to the written one
    Unchanged,
}

impl WriteOutcome {
    /// Whether the write has to be propagated to the persistent store
    pub fn is_change(self) -> bool {
        !matches!(self, WriteOutcome::Unchanged)
    }
}

/// Name to value mapping for a single character
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableCache {
    values: HashMap<String, String>,
}

impl VariableCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Check whether a name is cached
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Store a value, reporting whether anything changed
    pub fn set(&mut self, name: &str, value: &str) -> WriteOutcome {
        match self.values.entry(name.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                WriteOutcome::Inserted
            }
            Entry::Occupied(mut slot) => {
                if slot.get() == value {
                    WriteOutcome::Unchanged
                } else {
                    slot.insert(value.to_string());
                    WriteOutcome::Updated
                }
            }
        }
    }

    /// Number of cached variables
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_set_reports_outcome() {
        let mut cache = VariableCache::new();

        assert_eq!(cache.set("slime_killed", "1"), WriteOutcome::Inserted);
        assert_eq!(cache.set("slime_killed", "1"), WriteOutcome::Unchanged);
        assert_eq!(cache.set("slime_killed", "2"), WriteOutcome::Updated);
        assert_eq!(cache.get("slime_killed"), Some("2"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_name() {
        let cache = VariableCache::new();
        assert!(cache.get("nothing").is_none());
        assert!(!cache.contains("nothing"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_value_is_a_real_value() {
        let mut cache = VariableCache::new();
        assert_eq!(cache.set("flag", ""), WriteOutcome::Inserted);
        assert_eq!(cache.get("flag"), Some(""));
        assert_eq!(cache.set("flag", ""), WriteOutcome::Unchanged);
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(writes in prop::collection::vec(("[a-c]", "[0-9]{0,3}"), 1..40)) {
            let mut cache = VariableCache::new();
            let mut expected: HashMap<String, String> = HashMap::new();

            for (name, value) in &writes {
                let before = expected.get(name).cloned();
                let outcome = cache.set(name, value);
                match before {
                    None => prop_assert_eq!(outcome, WriteOutcome::Inserted),
                    Some(ref old) if old == value => prop_assert_eq!(outcome, WriteOutcome::Unchanged),
                    Some(_) => prop_assert_eq!(outcome, WriteOutcome::Updated),
                }
                expected.insert(name.clone(), value.clone());
            }

            for (name, value) in &expected {
                prop_assert_eq!(cache.get(name), Some(value.as_str()));
            }
            prop_assert_eq!(cache.len(), expected.len());
        }
    }
}
