//! Durable local storage boundary.
//!
//! Three small pieces of client state survive process restarts: the device
//! identity, the last-used nickname, and a best-effort match resume hint.
//! Persistence itself stays behind a trait so the crate does no I/O;
//! embedders plug in a backing store and tests use [`MemoryStore`].

use std::collections::HashMap;

/// Storage key for the durable device identity.
pub const KEY_DEVICE_ID: &str = "device_id";

/// Storage key for the last-used nickname.
pub const KEY_NICKNAME: &str = "nickname";

/// Storage key for the last known match id (resume hint only; a stored id
/// is never trusted without a fresh join confirmation).
pub const KEY_LAST_MATCH: &str = "last_match_id";

/// Durable string key/value storage.
///
/// Implementations must persist values across process restarts. Operations
/// are infallible from the caller's side; a backing store that can fail
/// should degrade to in-memory behavior rather than surface errors here.
pub trait Storage: Send {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: &str);

    /// Delete a value if present.
    fn remove(&mut self, key: &str);
}

/// In-memory [`Storage`] implementation.
///
/// Does not actually persist anything; intended for tests and for embedders
/// that manage persistence elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, builder-style.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_get_remove() {
        let mut store = MemoryStore::new();

        assert_eq!(store.get(KEY_NICKNAME), None);

        store.set(KEY_NICKNAME, "Alice");
        assert_eq!(store.get(KEY_NICKNAME), Some("Alice".to_string()));

        store.set(KEY_NICKNAME, "Bob");
        assert_eq!(store.get(KEY_NICKNAME), Some("Bob".to_string()));

        store.remove(KEY_NICKNAME);
        assert_eq!(store.get(KEY_NICKNAME), None);
    }

    #[test]
    fn test_with_seeds_value() {
        let store = MemoryStore::new().with(KEY_DEVICE_ID, "device-1");
        assert_eq!(store.get(KEY_DEVICE_ID), Some("device-1".to_string()));
    }
}
