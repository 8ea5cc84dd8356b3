//! In-memory persistence backend for testing.

use crate::backend::{validate_key, PersistenceBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory persistence backend.
///
/// This backend keeps every value in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral sessions that don't need to survive a restart
///
/// Sharing one instance (behind an `Arc`) between two engines simulates a
/// process restart over the same durable store.
///
/// # Example
///
/// ```rust
/// use pushprofile_storage::{InMemoryBackend, PersistenceBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.archive("internal.current", b"data").unwrap();
/// assert_eq!(backend.keys().unwrap(), vec!["internal.current".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    values: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with values.
    ///
    /// Useful for testing restore-after-restart scenarios.
    #[must_use]
    pub fn with_values(values: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            values: RwLock::new(values.into_iter().collect()),
        }
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Removes every stored value.
    pub fn clear(&self) {
        self.values.write().clear();
    }
}

impl PersistenceBackend for InMemoryBackend {
    fn archive(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.values.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.values.read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.values.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.values.read().keys().cloned().collect())
    }
}
