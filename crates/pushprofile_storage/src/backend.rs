//! Persistence backend trait definition.

use crate::error::{StorageError, StorageResult};
use std::sync::Arc;

/// A durable, keyed byte store.
///
/// Backends are **opaque**: they store whatever bytes the caller hands them
/// under a key and give the same bytes back. The sync engine owns snapshot
/// encoding and the key namespace.
///
/// # Invariants
///
/// - `load` after a successful `archive` returns exactly the archived bytes
/// - `archive` replaces the previous value atomically (readers see the old
///   value or the new one, never a mix)
/// - A value is durable once `archive` returns
/// - Keys match `[A-Za-z0-9._-]+` (see [`validate_key`])
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait PersistenceBackend: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn archive(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Loads the value stored under `key`, or `None` if nothing was archived.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Removes the value stored under `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Lists every key currently holding a value, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the key listing cannot be read.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

impl<B: PersistenceBackend + ?Sized> PersistenceBackend for Arc<B> {
    fn archive(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        (**self).archive(key, bytes)
    }

    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).load(key)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        (**self).keys()
    }
}

/// Checks that a key is non-empty and only uses `[A-Za-z0-9._-]`.
///
/// The restriction keeps keys usable as file names on every platform.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for any other key.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
