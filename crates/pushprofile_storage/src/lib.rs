//! # pushprofile storage
//!
//! Keyed persistence backends for the pushprofile sync core.
//!
//! Backends are **opaque byte stores** addressed by a short key. They do not
//! interpret the snapshots they hold; the sync engine owns encoding and the
//! meaning of every key.
//!
//! ## Design Principles
//!
//! - One value per key, replaced wholesale on every `archive`
//! - A write is durable when `archive` returns
//! - Per-key atomicity only, no cross-key transactions
//! - Must be `Send + Sync` so one backend can be shared behind an `Arc`
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral state
//! - [`FileBackend`] - One file per key inside a directory
//!
//! ## Example
//!
//! ```rust
//! use pushprofile_storage::{InMemoryBackend, PersistenceBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.archive("user.current", b"snapshot").unwrap();
//! assert_eq!(backend.load("user.current").unwrap(), Some(b"snapshot".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, PersistenceBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
