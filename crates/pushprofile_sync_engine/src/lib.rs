//! # pushprofile sync engine
//!
//! Offline-first synchronization of a user profile and its installations.
//!
//! This crate provides:
//! - Dirty-state tracking: a server-confirmed `current` and a locally edited
//!   `dirty` snapshot per entity, persisted through a storage backend
//! - A single-worker operation queue with two priority levels
//! - The remote operations (user/installation updates, personalization,
//!   depersonalization, primary switching)
//! - Installation-list reconciliation after remote success
//! - An HTTP transport with dynamic base-URL failover
//!
//! ## Architecture
//!
//! Every public write lands in the dirty layer first and is visible to reads
//! immediately. Syncing is done by [`Operation`]s executed one at a time on
//! the [`OperationQueue`] worker. An operation computes the delta between
//! dirty and current, sends it, and promotes what it sent to current only
//! after the server accepted it.
//!
//! ## Key Invariants
//!
//! - `current` only ever holds server-confirmed data
//! - At most one operation runs at a time
//! - Local validation failures never reach the network
//! - At most one installation in a user's list is primary

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod base_url;
mod config;
mod context;
mod dirty;
mod error;
mod http;
mod operations;
mod queue;
mod reconcile;
mod service;
mod transport;

pub use base_url::{BaseUrlResolver, DYNAMIC_BASE_URL_KEY, NEW_BASE_URL_HEADER};
pub use config::{RetryConfig, SyncConfig, DEFAULT_BASE_URL};
pub use context::SyncContext;
pub use dirty::{DirtyStateStore, EntityKind, Slot, Snapshot};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpFailure, HttpRequest, HttpResponse, HttpTransport, PUSH_REGISTRATION_ID_HEADER};
pub use operations::{
    DepersonalizeCurrent, DepersonalizeOther, FetchUser, Operation, Personalize, SetPrimary, SyncOutcome,
    UpdateInstallation, UpdateUser,
};
pub use queue::{Completion, OperationPriority, OperationQueue, QueueStats};
pub use reconcile::{apply_device_removal, apply_primary_switch, InstallationEvent};
pub use service::UserDataService;
pub use transport::{FixtureReply, FixtureTransport, OfflineTransport, ProfileTransport};
