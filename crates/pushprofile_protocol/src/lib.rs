//! # pushprofile protocol
//!
//! Profile model and remote request types for the pushprofile sync core.
//!
//! This crate provides:
//! - `User`, `Installation` and `InternalData` snapshots
//! - `UserIdentity` / `UserAttributes` used by personalization
//! - `Delta`, the field-level diff between a dirty and a current snapshot
//! - `RemoteRequest` / `RemoteResponse`, the structured shapes handed to
//!   and returned by a transport
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod delta;
mod error;
mod identity;
mod internal;
mod model;
mod request;
mod response;

pub use delta::Delta;
pub use error::{ProtocolError, ProtocolResult};
pub use identity::{UserAttributes, UserIdentity};
pub use internal::{DepersonalizationStatus, InternalData, Location};
pub use model::{AttributeValue, CustomAttributes, Email, Gender, Installation, Phone, User};
pub use request::{Method, RemoteRequest, RequestKind};
pub use response::{RemoteResponse, ServiceException};
