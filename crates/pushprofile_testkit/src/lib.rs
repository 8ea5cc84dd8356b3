//! # pushprofile testkit
//!
//! Test utilities for the pushprofile sync core.
//!
//! This crate provides:
//! - Profile fixtures and temporary persistence backends
//! - Property-based test generators using proptest
//! - [`ProfileServer`], an in-memory stand-in for the remote profile service
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushprofile_testkit::prelude::*;
//!
//! #[test]
//! fn primary_moves() {
//!     let server = ProfileServer::new();
//!     server.seed_user("external:luke", User::default(), vec![installation("A", true)]);
//!     // ... drive the engine against `server`
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod profile_server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::profile_server::*;
}

pub use fixtures::*;
pub use generators::*;
pub use profile_server::{ProfileServer, ServerReply};
