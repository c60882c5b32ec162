//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (Basic credentials for protected hosts)
//!     → Pass to redirect and proxy tables
//! ```
//!
//! # Design Decisions
//! - An auth entry that cannot load its credentials is left out of the
//!   table and reported through the failed entries
//! - Credentials are stripped before the request goes upstream

pub mod auth;

pub use auth::{AuthGate, AuthSink, AuthTransform};
