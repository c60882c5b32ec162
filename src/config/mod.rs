//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML/JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → normalize.rs (groups × interfaces × ports × subdomains)
//!     → NormalizedConfig: socket bucket → proxy/redirect/auth maps
//!     → one set of dispatch tables per socket
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads, validates and normalizes
//!     → server swaps in freshly built tables
//! ```
//!
//! # Design Decisions
//! - Route maps keep declaration order (it decides pattern precedence)
//! - A config that fails to load never replaces the running one

pub mod loader;
pub mod normalize;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use normalize::{normalize, normalize_with, NormalizeOptions, PortlessPolicy};
pub use schema::{FriendlyConfig, NormalizedConfig, ProxyTarget, SocketBucket};
