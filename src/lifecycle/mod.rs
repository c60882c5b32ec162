//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Normalize → Bind sockets
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → broadcast → every socket drains and stops
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
