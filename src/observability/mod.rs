//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → logging.rs (subscriber, filter, formatting)
//!
//! HTTP requests:
//!     → tower-http TraceLayer spans per request
//! ```
//!
//! # Design Decisions
//! - Failed route entries are logged at warn when tables are built
//! - Resolution itself only logs at trace level

pub mod logging;
