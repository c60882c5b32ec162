//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Table construction (at startup / reload), per socket:
//!     route map (key → raw value, declaration order)
//!     → entry.rs (split host/path, run entry transform)
//!     → matcher.rs (compile globs and anchored regexes)
//!     → table.rs (literal slots + ordered pattern list + failed entries)
//!
//! Incoming request (host, path, upgrade flag)
//!     → dispatcher.rs (resolve against the table)
//!     → TargetSink (redirect / auth / proxy) or fall through
//! ```
//!
//! # Design Decisions
//! - Tables are immutable once built; reload builds new ones
//! - Literal hosts win over patterns; patterns are first-match-wins
//! - Captured groups are returned with the target, not stored on the request

pub mod dispatcher;
pub mod entry;
pub mod matcher;
pub mod table;

pub use dispatcher::{Dispatcher, Outcome, TargetSink};
pub use entry::{BoxError, EntryError, EntryTransform, Identity, RouteEntry, TransformFn};
pub use matcher::Captures;
pub use table::{DispatchTable, FailedEntry, RouteMatch};
