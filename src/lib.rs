//! Host-based reverse proxy with hot-reloadable dispatch tables.
//!
//! A friendly configuration (groups, subdomains, interfaces, ports) is
//! normalized into one bucket of routes per listening socket. Each bucket
//! becomes three dispatch tables (auth, redirect, proxy) that map a request
//! host and path to a target.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::{normalize, FriendlyConfig, NormalizedConfig};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use routing::{DispatchTable, Dispatcher};
