//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, one router per socket)
//!     → auth dispatch table (security::auth)
//!     → redirect.rs (302 with filled-in template)
//!     → proxy.rs (forward or relay upgrade)
//!     → 404 when nothing matched
//! ```

pub mod proxy;
pub mod redirect;
pub mod server;

pub use proxy::{http_client, HttpClient, ProxySink};
pub use redirect::RedirectSink;
pub use server::{ProxyServer, ServerError, SocketRoutes};
