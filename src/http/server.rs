//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the per-socket dispatch chain (auth, redirect, proxy)
//! - Create one Axum Router per listening socket
//! - Bind plain-HTTP sockets and serve them until shutdown
//! - Swap route tables in place when the configuration is reloaded
//!
//! # Design Decisions
//! - Every request goes through the fallback handler; routing is host based
//! - Route tables live behind `ArcSwap`, so reloads never block requests
//! - TLS buckets are normalized but not served
//! - An interface bucket sharing its port with a wildcard bucket is served by
//!   the wildcard socket; its routes apply to connections accepted on its address

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{connect_info::Connected, ConnectInfo, Request, State},
    http::{Response, StatusCode},
    serve::IncomingStream,
    Router,
};
use indexmap::IndexMap;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;

use crate::config::schema::{NormalizedConfig, ProxyTarget, SocketBucket};
use crate::http::proxy::{http_client, HttpClient, ProxySink};
use crate::http::redirect::RedirectSink;
use crate::lifecycle::shutdown::{wait as shutdown_signal, Shutdown};
use crate::net;
use crate::routing::dispatcher::{Dispatcher, Outcome};
use crate::routing::entry::Identity;
use crate::routing::table::DispatchTable;
use crate::security::auth::{AuthGate, AuthSink, AuthTransform};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid socket address {key:?}: {source}")]
    InvalidAddress {
        key: String,
        #[source]
        source: AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// The dispatch chain of one socket.
pub struct SocketRoutes {
    pub auth: Dispatcher<Arc<AuthGate>, AuthSink>,
    pub redirect: Dispatcher<String, RedirectSink>,
    pub proxy: Dispatcher<ProxyTarget, ProxySink>,
}

impl SocketRoutes {
    pub fn build(bucket: &SocketBucket, port: Option<u16>, client: HttpClient) -> Self {
        Self {
            auth: Dispatcher::new(DispatchTable::build(&bucket.auth, port, &AuthTransform), AuthSink),
            redirect: Dispatcher::new(DispatchTable::build(&bucket.redirect, port, &Identity), RedirectSink),
            proxy: Dispatcher::new(DispatchTable::build(&bucket.proxy, port, &Identity), ProxySink::new(client)),
        }
    }

    /// Total number of entries that failed to build.
    pub fn failed_count(&self) -> usize {
        self.auth.table().failed_entries().len()
            + self.redirect.table().failed_entries().len()
            + self.proxy.table().failed_entries().len()
    }

    /// Run a request through auth, then redirects, then proxies.
    pub async fn route(&self, req: Request) -> Outcome {
        let req = match self.auth.dispatch(req).await {
            Outcome::Handled(response) => return Outcome::Handled(response),
            Outcome::Next(req) => req,
        };
        let req = match self.redirect.dispatch(req).await {
            Outcome::Handled(response) => return Outcome::Handled(response),
            Outcome::Next(req) => req,
        };
        self.proxy.dispatch(req).await
    }

    /// Like [`route`](Self::route), answering 404 when nothing matched.
    pub async fn handle(&self, req: Request) -> Response<Body> {
        match self.route(req).await {
            Outcome::Handled(response) => response,
            Outcome::Next(req) => not_found(&req),
        }
    }
}

fn not_found(req: &Request) -> Response<Body> {
    tracing::debug!(path = %req.uri().path(), "No matching route");
    let mut response = Response::new(Body::from("No matching route found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

/// Address a connection was accepted on.
#[derive(Debug, Clone, Copy)]
pub struct LocalAddr(pub Option<SocketAddr>);

impl Connected<IncomingStream<'_, TcpListener>> for LocalAddr {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        LocalAddr(stream.io().local_addr().ok())
    }
}

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<SocketRoutes>>,
    /// Routes of interface buckets served through this (wildcard) socket.
    pub interfaces: Vec<(IpAddr, Arc<ArcSwap<SocketRoutes>>)>,
}

/// Build the Axum router serving one socket.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch_handler(State(state): State<AppState>, req: Request) -> Response<Body> {
    let local_ip = req
        .extensions()
        .get::<ConnectInfo<LocalAddr>>()
        .and_then(|info| info.0 .0)
        .map(|addr| addr.ip());
    let interface = local_ip.and_then(|ip| state.interfaces.iter().find(|(addr, _)| *addr == ip));

    let req = match interface {
        Some((_, routes)) => match routes.load_full().route(req).await {
            Outcome::Handled(response) => return response,
            Outcome::Next(req) => req,
        },
        None => req,
    };
    state.routes.load_full().handle(req).await
}

struct Socket {
    address: SocketAddr,
    tls: bool,
    routes: Arc<ArcSwap<SocketRoutes>>,
}

impl Socket {
    /// True when `self` is a plain wildcard socket whose bind covers `other`.
    fn covers(&self, other: &Socket) -> bool {
        !self.tls
            && !other.tls
            && self.address.ip().is_unspecified()
            && !other.address.ip().is_unspecified()
            && self.address.port() == other.address.port()
            && self.address.is_ipv4() == other.address.is_ipv4()
    }
}

/// Serves every socket of a normalized configuration.
pub struct ProxyServer {
    sockets: IndexMap<String, Socket>,
    client: HttpClient,
}

impl ProxyServer {
    pub fn new(config: &NormalizedConfig) -> Result<Self, ServerError> {
        let client = http_client();
        let mut sockets = IndexMap::new();

        for (key, bucket) in &config.ports {
            let address = net::bind_address(key).map_err(|source| ServerError::InvalidAddress {
                key: key.clone(),
                source,
            })?;
            let routes = build_routes(key, bucket, client.clone());
            sockets.insert(
                key.clone(),
                Socket {
                    address,
                    tls: bucket.ssl.is_some(),
                    routes: Arc::new(ArcSwap::from_pointee(routes)),
                },
            );
        }

        Ok(Self { sockets, client })
    }

    /// Socket keys in declaration order.
    pub fn socket_keys(&self) -> impl Iterator<Item = &str> {
        self.sockets.keys().map(String::as_str)
    }

    /// Router serving the socket registered under `key`.
    pub fn router(&self, key: &str) -> Option<Router> {
        self.sockets.get(key).map(|socket| build_router(self.state(socket)))
    }

    /// Key of the wildcard socket that serves `key` in its place, if any.
    pub fn served_by(&self, key: &str) -> Option<&str> {
        let socket = self.sockets.get(key)?;
        self.sockets
            .iter()
            .find(|(_, wildcard)| wildcard.covers(socket))
            .map(|(wildcard_key, _)| wildcard_key.as_str())
    }

    fn state(&self, socket: &Socket) -> AppState {
        let interfaces = self
            .sockets
            .values()
            .filter(|other| socket.covers(other))
            .map(|other| (other.address.ip(), other.routes.clone()))
            .collect();
        AppState {
            routes: socket.routes.clone(),
            interfaces,
        }
    }

    /// Swap in the routes of a new configuration.
    ///
    /// Existing sockets get their tables replaced atomically. Sockets that
    /// disappeared keep listening with empty tables; new sockets are only
    /// bound on restart.
    pub fn reload(&self, config: &NormalizedConfig) {
        for (key, bucket) in &config.ports {
            match self.sockets.get(key) {
                Some(socket) => socket.routes.store(Arc::new(build_routes(key, bucket, self.client.clone()))),
                None => tracing::warn!(socket = %key, "New socket in configuration, restart required to bind it"),
            }
        }

        for (key, socket) in &self.sockets {
            if !config.ports.contains_key(key) {
                tracing::info!(socket = %key, "Socket removed from configuration, clearing its routes");
                socket
                    .routes
                    .store(Arc::new(build_routes(key, &SocketBucket::default(), self.client.clone())));
            }
        }

        tracing::info!(sockets = config.ports.len(), "Configuration reloaded");
    }

    /// Bind every plain-HTTP socket and serve until shutdown.
    ///
    /// Configurations received on `updates` are applied with [`reload`](Self::reload).
    pub async fn run(self, mut updates: UnboundedReceiver<NormalizedConfig>, shutdown: &Shutdown) -> Result<(), ServerError> {
        let mut stop = shutdown.subscribe();
        let mut servers = JoinSet::new();

        for (key, socket) in &self.sockets {
            if socket.tls {
                tracing::warn!(socket = %key, "TLS termination is not supported, skipping socket");
                continue;
            }
            if let Some(wildcard) = self.served_by(key) {
                tracing::info!(socket = %key, via = %wildcard, "Served through the wildcard socket on the same port");
                continue;
            }

            let listener = TcpListener::bind(socket.address)
                .await
                .map_err(|source| ServerError::Bind {
                    address: socket.address,
                    source,
                })?;
            tracing::info!(socket = %key, address = %socket.address, "Listening");

            let app = build_router(self.state(socket)).into_make_service_with_connect_info::<LocalAddr>();
            let signal = shutdown_signal(shutdown.subscribe());
            let key = key.clone();
            servers.spawn(async move {
                let result = axum::serve(listener, app).with_graceful_shutdown(signal).await;
                (key, result)
            });
        }

        let mut updates_open = true;
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                update = updates.recv(), if updates_open => match update {
                    Some(config) => self.reload(&config),
                    None => updates_open = false,
                },
            }
        }

        while let Some(joined) = servers.join_next().await {
            match joined {
                Ok((key, Ok(()))) => tracing::info!(socket = %key, "Socket stopped"),
                Ok((key, Err(e))) => tracing::error!(socket = %key, error = %e, "Socket server failed"),
                Err(e) => tracing::error!(error = %e, "Socket task panicked"),
            }
        }

        Ok(())
    }
}

fn build_routes(key: &str, bucket: &SocketBucket, client: HttpClient) -> SocketRoutes {
    let routes = SocketRoutes::build(bucket, net::port_of(key), client);
    let failed = routes.failed_count();
    if failed > 0 {
        tracing::warn!(socket = %key, failed, "Some route entries were rejected");
    }
    routes
}
