//! Upstream forwarding for proxy targets.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the target's base address
//! - Forward the request with the shared HTTP client
//! - Relay upgraded connections (WebSocket and friends) byte for byte
//!
//! # Design Decisions
//! - The `Host` header is passed through unchanged
//! - Upstream failures map to 502 Bad Gateway
//! - Upgrades are relayed with `copy_bidirectional` once both sides switch

use axum::body::Body;
use axum::http::{header, HeaderName, Request, Response, StatusCode, Uri, Version};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyTarget;
use crate::routing::dispatcher::{Outcome, TargetSink};
use crate::routing::table::RouteMatch;

/// Client shared by every proxy sink.
pub type HttpClient = Client<HttpConnector, Body>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid proxy target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// Map the request URI onto the target.
///
/// Ports forward to `127.0.0.1`; addresses without a scheme are taken as
/// `http://`. A path on the target base is prefixed to the request path.
pub fn upstream_uri(target: &ProxyTarget, original: &Uri) -> Result<Uri, ProxyError> {
    let base = match target {
        ProxyTarget::Port(port) => format!("http://127.0.0.1:{}", port),
        ProxyTarget::Address(addr) if addr.contains("://") => addr.clone(),
        ProxyTarget::Address(addr) => format!("http://{}", addr),
    };
    let invalid = |reason: String| ProxyError::InvalidTarget {
        target: target.to_string(),
        reason,
    };

    let base = Url::parse(&base).map_err(|e| invalid(e.to_string()))?;
    let host = base.host_str().ok_or_else(|| invalid("missing host".into()))?;
    let authority = match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let prefix = base.path().trim_end_matches('/');
    let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("{}://{}{}{}", base.scheme(), authority, prefix, path_and_query)
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| invalid(e.to_string()))
}

/// Forwards matched requests to their upstream.
#[derive(Clone)]
pub struct ProxySink {
    client: HttpClient,
}

impl ProxySink {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    async fn forward(&self, req: Request<Body>, target: &ProxyTarget) -> Result<Response<Body>, ProxyError> {
        let (mut parts, body) = req.into_parts();
        parts.uri = upstream_uri(target, &parts.uri)?;
        parts.version = Version::HTTP_11;
        for name in &HOP_BY_HOP {
            parts.headers.remove(name);
        }

        let response = self.client.request(Request::from_parts(parts, body)).await?;
        Ok(response.map(Body::new))
    }

    async fn forward_upgrade(&self, mut req: Request<Body>, target: &ProxyTarget) -> Result<Response<Body>, ProxyError> {
        let client_upgrade = hyper::upgrade::on(&mut req);
        let (mut parts, body) = req.into_parts();
        parts.uri = upstream_uri(target, &parts.uri)?;
        parts.version = Version::HTTP_11;

        let mut response = self.client.request(Request::from_parts(parts, body)).await?;
        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            let upstream_upgrade = hyper::upgrade::on(&mut response);
            let target = target.to_string();
            tokio::spawn(async move {
                match tokio::try_join!(client_upgrade, upstream_upgrade) {
                    Ok((client, upstream)) => {
                        let mut client = TokioIo::new(client);
                        let mut upstream = TokioIo::new(upstream);
                        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                            Ok((sent, received)) => {
                                tracing::debug!(upstream = %target, sent, received, "Upgraded connection closed")
                            }
                            Err(e) => tracing::debug!(upstream = %target, error = %e, "Upgraded connection aborted"),
                        }
                    }
                    Err(e) => tracing::warn!(upstream = %target, error = %e, "Connection upgrade failed"),
                }
            });
        }

        Ok(response.map(Body::new))
    }
}

fn bad_gateway(target: &ProxyTarget, error: ProxyError) -> Outcome {
    tracing::error!(upstream = %target, error = %error, "Upstream error");
    let mut response = Response::new(Body::from("Upstream request failed"));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    Outcome::Handled(response)
}

impl TargetSink<ProxyTarget> for ProxySink {
    fn on_request<'a>(&'a self, req: Request<Body>, matched: RouteMatch<'a, ProxyTarget>) -> BoxFuture<'a, Outcome> {
        let target = matched.target;
        Box::pin(async move {
            match self.forward(req, target).await {
                Ok(response) => Outcome::Handled(response),
                Err(e) => bad_gateway(target, e),
            }
        })
    }

    fn on_upgrade<'a>(&'a self, req: Request<Body>, matched: RouteMatch<'a, ProxyTarget>) -> BoxFuture<'a, Outcome> {
        let target = matched.target;
        Box::pin(async move {
            match self.forward_upgrade(req, target).await {
                Ok(response) => Outcome::Handled(response),
                Err(e) => bad_gateway(target, e),
            }
        })
    }
}
