//! Binding of a dispatch table to its request and upgrade sinks.

use axum::body::Body;
use axum::http::{header, Request, Response};
use futures_util::future::BoxFuture;

use crate::routing::table::{DispatchTable, RouteMatch};

/// What a dispatcher did with a request.
#[derive(Debug)]
pub enum Outcome {
    /// A response was produced.
    Handled(Response<Body>),
    /// Not handled here; the request continues down the chain.
    Next(Request<Body>),
}

/// Receives requests whose route resolved to a target.
pub trait TargetSink<T>: Send + Sync {
    fn on_request<'a>(&'a self, req: Request<Body>, matched: RouteMatch<'a, T>) -> BoxFuture<'a, Outcome>;

    /// Called instead of `on_request` for connection upgrades. Sinks that
    /// cannot serve upgrades leave them to the rest of the chain.
    fn on_upgrade<'a>(&'a self, req: Request<Body>, matched: RouteMatch<'a, T>) -> BoxFuture<'a, Outcome> {
        let _ = matched;
        Box::pin(async move { Outcome::Next(req) })
    }
}

/// A dispatch table together with the sink serving its targets.
#[derive(Debug)]
pub struct Dispatcher<T, S> {
    table: DispatchTable<T>,
    sink: S,
}

impl<T, S> Dispatcher<T, S>
where
    T: Send + Sync,
    S: TargetSink<T>,
{
    pub fn new(table: DispatchTable<T>, sink: S) -> Self {
        Self { table, sink }
    }

    pub fn table(&self) -> &DispatchTable<T> {
        &self.table
    }

    /// Resolve the request and hand it to the sink, or pass it on.
    pub async fn dispatch(&self, req: Request<Body>) -> Outcome {
        let host = request_host(&req);
        let path = req.uri().path().to_string();

        let Some(matched) = self.table.resolve(&host, &path) else {
            return Outcome::Next(req);
        };

        if is_upgrade(&req) {
            self.sink.on_upgrade(req, matched).await
        } else {
            self.sink.on_request(req, matched).await
        }
    }
}

/// Host used for routing: the `Host` header, else the URI authority.
pub fn request_host<B>(req: &Request<B>) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.to_string()))
        .unwrap_or_default()
}

/// True for requests asking to switch protocols (`Connection: upgrade`).
pub fn is_upgrade<B>(req: &Request<B>) -> bool {
    req.headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use indexmap::IndexMap;

    struct Echo;

    impl TargetSink<u16> for Echo {
        fn on_request<'a>(&'a self, _req: Request<Body>, matched: RouteMatch<'a, u16>) -> BoxFuture<'a, Outcome> {
            let status = StatusCode::from_u16(*matched.target).unwrap_or(StatusCode::OK);
            Box::pin(async move {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = status;
                Outcome::Handled(response)
            })
        }
    }

    fn dispatcher() -> Dispatcher<u16, Echo> {
        let mut routes = IndexMap::new();
        routes.insert("example.com".to_string(), 204u16);
        Dispatcher::new(DispatchTable::new(&routes, None), Echo)
    }

    #[tokio::test]
    async fn test_dispatch_to_sink() {
        let req = Request::builder()
            .uri("/")
            .header("Host", "example.com")
            .body(Body::empty())
            .unwrap();
        match dispatcher().dispatch(req).await {
            Outcome::Handled(res) => assert_eq!(res.status(), StatusCode::NO_CONTENT),
            Outcome::Next(_) => panic!("expected the sink to handle the request"),
        }
    }

    #[tokio::test]
    async fn test_unmatched_falls_through() {
        let req = Request::builder()
            .uri("/")
            .header("Host", "other.com")
            .body(Body::empty())
            .unwrap();
        assert!(matches!(dispatcher().dispatch(req).await, Outcome::Next(_)));
    }

    #[tokio::test]
    async fn test_upgrade_without_upgrade_sink_falls_through() {
        let req = Request::builder()
            .uri("/")
            .header("Host", "example.com")
            .header("Connection", "keep-alive, Upgrade")
            .header("Upgrade", "websocket")
            .body(Body::empty())
            .unwrap();
        assert!(is_upgrade(&req));
        assert!(matches!(dispatcher().dispatch(req).await, Outcome::Next(_)));
    }

    #[test]
    fn test_request_host_from_authority() {
        let req = Request::builder()
            .uri("http://api.example.com:8080/x")
            .body(())
            .unwrap();
        assert_eq!(request_host(&req), "api.example.com:8080");
    }
}
