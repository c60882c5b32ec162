//! Redirect targets.
//!
//! A redirect target is a URL template. Placeholders are filled from the
//! request and the groups captured while resolving it:
//! - `[path]`: the `rest` path capture, else the decoded pathname without its leading `/`
//! - `[host]`: the `host` capture, else the request host
//! - `[1]`..`[9]`: positional host captures

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use futures_util::future::BoxFuture;

use crate::routing::dispatcher::{request_host, Outcome, TargetSink};
use crate::routing::entry::decode_path;
use crate::routing::table::RouteMatch;

/// Answers matched requests with `302 Found`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedirectSink;

impl TargetSink<String> for RedirectSink {
    fn on_request<'a>(&'a self, req: Request<Body>, matched: RouteMatch<'a, String>) -> BoxFuture<'a, Outcome> {
        let host = request_host(&req);
        let location = render_location(matched.target, &host, req.uri().path(), &matched);
        tracing::debug!(host = %host, location = %location, "Redirecting");

        Box::pin(async move { Outcome::Handled(redirect_response(&location)) })
    }
}

/// Fill a redirect template for one request.
pub fn render_location<T>(template: &str, host: &str, pathname: &str, matched: &RouteMatch<'_, T>) -> String {
    substitute(template, |name| match name {
        "path" => Some(
            matched
                .path
                .as_ref()
                .and_then(|caps| caps.name("rest"))
                .map(str::to_string)
                .unwrap_or_else(|| {
                    let decoded = decode_path(pathname);
                    decoded.strip_prefix('/').unwrap_or(&decoded[..]).to_string()
                }),
        ),
        "host" => Some(
            matched
                .host
                .as_ref()
                .and_then(|caps| caps.name("host"))
                .unwrap_or(host)
                .to_string(),
        ),
        _ => {
            let index: usize = name.parse().ok()?;
            let value = matched.host.as_ref().and_then(|caps| caps.get(index));
            Some(value.unwrap_or_default().to_string())
        }
    })
}

/// Replace `[name]` placeholders in one pass; unknown names are kept as is.
pub fn substitute<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']').and_then(|close| lookup(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                out.push_str(&value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn redirect_response(location: &str) -> Response<Body> {
    match HeaderValue::from_bytes(location.as_bytes()) {
        Ok(value) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => {
            tracing::warn!(location = %location, "Redirect target is not a valid header value");
            let mut response = Response::new(Body::from("Invalid redirect target"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}
