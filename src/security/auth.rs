//! Basic authentication for guarded routes.
//!
//! Auth entries are ordinary route keys whose values describe credentials.
//! The entry transform turns each value into an [`AuthGate`]; requests that
//! resolve to a gate must present valid `Basic` credentials before the chain
//! continues. The `Authorization` header is stripped once accepted.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use base64::Engine;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::schema::AuthConfig;
use crate::routing::dispatcher::{Outcome, TargetSink};
use crate::routing::entry::{BoxError, EntryTransform};
use crate::routing::table::RouteMatch;

/// Realm used when the configuration names none.
pub const DEFAULT_REALM: &str = "Enter password";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("cannot read credentials file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: expected user:password")]
    Malformed { path: String, line: usize },

    #[error("no credentials file or users configured")]
    NoCredentials,
}

/// Credentials guarding one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGate {
    realm: String,
    users: HashMap<String, String>,
}

impl AuthGate {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let (file, realm, inline) = match config {
            AuthConfig::File(path) => (Some(path.as_str()), None, None),
            AuthConfig::Options(options) => (options.file.as_deref(), options.realm.clone(), Some(&options.users)),
        };

        let mut users = HashMap::new();
        if let Some(path) = file {
            users.extend(read_credentials(path)?);
        }
        if let Some(inline) = inline {
            users.extend(inline.iter().map(|(u, p)| (u.clone(), p.clone())));
        }
        if file.is_none() && users.is_empty() {
            return Err(AuthError::NoCredentials);
        }

        Ok(Self {
            realm: realm.unwrap_or_else(|| DEFAULT_REALM.to_string()),
            users,
        })
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Check an `Authorization` header value.
    pub fn accepts(&self, authorization: Option<&HeaderValue>) -> bool {
        let Some((user, password)) = authorization.and_then(parse_basic) else {
            return false;
        };
        self.users.get(&user).is_some_and(|expected| *expected == password)
    }

    fn challenge(&self) -> Response<Body> {
        let mut response = Response::new(Body::from("Unauthorized"));
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        let realm = self.realm.replace('"', "'");
        if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm)) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

fn read_credentials(path: &str) -> Result<Vec<(String, String)>, AuthError> {
    let content = fs::read_to_string(path).map_err(|source| AuthError::Io {
        path: path.to_string(),
        source,
    })?;

    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            line.split_once(':')
                .filter(|(user, _)| !user.is_empty())
                .map(|(user, password)| (user.to_string(), password.to_string()))
                .ok_or_else(|| AuthError::Malformed {
                    path: path.to_string(),
                    line: line_no,
                })
        })
        .collect()
}

/// Decode `Basic <base64(user:password)>`.
fn parse_basic(value: &HeaderValue) -> Option<(String, String)> {
    let value = value.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Builds an [`AuthGate`] per auth entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthTransform;

impl EntryTransform<AuthConfig> for AuthTransform {
    type Target = Arc<AuthGate>;

    fn transform(&self, key: &str, raw: &AuthConfig) -> Result<(String, Arc<AuthGate>), BoxError> {
        let gate = AuthGate::from_config(raw)?;
        Ok((key.to_string(), Arc::new(gate)))
    }
}

/// Lets authenticated requests continue down the chain, challenges the rest.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthSink;

impl AuthSink {
    fn gate(&self, mut req: Request<Body>, gate: &AuthGate) -> Outcome {
        if gate.accepts(req.headers().get(header::AUTHORIZATION)) {
            req.headers_mut().remove(header::AUTHORIZATION);
            Outcome::Next(req)
        } else {
            tracing::debug!(realm = %gate.realm(), path = %req.uri().path(), "Authentication required");
            Outcome::Handled(gate.challenge())
        }
    }
}

impl TargetSink<Arc<AuthGate>> for AuthSink {
    fn on_request<'a>(&'a self, req: Request<Body>, matched: RouteMatch<'a, Arc<AuthGate>>) -> BoxFuture<'a, Outcome> {
        let outcome = self.gate(req, matched.target);
        Box::pin(async move { outcome })
    }

    fn on_upgrade<'a>(&'a self, req: Request<Body>, matched: RouteMatch<'a, Arc<AuthGate>>) -> BoxFuture<'a, Outcome> {
        self.on_request(req, matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AuthOptions;
    use crate::routing::table::DispatchTable;
    use indexmap::IndexMap;
    use std::io::Write;

    fn basic(user: &str, password: &str) -> HeaderValue {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
        HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap()
    }

    fn inline(users: &[(&str, &str)]) -> AuthConfig {
        AuthConfig::Options(AuthOptions {
            users: users.iter().map(|(u, p)| (u.to_string(), p.to_string())).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_file_credentials_and_default_realm() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# staff\nalice:wonderland\n\nbob:builder").unwrap();

        let gate = AuthGate::from_config(&AuthConfig::File(file.path().display().to_string())).unwrap();
        assert_eq!(gate.realm(), DEFAULT_REALM);
        assert!(gate.accepts(Some(&basic("alice", "wonderland"))));
        assert!(gate.accepts(Some(&basic("bob", "builder"))));
        assert!(!gate.accepts(Some(&basic("bob", "wonderland"))));
        assert!(!gate.accepts(None));
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alice:ok\nnocolon").unwrap();
        let err = AuthGate::from_config(&AuthConfig::File(file.path().display().to_string())).unwrap_err();
        assert!(matches!(err, AuthError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_missing_credentials() {
        let err = AuthGate::from_config(&AuthConfig::Options(AuthOptions::default())).unwrap_err();
        assert!(matches!(err, AuthError::NoCredentials));

        let err = AuthGate::from_config(&AuthConfig::File("/nonexistent/users".into())).unwrap_err();
        assert!(matches!(err, AuthError::Io { .. }));
    }

    #[test]
    fn test_failed_gate_does_not_block_other_entries() {
        let mut routes = IndexMap::new();
        routes.insert("broken.com".to_string(), AuthConfig::File("/nonexistent/users".into()));
        routes.insert("admin.com".to_string(), inline(&[("root", "toor")]));

        let table = DispatchTable::build(&routes, None, &AuthTransform);
        assert!(table.resolve("admin.com", "/").is_some());
        assert!(table.resolve("broken.com", "/").is_none());
        assert!(table.failed_entries().contains_key("broken.com"));
    }

    #[tokio::test]
    async fn test_sink_strips_authorization() {
        let gate = Arc::new(AuthGate::from_config(&inline(&[("root", "toor")])).unwrap());
        let mut routes = IndexMap::new();
        routes.insert("admin.com".to_string(), Arc::clone(&gate));
        let table = DispatchTable::new(&routes, None);

        let req = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, basic("root", "toor"))
            .body(Body::empty())
            .unwrap();
        let matched = table.resolve("admin.com", "/").unwrap();
        let Outcome::Next(req) = AuthSink.on_request(req, matched).await else {
            panic!("valid credentials must pass");
        };
        assert!(req.headers().get(header::AUTHORIZATION).is_none());

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let matched = table.resolve("admin.com", "/").unwrap();
        let Outcome::Handled(response) = AuthSink.on_request(req, matched).await else {
            panic!("missing credentials must be challenged");
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"Enter password\""
        );
    }
}
