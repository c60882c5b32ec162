//! Configuration schema definitions.
//!
//! Two shapes live here: the operator-facing [`FriendlyConfig`] read from
//! disk, and the flat [`NormalizedConfig`] the dispatch tables are built from.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Root of the operator-facing configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FriendlyConfig {
    /// Plain HTTP listeners.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<ListenerSpec>,

    /// TLS listeners; every entry carries SSL options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub https: Option<ListenerSpec>,

    /// Default bind addresses. `"*"` means all interfaces.
    pub interfaces: Vec<String>,

    /// Named interface/port/subdomain bundles referenced as `group | host`.
    pub groups: IndexMap<String, GroupConfig>,

    /// Route key → target.
    pub routes: IndexMap<String, RouteValue>,

    /// Route key → credentials guarding it.
    pub auth: IndexMap<String, AuthConfig>,
}

/// `true`, a port, an object with a port, or a list of those.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ListenerSpec {
    Enabled(bool),
    Port(u16),
    Detailed(ListenerOptions),
    List(Vec<ListenerSpec>),
}

/// A listener given as an object: its port plus SSL options.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ListenerOptions {
    pub port: u16,
    #[serde(flatten)]
    pub ssl: SslOptions,
}

/// SSL options attached to a TLS socket bucket.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SslOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    #[serde(rename = "cipherList", alias = "cipher_list", skip_serializing_if = "Option::is_none")]
    pub cipher_list: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub spdy: Option<bool>,

    /// Anything else is passed through untouched.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// A named bundle used to macro-expand route keys.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupConfig {
    pub interfaces: Vec<String>,
    pub ports: Vec<u16>,
    /// Prefix → target template. `""` is the bare host.
    pub subdomains: IndexMap<String, TargetValue>,
}

/// A route's value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RouteValue {
    Simple(TargetValue),
    Expanded(ExpandedRoute),
}

/// A route declared with its own subdomain aliases.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExpandedRoute {
    /// Value substituted for `[target]` in the subdomain templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetValue>,
    pub subdomains: IndexMap<String, TargetValue>,
}

/// A bare port (proxy), `"redirect: <url>"`, or a proxy address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TargetValue {
    Port(u16),
    Text(String),
}

impl fmt::Display for TargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetValue::Port(port) => write!(f, "{}", port),
            TargetValue::Text(text) => f.write_str(text),
        }
    }
}

/// Credentials for an auth-guarded route.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AuthConfig {
    /// Path to a `user:password` file.
    File(String),
    Options(AuthOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,

    /// Inline `user → password` pairs.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub users: IndexMap<String, String>,
}

/// Where a proxy route forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProxyTarget {
    /// A local port.
    Port(u16),
    /// `host:port` or a URL base.
    Address(String),
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyTarget::Port(port) => write!(f, "{}", port),
            ProxyTarget::Address(addr) => f.write_str(addr),
        }
    }
}

/// Output of normalization: socket bucket key → routes for that socket.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NormalizedConfig {
    pub ports: IndexMap<String, SocketBucket>,
}

/// Route maps for one listening socket.
///
/// Keys are `host` or `host/path`, usable directly as dispatch table keys.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketBucket {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub proxy: IndexMap<String, ProxyTarget>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub redirect: IndexMap<String, String>,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub auth: IndexMap<String, AuthConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslOptions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_listeners() {
        let config: FriendlyConfig = toml::from_str(
            r#"
            http = [80, 8080]
            https = [{ port = 443, cipherList = ["A", "B"], spdy = true, sessionTimeout = 300 }]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.http,
            Some(ListenerSpec::List(vec![ListenerSpec::Port(80), ListenerSpec::Port(8080)]))
        );
        let Some(ListenerSpec::List(https)) = config.https else {
            panic!("expected a list of https listeners");
        };
        let ListenerSpec::Detailed(options) = &https[0] else {
            panic!("expected a detailed listener");
        };
        assert_eq!(options.port, 443);
        assert_eq!(options.ssl.cipher_list, Some(vec!["A".to_string(), "B".to_string()]));
        assert_eq!(options.ssl.spdy, Some(true));
        assert_eq!(options.ssl.extra.get("sessionTimeout"), Some(&serde_json::json!(300)));
    }

    #[test]
    fn test_parse_route_values() {
        let config: FriendlyConfig = serde_json::from_str(
            r#"{
                "http": true,
                "routes": {
                    "a.com": 3000,
                    "b.com/old": "redirect: https://b.org/[path]",
                    "c.com": "10.0.0.2:8080",
                    "d.com": { "subdomains": { "www.": 3040 } }
                },
                "auth": {
                    "a.com": "users.htpasswd",
                    "c.com": { "users": { "admin": "secret" } }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.http, Some(ListenerSpec::Enabled(true)));
        let keys: Vec<&str> = config.routes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a.com", "b.com/old", "c.com", "d.com"]);
        assert_eq!(config.routes["a.com"], RouteValue::Simple(TargetValue::Port(3000)));
        assert!(matches!(config.routes["d.com"], RouteValue::Expanded(_)));
        assert_eq!(config.auth["a.com"], AuthConfig::File("users.htpasswd".into()));
        assert!(matches!(config.auth["c.com"], AuthConfig::Options(_)));
    }

    #[test]
    fn test_bucket_serialization_skips_empty_maps() {
        let bucket = SocketBucket {
            ssl: Some(SslOptions::default()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&bucket).unwrap(), serde_json::json!({ "ssl": {} }));
    }
}
