//! Expansion of the friendly configuration into per-socket route maps.
//!
//! # Responsibilities
//! - Turn `http`/`https` declarations into socket buckets
//! - Place every route on the buckets its port, interfaces and group select
//! - Expand subdomain aliases and `[target]` templates
//!
//! # Design Decisions
//! - Pure function: `FriendlyConfig → NormalizedConfig`
//! - Groups and interfaces are macro-expanded here and not retained
//! - Repeated keys inside a bucket overwrite, they never merge

use indexmap::IndexMap;
use thiserror::Error;

use crate::config::schema::{
    AuthConfig, FriendlyConfig, GroupConfig, ListenerSpec, NormalizedConfig, ProxyTarget, RouteValue,
    SocketBucket, SslOptions, TargetValue,
};

/// Port used by `http = true`.
pub const DEFAULT_HTTP_PORT: u16 = 80;
/// Port used by `https = true`.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

const REDIRECT_PREFIX: &str = "redirect: ";
const TARGET_PLACEHOLDER: &str = "[target]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("route {key:?} references unknown group {group:?}")]
    UnknownGroup { key: String, group: String },

    #[error("invalid route key {key:?}: {reason}")]
    InvalidRouteKey { key: String, reason: &'static str },

    #[error("route {key:?} uses [target] but has no target value")]
    MissingTarget { key: String },
}

/// Which buckets a route without an explicit port lands on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortlessPolicy {
    /// Every declared `http` and `https` port.
    #[default]
    AllListeners,
    /// Only the declared `http` ports.
    HttpOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub portless: PortlessPolicy,
    /// Port for portless routes when no listener qualifies.
    pub fallback_port: u16,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            portless: PortlessPolicy::AllListeners,
            fallback_port: DEFAULT_HTTP_PORT,
        }
    }
}

/// A parsed `[group | ]host[:port][/path]` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteKey {
    pub group: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    /// Empty, or starting with `/`.
    pub path: String,
}

impl RouteKey {
    pub fn parse(raw: &str) -> Result<Self, NormalizeError> {
        let invalid = |reason| NormalizeError::InvalidRouteKey {
            key: raw.to_string(),
            reason,
        };

        let (group, spec) = match raw.split_once(" | ") {
            Some((group, spec)) => (Some(group.trim().to_string()), spec.trim()),
            None => (None, raw.trim()),
        };
        if group.as_deref() == Some("") {
            return Err(invalid("empty group name"));
        }

        let (host_port, path) = match spec.find('/') {
            Some(i) => (&spec[..i], &spec[i..]),
            None => (spec, ""),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
                let port = port.parse::<u16>().map_err(|_| invalid("port out of range"))?;
                (host, Some(port))
            }
            _ => (host_port, None),
        };
        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        Ok(Self {
            group,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// The key as stored in a bucket: host plus path, without port or group.
    pub fn host_spec(&self) -> String {
        format!("{}{}", self.host, self.path)
    }
}

/// Normalize with the default options.
pub fn normalize(config: &FriendlyConfig) -> Result<NormalizedConfig, NormalizeError> {
    normalize_with(config, &NormalizeOptions::default())
}

pub fn normalize_with(
    config: &FriendlyConfig,
    options: &NormalizeOptions,
) -> Result<NormalizedConfig, NormalizeError> {
    let mut http_ports = Vec::new();
    if let Some(spec) = &config.http {
        collect_http(spec, &mut http_ports);
    }
    let mut https_ports = IndexMap::new();
    if let Some(spec) = &config.https {
        collect_https(spec, &mut https_ports);
    }

    let mut normalizer = Normalizer {
        config,
        options,
        interfaces: effective_interfaces(&config.interfaces),
        http_ports,
        https_ports,
        out: NormalizedConfig::default(),
    };
    normalizer.run()?;

    tracing::debug!(buckets = normalizer.out.ports.len(), "Configuration normalized");
    Ok(normalizer.out)
}

fn collect_http(spec: &ListenerSpec, out: &mut Vec<u16>) {
    match spec {
        ListenerSpec::Enabled(true) => out.push(DEFAULT_HTTP_PORT),
        ListenerSpec::Enabled(false) => {}
        ListenerSpec::Port(port) => out.push(*port),
        ListenerSpec::Detailed(options) => out.push(options.port),
        ListenerSpec::List(specs) => specs.iter().for_each(|s| collect_http(s, out)),
    }
}

fn collect_https(spec: &ListenerSpec, out: &mut IndexMap<u16, SslOptions>) {
    match spec {
        ListenerSpec::Enabled(true) => {
            out.insert(DEFAULT_HTTPS_PORT, SslOptions::default());
        }
        ListenerSpec::Enabled(false) => {}
        ListenerSpec::Port(port) => {
            out.insert(*port, SslOptions::default());
        }
        ListenerSpec::Detailed(options) => {
            out.insert(options.port, options.ssl.clone());
        }
        ListenerSpec::List(specs) => specs.iter().for_each(|s| collect_https(s, out)),
    }
}

/// Interfaces to bind; empty means all, which `"*"` forces.
fn effective_interfaces(interfaces: &[String]) -> Vec<String> {
    if interfaces.iter().any(|i| i == "*") {
        Vec::new()
    } else {
        interfaces.to_vec()
    }
}

/// `port`, or `interface:port` with IPv6 interfaces bracketed.
pub fn bucket_key(interface: Option<&str>, port: u16) -> String {
    match interface {
        None => port.to_string(),
        Some(iface) if iface.contains(':') && !iface.starts_with('[') => format!("[{}]:{}", iface, port),
        Some(iface) => format!("{}:{}", iface, port),
    }
}

enum Leaf {
    Proxy(ProxyTarget),
    Redirect(String),
    Auth(AuthConfig),
}

impl Leaf {
    fn classify(value: TargetValue) -> Self {
        match value {
            TargetValue::Port(port) => Leaf::Proxy(ProxyTarget::Port(port)),
            TargetValue::Text(text) => match text.strip_prefix(REDIRECT_PREFIX) {
                Some(template) => Leaf::Redirect(template.to_string()),
                None => Leaf::Proxy(ProxyTarget::Address(text)),
            },
        }
    }
}

struct Normalizer<'a> {
    config: &'a FriendlyConfig,
    options: &'a NormalizeOptions,
    interfaces: Vec<String>,
    http_ports: Vec<u16>,
    https_ports: IndexMap<u16, SslOptions>,
    out: NormalizedConfig,
}

impl<'a> Normalizer<'a> {
    fn run(&mut self) -> Result<(), NormalizeError> {
        let listener_ports: Vec<u16> = self
            .http_ports
            .iter()
            .copied()
            .chain(self.https_ports.keys().copied())
            .collect();
        let interfaces = self.interfaces.clone();
        for port in listener_ports {
            for key in bucket_keys(&interfaces, port) {
                self.bucket(key, port);
            }
        }

        let config = self.config;
        for (raw_key, value) in &config.routes {
            let key = RouteKey::parse(raw_key)?;
            let group = self.group(raw_key, &key)?;
            let leaves = expand_route(raw_key, &key, group, value)?;
            self.place(&key, group, leaves);
        }

        for (raw_key, auth) in &config.auth {
            let key = RouteKey::parse(raw_key)?;
            let group = self.group(raw_key, &key)?;
            let prefixes: Vec<&str> = match group {
                Some(g) if !g.subdomains.is_empty() => g.subdomains.keys().map(String::as_str).collect(),
                _ => vec![""],
            };
            let leaves = prefixes
                .into_iter()
                .map(|prefix| (format!("{}{}", prefix, key.host_spec()), Leaf::Auth(auth.clone())))
                .collect();
            self.place(&key, group, leaves);
        }

        Ok(())
    }

    fn group(&self, raw_key: &str, key: &RouteKey) -> Result<Option<&'a GroupConfig>, NormalizeError> {
        let config = self.config;
        match &key.group {
            None => Ok(None),
            Some(name) => config
                .groups
                .get(name)
                .map(Some)
                .ok_or_else(|| NormalizeError::UnknownGroup {
                    key: raw_key.to_string(),
                    group: name.clone(),
                }),
        }
    }

    fn bucket(&mut self, key: String, port: u16) -> &mut SocketBucket {
        let ssl = self.https_ports.get(&port).cloned();
        self.out.ports.entry(key).or_insert_with(|| SocketBucket {
            ssl,
            ..Default::default()
        })
    }

    /// Ports a route applies to: its own, its group's, or the portless default.
    fn ports_for(&self, key: &RouteKey, group: Option<&GroupConfig>) -> Vec<u16> {
        if let Some(port) = key.port {
            return vec![port];
        }
        if let Some(g) = group.filter(|g| !g.ports.is_empty()) {
            return g.ports.clone();
        }

        let mut ports = self.http_ports.clone();
        if self.options.portless == PortlessPolicy::AllListeners {
            ports.extend(self.https_ports.keys().copied());
        }
        let mut seen = Vec::with_capacity(ports.len());
        ports.retain(|p| {
            let fresh = !seen.contains(p);
            seen.push(*p);
            fresh
        });
        if ports.is_empty() {
            ports.push(self.options.fallback_port);
        }
        ports
    }

    fn place(&mut self, key: &RouteKey, group: Option<&GroupConfig>, leaves: Vec<(String, Leaf)>) {
        let interfaces = match group {
            Some(g) if !g.interfaces.is_empty() => effective_interfaces(&g.interfaces),
            _ => self.interfaces.clone(),
        };

        for port in self.ports_for(key, group) {
            for bucket_key in bucket_keys(&interfaces, port) {
                let bucket = self.bucket(bucket_key, port);
                for (host_spec, leaf) in &leaves {
                    match leaf {
                        Leaf::Proxy(target) => {
                            bucket.proxy.insert(host_spec.clone(), target.clone());
                        }
                        Leaf::Redirect(template) => {
                            bucket.redirect.insert(host_spec.clone(), template.clone());
                        }
                        Leaf::Auth(auth) => {
                            bucket.auth.insert(host_spec.clone(), auth.clone());
                        }
                    }
                }
            }
        }
    }
}

fn bucket_keys(interfaces: &[String], port: u16) -> Vec<String> {
    if interfaces.is_empty() {
        vec![bucket_key(None, port)]
    } else {
        interfaces.iter().map(|i| bucket_key(Some(i), port)).collect()
    }
}

/// Host specs and leaf targets a single route expands into.
fn expand_route(
    raw_key: &str,
    key: &RouteKey,
    group: Option<&GroupConfig>,
    value: &RouteValue,
) -> Result<Vec<(String, Leaf)>, NormalizeError> {
    let (subdomains, own) = match value {
        RouteValue::Expanded(route) => (Some(&route.subdomains), route.target.as_ref()),
        RouteValue::Simple(target) => (
            group.map(|g| &g.subdomains).filter(|s| !s.is_empty()),
            Some(target),
        ),
    };

    let host_spec = key.host_spec();
    match subdomains {
        None => {
            let target = own.cloned().ok_or_else(|| NormalizeError::MissingTarget {
                key: raw_key.to_string(),
            })?;
            Ok(vec![(host_spec, Leaf::classify(target))])
        }
        Some(subdomains) => subdomains
            .iter()
            .map(|(prefix, template)| {
                let target = substitute_target(raw_key, template, own)?;
                Ok((format!("{}{}", prefix, host_spec), Leaf::classify(target)))
            })
            .collect(),
    }
}

/// Resolve `[target]` in a subdomain template against the route's own value.
fn substitute_target(
    raw_key: &str,
    template: &TargetValue,
    own: Option<&TargetValue>,
) -> Result<TargetValue, NormalizeError> {
    let TargetValue::Text(text) = template else {
        return Ok(template.clone());
    };
    if !text.contains(TARGET_PLACEHOLDER) {
        return Ok(template.clone());
    }

    let own = own.ok_or_else(|| NormalizeError::MissingTarget {
        key: raw_key.to_string(),
    })?;
    if text == TARGET_PLACEHOLDER {
        return Ok(own.clone());
    }
    Ok(TargetValue::Text(text.replace(TARGET_PLACEHOLDER, &own.to_string())))
}
