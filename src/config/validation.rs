//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (route keys reference existing groups)
//! - Validate value ranges (ports non-zero, interfaces are IP addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FriendlyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;

use thiserror::Error;

use crate::config::normalize::RouteKey;
use crate::config::schema::{FriendlyConfig, ListenerSpec, RouteValue, TargetValue};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{context}: port 0 is not a valid listening port")]
    ZeroPort { context: String },

    #[error("{context}: interface {interface:?} is neither \"*\" nor an IP address")]
    InvalidInterface { context: String, interface: String },

    #[error("route {key:?}: {reason}")]
    InvalidRoute { key: String, reason: String },

    #[error("route {key:?} references unknown group {group:?}")]
    UnknownGroup { key: String, group: String },
}

/// Validate a friendly configuration, collecting every problem found.
pub fn validate_config(config: &FriendlyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, spec) in [("http", &config.http), ("https", &config.https)] {
        if let Some(spec) = spec {
            check_listener(name, spec, &mut errors);
        }
    }

    check_interfaces("interfaces", &config.interfaces, &mut errors);

    for (name, group) in &config.groups {
        let context = format!("group {:?}", name);
        check_interfaces(&context, &group.interfaces, &mut errors);
        if group.ports.contains(&0) {
            errors.push(ValidationError::ZeroPort { context });
        }
    }

    for (key, value) in &config.routes {
        check_route_key(config, key, &mut errors);

        let targets: Vec<&TargetValue> = match value {
            RouteValue::Simple(target) => vec![target],
            RouteValue::Expanded(route) => {
                if route.subdomains.is_empty() {
                    errors.push(ValidationError::InvalidRoute {
                        key: key.clone(),
                        reason: "subdomains must not be empty".into(),
                    });
                }
                route.subdomains.values().chain(route.target.as_ref()).collect()
            }
        };
        for target in targets {
            match target {
                TargetValue::Port(0) => errors.push(ValidationError::InvalidRoute {
                    key: key.clone(),
                    reason: "target port 0".into(),
                }),
                TargetValue::Text(text) if text.trim() == "redirect:" || text.is_empty() => {
                    errors.push(ValidationError::InvalidRoute {
                        key: key.clone(),
                        reason: "empty target".into(),
                    })
                }
                _ => {}
            }
        }
    }

    // Credentials themselves are checked when the auth table is built, so a
    // bad entry only disables that entry.
    for key in config.auth.keys() {
        check_route_key(config, key, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_listener(context: &str, spec: &ListenerSpec, errors: &mut Vec<ValidationError>) {
    match spec {
        ListenerSpec::Port(0) => errors.push(ValidationError::ZeroPort {
            context: context.to_string(),
        }),
        ListenerSpec::Detailed(options) if options.port == 0 => errors.push(ValidationError::ZeroPort {
            context: context.to_string(),
        }),
        ListenerSpec::List(specs) => specs.iter().for_each(|s| check_listener(context, s, errors)),
        _ => {}
    }
}

fn check_interfaces(context: &str, interfaces: &[String], errors: &mut Vec<ValidationError>) {
    for interface in interfaces {
        let bare = interface.trim_start_matches('[').trim_end_matches(']');
        if interface != "*" && bare.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::InvalidInterface {
                context: context.to_string(),
                interface: interface.clone(),
            });
        }
    }
}

fn check_route_key(config: &FriendlyConfig, key: &str, errors: &mut Vec<ValidationError>) {
    match RouteKey::parse(key) {
        Ok(parsed) => {
            if let Some(group) = parsed.group {
                if !config.groups.contains_key(&group) {
                    errors.push(ValidationError::UnknownGroup {
                        key: key.to_string(),
                        group,
                    });
                }
            }
            if parsed.port == Some(0) {
                errors.push(ValidationError::ZeroPort {
                    context: format!("route {:?}", key),
                });
            }
        }
        Err(e) => errors.push(ValidationError::InvalidRoute {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AuthConfig, AuthOptions, GroupConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&FriendlyConfig::default()).is_ok());
    }

    #[test]
    fn test_auth_credentials_are_not_checked_here() {
        let mut config = FriendlyConfig::default();
        config.auth.insert(
            "a.com".into(),
            AuthConfig::Options(AuthOptions {
                realm: Some("Staff".into()),
                ..Default::default()
            }),
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = FriendlyConfig {
            http: Some(ListenerSpec::List(vec![ListenerSpec::Port(80), ListenerSpec::Port(0)])),
            interfaces: vec!["127.0.0.1".into(), "localhost".into(), "*".into()],
            ..Default::default()
        };
        config.groups.insert(
            "local".into(),
            GroupConfig {
                interfaces: vec!["::1".into()],
                ..Default::default()
            },
        );
        config
            .routes
            .insert("local | a.com".into(), RouteValue::Simple(TargetValue::Port(1)));
        config
            .routes
            .insert("remote | b.com".into(), RouteValue::Simple(TargetValue::Port(2)));
        config
            .routes
            .insert("c.com".into(), RouteValue::Simple(TargetValue::Text("redirect: ".into())));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "{:?}", errors);
        assert!(errors.contains(&ValidationError::ZeroPort {
            context: "http".into()
        }));
        assert!(errors.contains(&ValidationError::InvalidInterface {
            context: "interfaces".into(),
            interface: "localhost".into()
        }));
        assert!(errors.contains(&ValidationError::UnknownGroup {
            key: "remote | b.com".into(),
            group: "remote".into()
        }));
    }
}
