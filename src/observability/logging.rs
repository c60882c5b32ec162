//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Pick the filter from `RUST_LOG`, then the CLI level, then the default
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Field-based events (`route = ...`, `error = ...`) rather than formatted strings

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a level is given.
pub const DEFAULT_FILTER: &str = "dispatch_proxy=info,tower_http=info";

/// Build the filter directive for an optional level override.
pub fn filter_directive(level: Option<&str>) -> String {
    match level {
        Some(level) => format!("dispatch_proxy={},tower_http={}", level, level),
        None => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global subscriber.
pub fn init(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_directive(level).into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(None), DEFAULT_FILTER);
        assert_eq!(filter_directive(Some("debug")), "dispatch_proxy=debug,tower_http=debug");
    }
}
