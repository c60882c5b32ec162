//! Route entry construction.
//!
//! # Responsibilities
//! - Split a route key into host and path tokens
//! - Run the optional entry transform over the raw value
//! - Compile host and path tokens into patterns where needed
//!
//! # Design Decisions
//! - One bad entry never aborts table construction: failures are returned
//!   to the caller, which parks them for diagnostics
//! - Transforms are a narrow capability injected at construction time

use std::borrow::Cow;

use regex::Regex;
use thiserror::Error;

use crate::routing::matcher::{self, Boundary, Captures, PatternError};

/// Boxed error returned by entry transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a route entry could not be built.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The entry transform rejected the raw value.
    #[error("entry transform failed: {0}")]
    Transform(#[source] BoxError),

    /// The host or path token is not a valid pattern.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Turns a raw configuration value into the target stored in the table.
///
/// Implementations may also rewrite the host key.
pub trait EntryTransform<R> {
    type Target;

    fn transform(&self, key: &str, raw: &R) -> Result<(String, Self::Target), BoxError>;
}

/// Stores raw values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<R: Clone> EntryTransform<R> for Identity {
    type Target = R;

    fn transform(&self, key: &str, raw: &R) -> Result<(String, R), BoxError> {
        Ok((key.to_string(), raw.clone()))
    }
}

/// Adapts a closure into an [`EntryTransform`].
#[derive(Debug, Clone, Copy)]
pub struct TransformFn<F>(pub F);

impl<R, T, F> EntryTransform<R> for TransformFn<F>
where
    F: Fn(&str, &R) -> Result<(String, T), BoxError>,
{
    type Target = T;

    fn transform(&self, key: &str, raw: &R) -> Result<(String, T), BoxError> {
        (self.0)(key, raw)
    }
}

/// A compiled route entry.
#[derive(Debug, Clone)]
pub struct RouteEntry<T> {
    /// Value produced by the entry transform.
    pub target: T,
    /// Decoded path this entry is restricted to, if any.
    pub path: Option<String>,
    /// Compiled path pattern; takes over from `path` when present.
    pub path_regex: Option<Regex>,
    /// Compiled host pattern. Entries without one live in the literal table.
    pub host_regex: Option<Regex>,
}

impl<T> RouteEntry<T> {
    /// An entry matching any path on a literal host.
    pub fn new(target: T) -> Self {
        Self {
            target,
            path: None,
            path_regex: None,
            host_regex: None,
        }
    }

    /// Check the path constraint against an already decoded pathname.
    ///
    /// Returns `None` on mismatch, `Some(None)` when matched without captures.
    pub fn match_path(&self, pathname: &str) -> Option<Option<Captures>> {
        match (&self.path_regex, &self.path) {
            (Some(regex), _) => Captures::capture(regex, pathname).map(Some),
            (None, Some(path)) if path == pathname => Some(None),
            (None, Some(_)) => None,
            (None, None) => Some(None),
        }
    }
}

/// A built entry together with the key it is registered under.
#[derive(Debug)]
pub struct BuiltEntry<T> {
    pub host: String,
    pub entry: RouteEntry<T>,
}

/// A failed build, keyed by the host token of the original route key.
#[derive(Debug)]
pub struct FailedBuild {
    pub key: String,
    pub error: EntryError,
}

/// Split `host[/path]`, keeping each side's own anchor markers.
///
/// `host/^regex` yields the path token `^/regex`.
pub fn split_key(raw_key: &str) -> (&str, Option<String>) {
    let bytes = raw_key.as_bytes();
    let slash = (0..bytes.len()).find(|&i| bytes[i] == b'/' && (i == 0 || bytes[i - 1] != b'\\'));

    match slash {
        Some(i) if i > 0 => {
            let host = &raw_key[..i];
            let rest = &raw_key[i + 1..];
            let path = match rest.strip_prefix('^') {
                Some(anchored) => format!("^/{}", anchored),
                None => format!("/{}", rest),
            };
            (host, Some(path))
        }
        _ => (raw_key, None),
    }
}

/// Percent-decode a path, falling back to the raw value.
pub fn decode_path(path: &str) -> Cow<'_, str> {
    urlencoding::decode(path).unwrap_or(Cow::Borrowed(path))
}

/// Build one route entry from a raw key/value pair.
pub fn build<R, X>(raw_key: &str, raw: &R, transform: &X) -> Result<BuiltEntry<X::Target>, FailedBuild>
where
    X: EntryTransform<R>,
{
    let (host_token, path_token) = split_key(raw_key);
    let path_token = path_token.map(|p| decode_path(&p).into_owned());

    let fail = |error: EntryError| FailedBuild {
        key: host_token.to_string(),
        error,
    };

    let (host, target) = transform
        .transform(host_token, raw)
        .map_err(|e| fail(EntryError::Transform(e)))?;

    let mut entry = RouteEntry::new(target);
    if let Some(path) = path_token {
        entry.path_regex = matcher::compile(&path, Boundary::Path).map_err(|e| fail(e.into()))?;
        entry.path = Some(path);
    }
    entry.host_regex = matcher::compile(&host, Boundary::Host).map_err(|e| fail(e.into()))?;

    Ok(BuiltEntry { host, entry })
}
