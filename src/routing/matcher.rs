//! Route key pattern compilation.
//!
//! # Responsibilities
//! - Decide whether a host or path token is a literal, a glob or an anchored regex
//! - Translate globs into anchored regexes with capture groups
//! - Turn a regex match into a structured [`Captures`] value
//!
//! # Design Decisions
//! - Patterns are compiled once at table construction, never per request
//! - Anchored regex bodies (`^...`) are compiled verbatim, globs are escaped
//! - Literal tokens produce no pattern at all (exact map lookup instead)

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// The character a bare `*` may not cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Host labels, separated by `.`.
    Host,
    /// Path segments, separated by `/`.
    Path,
}

impl Boundary {
    fn wildcard(self) -> &'static str {
        match self {
            Boundary::Host => "([^.]+)",
            Boundary::Path => "([^/]+)",
        }
    }
}

/// A token that failed to compile into a regex.
#[derive(Debug, Error)]
#[error("invalid pattern {token:?}: {source}")]
pub struct PatternError {
    pub token: String,
    #[source]
    pub source: regex::Error,
}

/// Compile a route key token.
///
/// Returns `Ok(None)` for plain literals, which are matched by exact
/// comparison instead.
pub fn compile(token: &str, boundary: Boundary) -> Result<Option<Regex>, PatternError> {
    let source = if let Some(body) = token.strip_prefix('^') {
        let body = match body.strip_suffix('$') {
            Some(stripped) if !stripped.ends_with('\\') => stripped,
            _ => body,
        };
        format!("^(?:{})$", body)
    } else if token.contains(['*', '?']) {
        glob_source(token, boundary)
    } else {
        return Ok(None);
    };

    Regex::new(&source).map(Some).map_err(|source| PatternError {
        token: token.to_string(),
        source,
    })
}

/// Build the anchored regex source for a glob token.
fn glob_source(token: &str, boundary: Boundary) -> String {
    let mut out = String::from("^");

    match boundary {
        Boundary::Host => {
            if token == "*" {
                return "^(?P<host>.*)$".to_string();
            }
            let mut body = token;
            if let Some(rest) = body.strip_prefix("*?.") {
                out.push_str(r"(?:(.+)\.)?");
                body = rest;
            } else if let Some(rest) = body.strip_prefix("*.") {
                out.push_str(r"(?:(.+)\.)");
                body = rest;
            }
            push_glob_body(&mut out, body, boundary);
        }
        Boundary::Path => match token.strip_suffix("/*") {
            Some(body) => {
                push_glob_body(&mut out, body, boundary);
                out.push_str("(?:/(?P<rest>.*|)|)");
            }
            None => push_glob_body(&mut out, token, boundary),
        },
    }

    out.push('$');
    out
}

fn push_glob_body(out: &mut String, body: &str, boundary: Boundary) {
    let mut rest = body;
    while let Some(ch) = rest.chars().next() {
        if boundary == Boundary::Host {
            // optional trailing label, e.g. `example.*?`
            if let Some(after) = rest.strip_prefix(".*?") {
                out.push_str(r"(?:\.([^.]+))?");
                rest = after;
                continue;
            }
        }
        if ch == '*' {
            out.push_str(boundary.wildcard());
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
        }
        rest = &rest[ch.len_utf8()..];
    }
}

/// Groups captured while matching a host or path pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    /// The full matched text.
    pub full: String,
    /// Positional groups, starting at group 1. Unmatched groups are `None`.
    pub groups: Vec<Option<String>>,
    /// Named groups that participated in the match.
    pub named: HashMap<String, String>,
}

impl Captures {
    /// Match `text` against `regex`, collecting every group.
    pub fn capture(regex: &Regex, text: &str) -> Option<Self> {
        let caps = regex.captures(text)?;
        let mut named = HashMap::new();
        for name in regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                named.insert(name.to_string(), m.as_str().to_string());
            }
        }
        let groups = caps
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();

        Some(Self {
            full: caps
                .get(0)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            groups,
            named,
        })
    }

    /// A named group, if it matched.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    /// A positional group (1-based), if it matched.
    pub fn get(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.groups.get(i))
            .and_then(|g| g.as_deref())
    }
}
