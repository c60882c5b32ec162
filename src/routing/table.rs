//! Per-socket dispatch table.
//!
//! # Responsibilities
//! - Store compiled route entries for one listening socket
//! - Resolve `(host, path)` to a target with captured groups
//! - Keep entries that failed to build for diagnostics
//!
//! # Design Decisions
//! - Immutable after construction (shared across requests without locks)
//! - Literal hosts are looked up first; patterns are scanned in declaration order
//! - Literal entries live in slots; `host` and `host:port` map to the same slot index
//! - No match is a normal outcome, not an error

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use crate::routing::entry::{self, EntryError, EntryTransform, Identity, RouteEntry};
use crate::routing::matcher::Captures;

/// Port assumed for the `host:port` key spelling when none is given.
pub const DEFAULT_PORT: u16 = 80;

/// A route that could not be built.
pub struct FailedEntry {
    pub error: EntryError,
    pub raw: Box<dyn fmt::Debug + Send + Sync>,
}

impl fmt::Debug for FailedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailedEntry")
            .field("error", &self.error.to_string())
            .field("raw", &self.raw)
            .finish()
    }
}

/// Result of a successful resolution.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    pub target: &'a T,
    /// Groups captured by the host pattern, for pattern entries.
    pub host: Option<Captures>,
    /// Groups captured by the path pattern, if the entry has one.
    pub path: Option<Captures>,
}

/// Compiled routing table for one socket.
#[derive(Debug)]
pub struct DispatchTable<T> {
    port: u16,
    slots: Vec<Vec<RouteEntry<T>>>,
    literal: HashMap<String, usize>,
    patterns: Vec<RouteEntry<T>>,
    failed: IndexMap<String, FailedEntry>,
}

impl<T> Default for DispatchTable<T> {
    fn default() -> Self {
        Self::empty(DEFAULT_PORT)
    }
}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> DispatchTable<T> {
    /// Build a table that stores route values unchanged.
    pub fn new(routes: &IndexMap<String, T>, port: Option<u16>) -> Self {
        Self::build(routes, port, &Identity)
    }
}

impl<T> DispatchTable<T> {
    /// An empty table for `port`.
    pub fn empty(port: u16) -> Self {
        Self {
            port,
            slots: Vec::new(),
            literal: HashMap::new(),
            patterns: Vec::new(),
            failed: IndexMap::new(),
        }
    }

    /// Build a table, running every value through `transform`.
    ///
    /// Routes are processed in declaration order. Entries that fail to build
    /// are recorded in [`failed_entries`](Self::failed_entries) and skipped.
    pub fn build<R, X>(routes: &IndexMap<String, R>, port: Option<u16>, transform: &X) -> Self
    where
        R: Clone + fmt::Debug + Send + Sync + 'static,
        X: EntryTransform<R, Target = T>,
    {
        let mut table = Self::empty(port.unwrap_or(DEFAULT_PORT));

        for (raw_key, raw) in routes {
            match entry::build(raw_key, raw, transform) {
                Ok(built) => table.insert(built.host, built.entry),
                Err(failed) => {
                    tracing::warn!(
                        route = %raw_key,
                        key = %failed.key,
                        error = %failed.error,
                        "Route entry rejected"
                    );
                    table.failed.insert(
                        failed.key,
                        FailedEntry {
                            error: failed.error,
                            raw: Box::new(raw.clone()),
                        },
                    );
                }
            }
        }

        tracing::debug!(
            port = table.port,
            literal_hosts = table.slots.len(),
            patterns = table.patterns.len(),
            failed = table.failed.len(),
            "Dispatch table built"
        );
        table
    }

    /// Add a built entry: pattern hosts go to the ordered pattern list,
    /// literal hosts to their shared slot. The `host:port` spelling always
    /// names the slot written last.
    pub(crate) fn insert(&mut self, host: String, entry: RouteEntry<T>) {
        if entry.host_regex.is_some() {
            self.patterns.push(entry);
            return;
        }

        let with_port = format!("{}:{}", host, self.port);
        match self.literal.get(&host) {
            Some(&slot) => {
                self.slots[slot].push(entry);
                self.literal.insert(with_port, slot);
            }
            None => {
                let slot = self.slots.len();
                self.slots.push(vec![entry]);
                self.literal.insert(host, slot);
                self.literal.insert(with_port, slot);
            }
        }
    }

    /// Append an entry to the slot registered under `key`, through either
    /// key spelling. Returns `false` if no such slot exists.
    pub(crate) fn append(&mut self, key: &str, entry: RouteEntry<T>) -> bool {
        match self.literal.get(key) {
            Some(&slot) => {
                self.slots[slot].push(entry);
                true
            }
            None => false,
        }
    }

    /// The port used for `host:port` keys.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Slot index behind a literal key.
    pub fn slot_of(&self, key: &str) -> Option<usize> {
        self.literal.get(key).copied()
    }

    /// Entries registered under a literal key, in insertion order.
    pub fn literal(&self, key: &str) -> Option<&[RouteEntry<T>]> {
        self.slot_of(key).map(|slot| self.slots[slot].as_slice())
    }

    /// Pattern entries in declaration order.
    pub fn patterns(&self) -> &[RouteEntry<T>] {
        &self.patterns
    }

    /// Entries that failed to build, keyed by host token.
    pub fn failed_entries(&self) -> &IndexMap<String, FailedEntry> {
        &self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.patterns.is_empty()
    }

    /// Resolve a request's host and raw pathname.
    pub fn resolve<'a>(&'a self, host: &str, pathname: &str) -> Option<RouteMatch<'a, T>> {
        let pathname = entry::decode_path(pathname);

        if let Some(entries) = self.literal(host) {
            for entry in entries {
                if let Some(path) = entry.match_path(&pathname) {
                    tracing::trace!(host, path = %pathname, "Literal route matched");
                    return Some(RouteMatch {
                        target: &entry.target,
                        host: None,
                        path,
                    });
                }
            }
        }

        for entry in &self.patterns {
            let Some(regex) = &entry.host_regex else {
                continue;
            };
            let Some(host_caps) = Captures::capture(regex, host) else {
                continue;
            };
            if let Some(path) = entry.match_path(&pathname) {
                tracing::trace!(host, pattern = %regex, path = %pathname, "Pattern route matched");
                return Some(RouteMatch {
                    target: &entry.target,
                    host: Some(host_caps),
                    path,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::entry::{BoxError, TransformFn};

    fn routes<T: Clone>(pairs: &[(&str, T)]) -> IndexMap<String, T> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_empty_table_resolves_nothing() {
        let table: DispatchTable<u16> = DispatchTable::default();
        assert!(table.is_empty());
        assert!(table.resolve("example.com", "/").is_none());
        assert!(table.resolve("", "").is_none());
    }

    #[test]
    fn test_literal_precedence_over_pattern() {
        let table = DispatchTable::new(
            &routes(&[("*.example.com", 1u16), ("api.example.com", 2), ("*", 3)]),
            None,
        );
        assert_eq!(*table.resolve("api.example.com", "/").unwrap().target, 2);
        assert_eq!(*table.resolve("www.example.com", "/").unwrap().target, 1);
        assert_eq!(*table.resolve("other.org", "/").unwrap().target, 3);
    }

    #[test]
    fn test_glob_host_capture() {
        let table = DispatchTable::new(&routes(&[("*.example.com", 1u16)]), None);
        let m = table.resolve("api.example.com", "/").unwrap();
        assert_eq!(m.host.as_ref().unwrap().get(1), Some("api"));
        assert!(table.resolve("example.com", "/").is_none());

        let table = DispatchTable::new(&routes(&[("*", 9u16)]), None);
        let m = table.resolve("anything.local", "/x").unwrap();
        assert_eq!(m.host.unwrap().name("host"), Some("anything.local"));
    }

    #[test]
    fn test_path_fallback_ordering() {
        let table = DispatchTable::new(&routes(&[("h/a", 1u16), ("h", 2)]), None);
        assert_eq!(*table.resolve("h", "/a").unwrap().target, 1);
        assert_eq!(*table.resolve("h", "/b").unwrap().target, 2);

        let table = DispatchTable::new(&routes(&[("h", 2u16), ("h/a", 1)]), None);
        // the catch-all comes first, so it wins
        assert_eq!(*table.resolve("h", "/a").unwrap().target, 2);
    }

    #[test]
    fn test_shared_slot_for_both_spellings() {
        let mut table = DispatchTable::new(&routes(&[("h/a", 1u16), ("h/b", 2)]), Some(8080));
        assert_eq!(table.slot_of("h"), table.slot_of("h:8080"));
        assert_eq!(table.literal("h").unwrap().len(), 2);

        assert!(table.append("h:8080", RouteEntry::new(3)));
        let via_bare: Vec<u16> = table.literal("h").unwrap().iter().map(|e| e.target).collect();
        assert_eq!(via_bare, vec![1, 2, 3]);

        assert!(table.append("h", RouteEntry::new(4)));
        assert_eq!(table.literal("h:8080").unwrap().len(), 4);
        assert!(!table.append("missing", RouteEntry::new(5)));
    }

    #[test]
    fn test_port_spelling_follows_latest_slot() {
        let table = DispatchTable::new(&routes(&[("a:80", 1u16), ("a", 2)]), None);
        assert_eq!(table.slot_of("a"), table.slot_of("a:80"));
        assert_eq!(*table.resolve("a:80", "/").unwrap().target, 2);
        assert_eq!(*table.resolve("a", "/").unwrap().target, 2);
    }

    #[test]
    fn test_host_with_port_resolves() {
        let table = DispatchTable::new(&routes(&[("example.com", 1u16)]), Some(8080));
        assert_eq!(*table.resolve("example.com:8080", "/").unwrap().target, 1);
        assert!(table.resolve("example.com:9090", "/").is_none());

        let table = DispatchTable::new(&routes(&[("example.com", 1u16)]), None);
        assert_eq!(*table.resolve("example.com:80", "/").unwrap().target, 1);
    }

    #[test]
    fn test_pattern_first_match_wins() {
        let table = DispatchTable::new(
            &routes(&[("*.example.com/api", 1u16), ("*.example.com", 2), ("api.*.com", 3)]),
            None,
        );
        assert_eq!(*table.resolve("a.example.com", "/api").unwrap().target, 1);
        assert_eq!(*table.resolve("a.example.com", "/web").unwrap().target, 2);
        // host matches `*.example.com` and path-less entry accepts everything
        assert_eq!(*table.resolve("api.example.com", "/x").unwrap().target, 2);
    }

    #[test]
    fn test_path_pattern_captures_rest() {
        let table = DispatchTable::new(&routes(&[("jira.atlashost.eu/*", 1u16)]), None);
        let m = table.resolve("jira.atlashost.eu", "/test").unwrap();
        assert_eq!(m.path.unwrap().name("rest"), Some("test"));

        let m = table.resolve("jira.atlashost.eu", "").unwrap();
        assert_eq!(m.path.unwrap().name("rest"), None);
    }

    #[test]
    fn test_request_path_is_decoded() {
        let table = DispatchTable::new(&routes(&[("h/a b", 1u16)]), None);
        assert_eq!(*table.resolve("h", "/a%20b").unwrap().target, 1);
        // malformed encoding falls back to the raw path
        let table = DispatchTable::new(&routes(&[("h/%FF", 1u16)]), None);
        assert!(table.resolve("h", "/%FF").is_some());
    }

    #[test]
    fn test_failed_entry_isolation() {
        let transform = TransformFn(|key: &str, raw: &i64| -> Result<(String, u16), BoxError> {
            u16::try_from(*raw)
                .map(|port| (key.to_string(), port))
                .map_err(|e| e.into())
        });
        let table = DispatchTable::build(
            &routes(&[("good.com", 3000i64), ("bad.com", -1), ("*.ok.com", 4000)]),
            None,
            &transform,
        );

        assert_eq!(*table.resolve("good.com", "/").unwrap().target, 3000);
        assert_eq!(*table.resolve("x.ok.com", "/").unwrap().target, 4000);
        assert!(table.resolve("bad.com", "/").is_none());

        let failed = table.failed_entries().get("bad.com").unwrap();
        assert!(matches!(failed.error, EntryError::Transform(_)));
        assert_eq!(format!("{:?}", failed.raw), "-1");
    }
}
