//! Route table storage
//!
//! A [`RouteTable`] is built once by the loader and never mutated afterwards,
//! so any number of connection tasks may read it without synchronization.
//! [`RouteTableHandle`] holds the current generation and replaces it as a
//! whole when the table is reloaded.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Immutable mapping from route key to destination URL.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, Url>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the destination for a route key.
    ///
    /// Keys are matched exactly and case-sensitively.
    pub fn lookup(&self, key: &str) -> Option<&Url> {
        self.routes.get(key)
    }

    /// Number of routes in the table
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Insert a route, returning the destination it replaced.
    ///
    /// Only the loader calls this, before the table is shared.
    pub(crate) fn insert(&mut self, key: String, destination: Url) -> Option<Url> {
        self.routes.insert(key, destination)
    }
}

impl FromIterator<(String, Url)> for RouteTable {
    fn from_iter<I: IntoIterator<Item = (String, Url)>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

/// Shared handle to the currently installed route table.
///
/// Readers get a snapshot of one complete generation; [`store`](Self::store)
/// swaps in a new generation atomically.
#[derive(Debug, Clone)]
pub struct RouteTableHandle {
    current: Arc<ArcSwap<RouteTable>>,
}

impl RouteTableHandle {
    pub fn new(table: RouteTable) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// Snapshot of the current generation.
    pub fn load(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Replace the current generation.
    pub fn store(&self, table: RouteTable) {
        self.current.store(Arc::new(table));
    }
}

impl From<RouteTable> for RouteTableHandle {
    fn from(table: RouteTable) -> Self {
        Self::new(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let table: RouteTable = [("api".to_string(), url("http://10.0.0.5:9000/v1"))]
            .into_iter()
            .collect();

        assert!(table.lookup("api").is_some());
        assert!(table.lookup("API").is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn handle_swaps_whole_generation() {
        let handle = RouteTableHandle::new(RouteTable::new());
        let before = handle.load();

        let mut next = RouteTable::new();
        next.insert("api".to_string(), url("http://backend/"));
        handle.store(next);

        // old snapshot is unaffected
        assert!(before.is_empty());
        assert_eq!(handle.load().keys(), vec!["api"]);
    }
}
