//! Listing models for the database, schema and table screens.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::navigation::{NavigationLevel, SelectionPath};

/// One selectable name in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    /// Secondary text, e.g. the estimated row count of a table
    pub detail: Option<String>,
}

impl ListEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), detail: None }
    }

    pub fn with_detail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { name: name.into(), detail: Some(detail.into()) }
    }
}

/// A PostgreSQL table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Schema name containing this table.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Estimated row count from pg_class.reltuples, never negative.
    pub estimated_rows: i64,
}

impl From<TableInfo> for ListEntry {
    fn from(table: TableInfo) -> Self {
        ListEntry::with_detail(table.name, format!("~{}", table.estimated_rows))
    }
}

#[derive(Debug, Clone)]
struct CachedListing {
    entries: Vec<ListEntry>,
    loaded_at: Instant,
}

/// Listings keyed by level and the selection path prefix that produced them.
///
/// Entries expire after the TTL; the whole cache is dropped on reconnect.
#[derive(Debug)]
pub struct ListingCache {
    entries: HashMap<(NavigationLevel, SelectionPath), CachedListing>,
    ttl: Duration,
}

impl Default for ListingCache {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}

impl ListingCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entries: HashMap::new(), ttl }
    }

    /// Fresh entries for the key, if any.
    pub fn get(&self, level: NavigationLevel, path: &SelectionPath) -> Option<&[ListEntry]> {
        self.entries
            .get(&(level, path.clone()))
            .filter(|cached| cached.loaded_at.elapsed() < self.ttl)
            .map(|cached| cached.entries.as_slice())
    }

    pub fn insert(&mut self, level: NavigationLevel, path: SelectionPath, entries: Vec<ListEntry>) {
        self.entries.insert((level, path), CachedListing { entries, loaded_at: Instant::now() });
    }

    /// Drop the entry for the key and everything cached beneath it.
    pub fn invalidate(&mut self, path: &SelectionPath) {
        let depth = path.len();
        self.entries.retain(|(_, key), _| {
            !(key.len() >= depth && key.segments()[..depth] == path.segments()[..])
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
