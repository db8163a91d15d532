//! Connection-table query boundary.
//!
//! Implementations are treated as pure queries over kernel state: bounded
//! local calls, no network. A failure is recoverable and scoped to the one
//! family being queried; the collector reports zero entries for that
//! family for the current scrape and tries again on the next.

use std::collections::{HashMap, HashSet};
use std::io;

use crate::types::{Protocol, SockEntry};

/// Source of live connection entries for one protocol family.
pub trait ConnectionSource: Send + Sync {
    fn entries(&self, family: Protocol) -> io::Result<Vec<SockEntry>>;
}

/// In-memory source with predefined tables, for tests.
///
/// Families can also be marked as failing to exercise the collector's
/// per-family error isolation.
#[derive(Debug, Default)]
pub struct StaticSource {
    tables: HashMap<Protocol, Vec<SockEntry>>,
    failing: HashSet<Protocol>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entries returned for a family and return self for chaining.
    pub fn with_entries(mut self, family: Protocol, entries: Vec<SockEntry>) -> Self {
        self.tables.insert(family, entries);
        self
    }

    /// Make queries for a family fail.
    pub fn with_failure(mut self, family: Protocol) -> Self {
        self.failing.insert(family);
        self
    }
}

impl ConnectionSource for StaticSource {
    fn entries(&self, family: Protocol) -> io::Result<Vec<SockEntry>> {
        if self.failing.contains(&family) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("query for {} marked as failing", family),
            ));
        }
        Ok(self.tables.get(&family).cloned().unwrap_or_default())
    }
}
