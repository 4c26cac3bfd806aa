//! Table cache
//!
//! Memoizes table handles by path so each table is opened (and subscribed)
//! once per connection. Paths asked for before a connection exists are kept
//! as placeholders and resolved after connecting. Cleared on disconnect.

use std::collections::HashMap;
use std::sync::Arc;

use crate::path;
use crate::protocol::{Table, TableClient};

#[derive(Default)]
pub struct TableCache {
    entries: HashMap<String, Option<Arc<dyn Table>>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle, if resolved
    pub fn get(&self, table_path: &str) -> Option<Arc<dyn Table>> {
        self.entries
            .get(path::normalize_table(table_path))
            .cloned()
            .flatten()
    }

    /// Remember a path to resolve once connected
    pub fn reserve(&mut self, table_path: &str) {
        self.entries
            .entry(path::normalize_table(table_path).to_string())
            .or_insert(None);
    }

    /// Resolve a table through `client`
    ///
    /// Returns the handle and whether it was created by this call.
    pub fn resolve(
        &mut self,
        table_path: &str,
        client: &dyn TableClient,
    ) -> Option<(Arc<dyn Table>, bool)> {
        let key = path::normalize_table(table_path);
        if let Some(Some(table)) = self.entries.get(key) {
            return Some((table.clone(), false));
        }

        let table = open_table(client, key)?;
        self.entries.insert(key.to_string(), Some(table.clone()));
        Some((table, true))
    }

    /// Placeholder paths not resolved yet
    pub fn pending(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, table)| table.is_none())
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Drop every handle and placeholder
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of resolved handles
    pub fn len(&self) -> usize {
        self.entries.values().filter(|t| t.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Walk from the top-level table down through sub-tables
fn open_table(client: &dyn TableClient, table_path: &str) -> Option<Arc<dyn Table>> {
    let mut segments = path::segments(table_path);
    let mut table = client.table(segments.next()?);
    for segment in segments {
        table = table.sub_table(segment);
    }
    Some(table)
}
