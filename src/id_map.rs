//! Source id → server key translation table.
//!
//! An [`IdMap`] is filled incrementally as batches come back from the
//! destination and is read by every later stage that has to turn a source
//! reference into a server key. Entries are write-once.

use std::collections::HashMap;

use crate::error::{MigrationError, Result};

/// Alias under which the import root's key is stored, so stages that need a
/// fallback container (orphaned memberships) can look it up like any other
/// collection.
pub const ROOT_ALIAS: &str = "root";

/// Write-once mapping from source ids to server-assigned keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMap {
    entries: HashMap<String, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `source_id → server_key`.
    ///
    /// Re-inserting the same pair is a no-op. Mapping an already known id to
    /// a different key fails with [`MigrationError::IdConflict`].
    pub fn insert(&mut self, source_id: impl Into<String>, server_key: impl Into<String>) -> Result<()> {
        let source_id = source_id.into();
        let server_key = server_key.into();
        match self.entries.get(&source_id) {
            Some(existing) if *existing == server_key => Ok(()),
            Some(existing) => Err(MigrationError::IdConflict {
                source_id,
                existing: existing.clone(),
                attempted: server_key,
            }),
            None => {
                self.entries.insert(source_id, server_key);
                Ok(())
            }
        }
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    /// Key of the import root, if the hierarchy has been replicated.
    pub fn root(&self) -> Option<&str> {
        self.get(ROOT_ALIAS)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut map = IdMap::new();
        map.insert("uuid-1", "ABCD1234").unwrap();
        assert_eq!(map.get("uuid-1"), Some("ABCD1234"));
        assert!(map.contains("uuid-1"));
        assert_eq!(map.get("uuid-2"), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_reinsert_same_value_is_noop() {
        let mut map = IdMap::new();
        map.insert("uuid-1", "ABCD1234").unwrap();
        map.insert("uuid-1", "ABCD1234").unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_conflicting_insert_rejected() {
        let mut map = IdMap::new();
        map.insert("uuid-1", "ABCD1234").unwrap();
        let err = map.insert("uuid-1", "ZZZZ9999").unwrap_err();
        assert!(matches!(err, MigrationError::IdConflict { .. }));
        assert_eq!(map.get("uuid-1"), Some("ABCD1234"));
    }

    #[test]
    fn test_root_alias() {
        let mut map = IdMap::new();
        assert_eq!(map.root(), None);
        map.insert(ROOT_ALIAS, "ROOTKEY1").unwrap();
        assert_eq!(map.root(), Some("ROOTKEY1"));
    }
}
