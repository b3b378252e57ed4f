//! Core cache types

use chrono::{DateTime, Utc};
use image_browsing_protocol::DirectoryEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Immutable folder listing. Writers replace the whole `Arc`, never the contents.
pub type Listing = Arc<Vec<DirectoryEntry>>;

/// One cached folder listing
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: String,
    pub listing: Listing,
    /// Freshness token from the server; `None` marks an unconfirmed optimistic entry
    pub validator: Option<String>,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_confirmed(&self) -> bool {
        self.validator.is_some()
    }

    /// Names of the sub-folders in this listing, joined onto the entry path
    pub fn child_folders(&self) -> Vec<String> {
        folder_paths(&self.path, &self.listing)
    }
}

/// Paths of the folder entries of `listing`, in listing order
pub fn folder_paths(path: &str, listing: &[DirectoryEntry]) -> Vec<String> {
    listing
        .iter()
        .filter(|entry| entry.is_folder())
        .map(|entry| crate::path::join(path, &entry.name))
        .collect()
}

/// Statistics about the entry store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub persistence_enabled: bool,
}

/// One remembered folder visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRecord {
    pub path: String,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub last_visited_at: i64,
    #[serde(default)]
    pub visit_count: u32,
}

/// Result of a conditional read
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub listing: Listing,
    /// `true` when the server confirmed the cached listing was still current
    pub served_from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_browsing_protocol::EntryKind;

    fn entry(name: &str, kind: EntryKind) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            kind,
            size: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_child_folders() {
        let cache_entry = CacheEntry {
            path: "/output".to_string(),
            listing: Arc::new(vec![
                entry("cats", EntryKind::Folder),
                entry("x.png", EntryKind::Image),
                entry("dogs", EntryKind::Folder),
            ]),
            validator: Some("\"v1\"".to_string()),
            stored_at: Utc::now(),
        };

        assert!(cache_entry.is_confirmed());
        assert_eq!(
            cache_entry.child_folders(),
            vec!["/output/cats".to_string(), "/output/dogs".to_string()]
        );
    }

    #[test]
    fn test_access_record_tolerates_missing_fields() {
        let record: AccessRecord = serde_json::from_str(r#"{"path": "/output/a"}"#).unwrap();
        assert_eq!(record.visit_count, 0);
        assert_eq!(record.last_visited_at, 0);
    }

    #[test]
    fn test_store_stats_default() {
        let stats = StoreStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!(!stats.persistence_enabled);
    }
}
