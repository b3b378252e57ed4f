//! Bounded, persisted map from folder path to listing
//!
//! Least-recently-touched entries are evicted first; a touch is any `get`,
//! `get_data` or `set`. Entries older than the configured max age behave as
//! absent so the next read goes back to the server unconditionally. Every
//! mutation rewrites the whole map to durable storage; a quota failure evicts
//! the older half and retries once, after which the store keeps working in
//! memory only.

use crate::config::CacheConfig;
use crate::error::StorageError;
use crate::storage::{DurableStore, LISTINGS_KEY};
use crate::types::{CacheEntry, Listing, StoreStats};
use chrono::{DateTime, TimeDelta, Utc};
use hashlink::LinkedHashMap;
use image_browsing_protocol::DirectoryEntry;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

pub struct EntryStore {
    inner: Mutex<StoreInner>,
    storage: Arc<dyn DurableStore>,
    capacity: usize,
    max_age: TimeDelta,
}

struct StoreInner {
    /// Front = least recently touched
    entries: LinkedHashMap<String, CacheEntry>,
    persistence_enabled: bool,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Durable form of one entry
#[derive(Debug, Deserialize)]
struct PersistedEntry {
    #[serde(default)]
    listing: Vec<DirectoryEntry>,
    #[serde(default)]
    validator: Option<String>,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Serialize)]
struct PersistedEntryRef<'a> {
    listing: &'a [DirectoryEntry],
    validator: Option<&'a str>,
    timestamp: i64,
}

impl EntryStore {
    /// Create a store and restore whatever durable state is still usable
    pub fn new(config: &CacheConfig, storage: Arc<dyn DurableStore>) -> Self {
        let store = Self {
            inner: Mutex::new(StoreInner {
                entries: LinkedHashMap::new(),
                persistence_enabled: true,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            storage,
            capacity: config.capacity.max(1),
            max_age: TimeDelta::from_std(config.max_age).unwrap_or(TimeDelta::MAX),
        };
        store.restore();
        store
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.stored_at > self.max_age
    }

    fn restore(&self) {
        let raw = match self.storage.load(LISTINGS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted listings");
                return;
            }
        };

        let persisted: LinkedHashMap<String, PersistedEntry> = match serde_json::from_str(&raw) {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable persisted listings");
                return;
            }
        };

        let now = Utc::now();
        let mut inner = self.lock();
        for (path, saved) in persisted {
            let Some(stored_at) = DateTime::from_timestamp_millis(saved.timestamp) else {
                continue;
            };
            let entry = CacheEntry {
                path: path.clone(),
                listing: Arc::new(saved.listing),
                validator: saved.validator.filter(|v| !v.is_empty()),
                stored_at,
            };
            if !self.is_expired(&entry, now) {
                inner.entries.insert(path, entry);
            }
        }
        while inner.entries.len() > self.capacity {
            inner.entries.pop_front();
        }
        debug!(entries = inner.entries.len(), "Restored persisted listings");
    }

    /// Look up a fresh entry, touching it
    pub fn get(&self, path: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(path) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };

        if expired {
            debug!(path, "Cache entry expired");
            inner.entries.remove(path);
            inner.misses += 1;
            return None;
        }

        inner.hits += 1;
        inner.entries.to_back(path).map(|entry| entry.clone())
    }

    /// Listing of a fresh entry, touching it. Never performs I/O.
    pub fn get_data(&self, path: &str) -> Option<Listing> {
        self.get(path).map(|entry| entry.listing)
    }

    /// Look up a fresh entry without touching it or counting a hit
    pub fn peek(&self, path: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        let inner = self.lock();
        inner
            .entries
            .get(path)
            .filter(|entry| !self.is_expired(entry, now))
            .cloned()
    }

    pub fn is_fresh(&self, path: &str) -> bool {
        self.peek(path).is_some()
    }

    /// Replace the entry for `path`. `validator: None` marks it unconfirmed.
    pub fn set(&self, path: &str, listing: Listing, validator: Option<String>) {
        let entry = CacheEntry {
            path: path.to_string(),
            listing,
            validator: validator.filter(|v| !v.is_empty()),
            stored_at: Utc::now(),
        };

        let mut inner = self.lock();
        inner.entries.remove(path);
        inner.entries.insert(path.to_string(), entry);
        while inner.entries.len() > self.capacity {
            if let Some((evicted, _)) = inner.entries.pop_front() {
                debug!(path = %evicted, "Evicted least recently used listing");
                inner.evictions += 1;
            }
        }
        self.persist(&mut inner);
    }

    /// Drop the entry for exactly `path`
    pub fn invalidate(&self, path: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.entries.remove(path).is_some();
        if removed {
            self.persist(&mut inner);
        }
        removed
    }

    /// Drop every entry whose path starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|path, _| !path.starts_with(prefix));
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(prefix, removed, "Invalidated cached subtree");
            self.persist(&mut inner);
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        self.persist(&mut inner);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        StoreStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            persistence_enabled: inner.persistence_enabled,
        }
    }

    fn persist(&self, inner: &mut StoreInner) {
        if !inner.persistence_enabled {
            return;
        }

        match self.save(inner) {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                let evict = inner.entries.len().div_ceil(2);
                warn!(error = %e, evict, "Listing storage full, evicting oldest half");
                for _ in 0..evict {
                    if inner.entries.pop_front().is_some() {
                        inner.evictions += 1;
                    }
                }
                if let Err(e) = self.save(inner) {
                    warn!(error = %e, "Listing storage still failing, continuing in memory only");
                    inner.persistence_enabled = false;
                }
            }
            Err(e) => warn!(error = %e, "Failed to persist listings"),
        }
    }

    fn save(&self, inner: &StoreInner) -> Result<(), StorageError> {
        let now = Utc::now();
        let snapshot: LinkedHashMap<&str, PersistedEntryRef<'_>> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !self.is_expired(entry, now))
            .map(|(path, entry)| {
                (
                    path.as_str(),
                    PersistedEntryRef {
                        listing: entry.listing.as_slice(),
                        validator: entry.validator.as_deref(),
                        timestamp: entry.stored_at.timestamp_millis(),
                    },
                )
            })
            .collect();
        let raw = serde_json::to_string(&snapshot)?;
        self.storage.save(LISTINGS_KEY, &raw)
    }
}
