//! Validator-aware, deduplicated listing reads
//!
//! A read attaches the stored validator so the server can answer "not
//! modified" instead of resending the listing. Concurrent reads of the same
//! path with the same freshness requirement share one request.

use crate::dedupe::Deduplicator;
use crate::error::{CacheError, Result, TransportError};
use crate::store::EntryStore;
use crate::transport::{FetchResponse, Transport};
use crate::types::ReadOutcome;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct ConditionalTransport {
    transport: Arc<dyn Transport>,
    store: Arc<EntryStore>,
    inflight: Deduplicator<(String, bool), ReadOutcome, CacheError>,
}

impl ConditionalTransport {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<EntryStore>) -> Self {
        Self {
            transport,
            store,
            inflight: Deduplicator::new(),
        }
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Read the listing for a normalized `path`.
    ///
    /// With `force_fresh` the stored validator is not sent, so the server
    /// always returns a full listing. Dropping every waiter of a read aborts
    /// the underlying request.
    pub async fn read(&self, path: &str, force_fresh: bool) -> Result<ReadOutcome> {
        let transport = Arc::clone(&self.transport);
        let store = Arc::clone(&self.store);
        let owned = path.to_string();

        self.inflight
            .run((path.to_string(), force_fresh), move || {
                fetch(transport, store, owned, force_fresh)
            })
            .await
    }

    /// Whether a read of `path` is outstanding
    pub fn is_reading(&self, path: &str) -> bool {
        self.inflight.is_in_flight(&(path.to_string(), false))
            || self.inflight.is_in_flight(&(path.to_string(), true))
    }

    /// Make sure every path in `paths` has a fresh entry, returning how many
    /// listings were fetched. More than one uncached path goes out as a
    /// single batch request.
    pub async fn warm(&self, paths: &[String]) -> Result<usize> {
        let mut seen = HashSet::new();
        let missing: Vec<String> = paths
            .iter()
            .filter(|path| seen.insert(path.as_str()) && !self.store.is_fresh(path))
            .cloned()
            .collect();

        match missing.as_slice() {
            [] => Ok(0),
            [single] => {
                self.read(single, false).await?;
                Ok(1)
            }
            _ => {
                let mut results = self.transport.fetch_batch(&missing).await?;
                let mut stored = 0;
                for path in &missing {
                    match results.remove(path) {
                        Some(item) => {
                            self.store.set(path, Arc::new(item.listing), item.validator);
                            stored += 1;
                        }
                        None => debug!(path = %path, "Batch response omitted path"),
                    }
                }
                debug!(requested = missing.len(), stored, "Warmed listings");
                Ok(stored)
            }
        }
    }
}

async fn fetch(
    transport: Arc<dyn Transport>,
    store: Arc<EntryStore>,
    path: String,
    force_fresh: bool,
) -> Result<ReadOutcome> {
    let validator = if force_fresh {
        None
    } else {
        store.peek(&path).and_then(|entry| entry.validator)
    };

    match transport.fetch_listing(&path, validator.as_deref()).await? {
        FetchResponse::Modified {
            listing,
            validator,
        } => Ok(store_listing(&store, &path, listing, validator)),
        FetchResponse::NotModified => {
            let Some(sent) = validator else {
                return Err(not_modified_without_validator(&path));
            };

            // The entry may have been replaced while the request was out,
            // possibly by an unconfirmed placeholder
            let current = store
                .peek(&path)
                .filter(|entry| entry.validator.as_deref() == Some(sent.as_str()));
            match current {
                Some(entry) => {
                    debug!(path = %path, "Listing not modified");
                    // Re-stamp the confirmed entry; the listing itself is kept as is
                    store.set(&path, Arc::clone(&entry.listing), entry.validator);
                    Ok(ReadOutcome {
                        listing: entry.listing,
                        served_from_cache: true,
                    })
                }
                None => {
                    debug!(path = %path, "Cached entry gone, re-reading unconditionally");
                    match transport.fetch_listing(&path, None).await? {
                        FetchResponse::Modified {
                            listing,
                            validator,
                        } => Ok(store_listing(&store, &path, listing, validator)),
                        FetchResponse::NotModified => Err(not_modified_without_validator(&path)),
                    }
                }
            }
        }
    }
}

fn store_listing(
    store: &EntryStore,
    path: &str,
    listing: Vec<image_browsing_protocol::DirectoryEntry>,
    validator: Option<String>,
) -> ReadOutcome {
    let listing = Arc::new(listing);
    store.set(path, Arc::clone(&listing), validator);
    ReadOutcome {
        listing,
        served_from_cache: false,
    }
}

fn not_modified_without_validator(path: &str) -> CacheError {
    TransportError::Protocol(format!("not modified for unconditional read of {path}")).into()
}
