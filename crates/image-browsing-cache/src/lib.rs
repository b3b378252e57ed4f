//! Image Browsing Listing Cache
//!
//! Client-side orchestration of folder listing reads for the image browser:
//! stale-while-revalidate navigation, conditional and deduplicated reads,
//! prioritized background prefetching driven by visit history, and optimistic
//! file operations reconciled with the server.
//!
//! Build one [`Navigator`] at startup and clone it wherever it is needed. The
//! network is reached through the [`Transport`] trait; durable state goes
//! through [`DurableStore`].

mod cancellation;
mod conditional;
mod config;
mod dedupe;
mod error;
mod events;
mod navigator;
mod optimistic;
pub mod path;
mod predictor;
mod prefetch;
mod storage;
mod store;
mod transport;
mod types;

#[cfg(test)]
mod testing;

pub use cancellation::{CancellationRegistry, NAVIGATION_SLOT};
pub use conditional::ConditionalTransport;
pub use config::CacheConfig;
pub use dedupe::Deduplicator;
pub use error::{CacheError, Result, StorageError, TransportError};
pub use events::{ListingSource, Navigation, NavigationEvent, Phase};
pub use navigator::Navigator;
pub use optimistic::{kind_for_name, pending_file, OptimisticLayer};
pub use predictor::AccessPredictor;
pub use prefetch::{PrefetchScheduler, PrefetchStats, PRIORITY_URGENT};
pub use storage::{DurableStore, FileStore, MemoryStore, HISTORY_KEY, LISTINGS_KEY};
pub use store::EntryStore;
pub use transport::{BatchListing, FetchResponse, NewEntry, Transport};
pub use types::{folder_paths, AccessRecord, CacheEntry, Listing, ReadOutcome, StoreStats};
