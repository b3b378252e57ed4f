//! Folder navigation with stale-while-revalidate reads
//!
//! [`Navigator`] is the service object the browsing surface talks to. It is
//! built once and cloned wherever it is needed; every clone shares the same
//! entry store, history and prefetch queue.
//!
//! Each navigation takes a new epoch. A result is only shown, and only
//! reported as a failure, while its epoch is still the current one, so a fast
//! sequence of navigations can never render out of order.

mod mutations;

use crate::cancellation::{CancellationRegistry, NAVIGATION_SLOT};
use crate::conditional::ConditionalTransport;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::events::{ListingSource, Navigation, NavigationEvent, Phase};
use crate::optimistic::OptimisticLayer;
use crate::path;
use crate::predictor::AccessPredictor;
use crate::prefetch::{PrefetchScheduler, PrefetchStats};
use crate::storage::DurableStore;
use crate::store::EntryStore;
use crate::transport::Transport;
use crate::types::{folder_paths, AccessRecord, Listing, StoreStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Navigator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<EntryStore>,
    conditional: Arc<ConditionalTransport>,
    cancellation: CancellationRegistry,
    predictor: AccessPredictor,
    optimistic: OptimisticLayer,
    events: broadcast::Sender<NavigationEvent>,
    epoch: AtomicU64,
    current: Mutex<Option<String>>,
    phase: watch::Sender<Phase>,
}

impl Navigator {
    pub fn new(
        config: CacheConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn DurableStore>,
    ) -> Self {
        let store = Arc::new(EntryStore::new(&config, Arc::clone(&storage)));
        let conditional = Arc::new(ConditionalTransport::new(transport, Arc::clone(&store)));
        let scheduler =
            PrefetchScheduler::new(Arc::clone(&conditional), config.prefetch_concurrency);
        let predictor = AccessPredictor::new(&config, scheduler, storage);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                optimistic: OptimisticLayer::new(Arc::clone(&store)),
                store,
                conditional,
                cancellation: CancellationRegistry::new(),
                predictor,
                events,
                epoch: AtomicU64::new(0),
                current: Mutex::new(None),
                phase: watch::Sender::new(Phase::Idle),
            }),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<String>> {
        self.inner.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to navigation events. Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: NavigationEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    /// Watch phase transitions
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase.subscribe()
    }

    /// Wait until no read is outstanding for the current navigation
    pub async fn settled(&self) {
        let mut phase = self.inner.phase.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = phase
            .wait_for(|phase| matches!(phase, Phase::Idle | Phase::Serving))
            .await;
    }

    fn set_phase(&self, epoch: u64, phase: Phase) {
        if self.is_current(epoch) {
            self.inner.phase.send_replace(phase);
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    pub fn current_path(&self) -> Option<String> {
        self.current().clone()
    }

    fn is_current_path(&self, path: &str) -> bool {
        self.current().as_deref() == Some(path)
    }

    /// Open `path`, serving a cached listing immediately when one is fresh.
    ///
    /// Returns [`Navigation::Superseded`] when a later navigation took over
    /// before this one finished; that is never an error.
    pub async fn goto(&self, path: &str) -> Result<Navigation> {
        let path = path::normalize(path)?;
        self.navigate(path, false).await
    }

    /// Open `path` with a guaranteed network round trip
    pub async fn force_refresh(&self, path: &str) -> Result<Navigation> {
        let path = path::normalize(path)?;
        self.inner.store.invalidate(&path);
        self.navigate(path, true).await
    }

    /// Open the parent of the current folder. `None` at the root or before
    /// the first navigation.
    pub async fn go_up(&self) -> Result<Option<Navigation>> {
        let Some(current) = self.current_path() else {
            return Ok(None);
        };
        let Some(parent) = path::parent(&current).map(str::to_string) else {
            return Ok(None);
        };

        let navigation = self.navigate(parent.clone(), false).await?;
        let parent_siblings = self.siblings_of(&parent);
        self.inner.predictor.on_navigate_up(&parent, &parent_siblings);
        Ok(Some(navigation))
    }

    async fn navigate(&self, path: String, force_fresh: bool) -> Result<Navigation> {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.current() = Some(path.clone());
        if !force_fresh {
            self.inner.predictor.record_visit(&path);
        }

        if !force_fresh {
            if let Some(listing) = self.inner.store.get_data(&path) {
                return Ok(self.serve_cached(epoch, path, listing));
            }
        }

        self.set_phase(epoch, Phase::Loading);
        self.emit(NavigationEvent::Loading {
            epoch,
            path: path.clone(),
        });

        let conditional = Arc::clone(&self.inner.conditional);
        let read_path = path.clone();
        let result = self
            .inner
            .cancellation
            .run(NAVIGATION_SLOT, |_token| async move {
                conditional.read(&read_path, force_fresh).await
            })
            .await;

        if !self.is_current(epoch) {
            debug!(path = %path, epoch, "Discarding superseded navigation");
            return Ok(Navigation::Superseded { epoch });
        }

        match result {
            Ok(outcome) => {
                self.set_phase(epoch, Phase::Idle);
                self.emit(NavigationEvent::ListingUpdated {
                    epoch,
                    path: path.clone(),
                    listing: Arc::clone(&outcome.listing),
                    source: ListingSource::Network,
                });
                self.nominate_around(&path, &outcome.listing);
                Ok(Navigation::Rendered {
                    epoch,
                    listing: outcome.listing,
                    source: ListingSource::Network,
                })
            }
            Err(e) if e.is_cancelled() => {
                debug!(path = %path, epoch, "Navigation cancelled");
                Ok(Navigation::Superseded { epoch })
            }
            Err(e) => {
                warn!(path = %path, epoch, error = %e, "Navigation failed");
                self.set_phase(epoch, Phase::Idle);
                self.emit(NavigationEvent::Failed {
                    epoch,
                    path,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn serve_cached(&self, epoch: u64, path: String, listing: Listing) -> Navigation {
        debug!(path = %path, epoch, "Serving cached listing");
        // A foreground read still running for an older navigation is moot now
        self.inner.cancellation.cancel(NAVIGATION_SLOT);

        self.set_phase(epoch, Phase::Serving);
        self.emit(NavigationEvent::ListingUpdated {
            epoch,
            path: path.clone(),
            listing: Arc::clone(&listing),
            source: ListingSource::Cache,
        });
        self.nominate_around(&path, &listing);
        self.spawn_revalidation(epoch, path);

        Navigation::Rendered {
            epoch,
            listing,
            source: ListingSource::Cache,
        }
    }

    fn spawn_revalidation(&self, epoch: u64, path: String) {
        self.set_phase(epoch, Phase::Revalidating);
        let navigator = self.clone();
        tokio::spawn(async move {
            let result = navigator.inner.conditional.read(&path, false).await;
            if !navigator.is_current(epoch) {
                debug!(path = %path, epoch, "Ignoring revalidation for superseded navigation");
                return;
            }

            match result {
                Ok(outcome) if outcome.served_from_cache => {
                    debug!(path = %path, "Cached listing still current");
                }
                Ok(outcome) => {
                    debug!(path = %path, "Revalidation found a newer listing");
                    navigator.emit(NavigationEvent::ListingUpdated {
                        epoch,
                        path,
                        listing: outcome.listing,
                        source: ListingSource::Revalidated,
                    });
                }
                Err(e) => {
                    debug!(path = %path, error = %e, "Background revalidation failed");
                }
            }
            // Idle only once subscribers have seen the outcome
            navigator.set_phase(epoch, Phase::Idle);
        });
    }

    /// Folder paths next to `path`, known only if its parent is cached
    fn siblings_of(&self, path: &str) -> Vec<String> {
        let Some(parent) = path::parent(path) else {
            return Vec::new();
        };
        self.inner
            .store
            .peek(parent)
            .map(|entry| {
                folder_paths(parent, &entry.listing)
                    .into_iter()
                    .filter(|sibling| sibling != path)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn nominate_around(&self, path: &str, listing: &Listing) {
        let children = folder_paths(path, listing);
        let siblings = self.siblings_of(path);
        self.inner.predictor.on_folder_open(path, &siblings, &children);
    }

    /// Tell the predictor the pointer has rested on `path` for `hovered`
    pub fn hover(&self, path: &str, hovered: Duration) -> Result<bool> {
        let path = path::normalize(path)?;
        Ok(self.inner.predictor.on_hover(&path, hovered))
    }

    /// Fetch every uncached path in `paths`, batching when there is more than one
    pub async fn preload(&self, paths: &[&str]) -> Result<usize> {
        let normalized = paths
            .iter()
            .map(|p| path::normalize(p))
            .collect::<Result<Vec<_>>>()?;
        self.inner.conditional.warm(&normalized).await
    }

    /// Cached listing for `path`, without any network traffic
    pub fn cached(&self, path: &str) -> Result<Option<Listing>> {
        let path = path::normalize(path)?;
        Ok(self.inner.store.peek(&path).map(|entry| entry.listing))
    }

    /// Drop every cached listing and pending prefetch
    pub fn clear_cache(&self) {
        self.inner.store.clear();
        self.inner.predictor.reset_nominations();
        let dropped = self.inner.predictor.scheduler().clear_pending();
        debug!(dropped, "Cleared listing cache");
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.store.stats()
    }

    pub fn prefetch_stats(&self) -> PrefetchStats {
        self.inner.predictor.scheduler().stats()
    }

    /// Wait for the prefetch queue to drain
    pub async fn prefetch_idle(&self) {
        self.inner.predictor.scheduler().drained().await
    }

    /// Visit history, most recent first
    pub fn history(&self) -> Vec<AccessRecord> {
        self.inner.predictor.records()
    }

    /// Visited folders ordered by visit count
    pub fn frequent_folders(&self, limit: usize) -> Vec<String> {
        self.inner.predictor.frequent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CacheError, TransportError};
    use crate::storage::MemoryStore;
    use crate::testing::{file, folder, names, ScriptedTransport};

    fn setup() -> (Arc<ScriptedTransport>, Navigator) {
        let server = ScriptedTransport::new();
        let navigator = Navigator::new(
            CacheConfig::default(),
            server.clone(),
            Arc::new(MemoryStore::new()),
        );
        (server, navigator)
    }

    fn drain(rx: &mut broadcast::Receiver<NavigationEvent>) -> Vec<NavigationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn updates(events: &[NavigationEvent]) -> Vec<(String, ListingSource)> {
        events
            .iter()
            .filter_map(|event| match event {
                NavigationEvent::ListingUpdated { path, source, .. } => {
                    Some((path.clone(), *source))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_visit_is_served_from_cache() {
        let (server, navigator) = setup();
        server.set_files("/output/a", &["x.png"]);

        let first = navigator.goto("/output/a").await.unwrap();
        assert!(matches!(
            first,
            Navigation::Rendered {
                source: ListingSource::Network,
                ..
            }
        ));
        assert_eq!(names(first.listing().unwrap()), vec!["x.png"]);
        assert_eq!(server.read_count(), 1);

        let second = navigator.goto("/output/a").await.unwrap();
        assert!(matches!(
            second,
            Navigation::Rendered {
                source: ListingSource::Cache,
                ..
            }
        ));
        assert_eq!(names(second.listing().unwrap()), vec!["x.png"]);
        // Served without waiting on the network
        assert_eq!(server.read_count(), 1);
        assert_eq!(navigator.phase(), Phase::Revalidating);

        tokio::time::sleep(Duration::from_millis(1)).await;
        let reads = server.reads();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[1].validator, server.validator_for("/output/a"));
        assert_eq!(navigator.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_expired_listing_is_read_from_network() {
        let server = ScriptedTransport::new();
        let config = CacheConfig {
            max_age: Duration::from_millis(5),
            ..CacheConfig::default()
        };
        let navigator = Navigator::new(config, server.clone(), Arc::new(MemoryStore::new()));
        server.set_files("/output", &["a.png"]);

        navigator.goto("/output").await.unwrap();
        // Entry age is wall-clock based
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = navigator.goto("/output").await.unwrap();
        assert!(matches!(
            second,
            Navigation::Rendered {
                source: ListingSource::Network,
                ..
            }
        ));
        assert_eq!(server.reads_for("/output"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_waits_for_revalidation() {
        let (server, navigator) = setup();
        server.set_files("/output", &["a.png"]);
        navigator.goto("/output").await.unwrap();
        server.set_delay("/output", Duration::from_millis(40));

        navigator.goto("/output").await.unwrap();
        assert_eq!(navigator.phase(), Phase::Revalidating);

        navigator.settled().await;
        assert_eq!(navigator.phase(), Phase::Idle);
        assert_eq!(server.read_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_navigation_is_never_rendered() {
        let (server, navigator) = setup();
        server.set_files("/x", &["x.png"]);
        server.set_files("/y", &["y.png"]);
        server.set_delay("/x", Duration::from_millis(100));
        server.set_delay("/y", Duration::from_millis(10));
        let mut rx = navigator.subscribe();

        let (x, y) = tokio::join!(navigator.goto("/x"), navigator.goto("/y"));

        assert!(x.unwrap().is_superseded());
        let y = y.unwrap();
        assert_eq!(names(y.listing().unwrap()), vec!["y.png"]);
        assert_eq!(y.epoch(), navigator.current_epoch());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let events = drain(&mut rx);
        assert_eq!(
            updates(&events),
            vec![("/y".to_string(), ListingSource::Network)]
        );
        assert_eq!(navigator.current_path().as_deref(), Some("/y"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_revalidation_of_old_folder_is_ignored() {
        let (server, navigator) = setup();
        server.set_files("/x", &["old.png"]);
        server.set_files("/y", &["y.png"]);
        navigator.goto("/x").await.unwrap();

        server.set_files("/x", &["new.png"]);
        server.set_delay("/x", Duration::from_millis(100));
        let mut rx = navigator.subscribe();

        navigator.goto("/x").await.unwrap();
        navigator.goto("/y").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let events = drain(&mut rx);
        assert_eq!(
            updates(&events),
            vec![
                ("/x".to_string(), ListingSource::Cache),
                ("/y".to_string(), ListingSource::Network),
            ]
        );
        // The revalidation still refreshed the store for next time
        let cached = navigator.cached("/x").unwrap().unwrap();
        assert_eq!(names(&cached), vec!["new.png"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_reports_newer_listing() {
        let (server, navigator) = setup();
        server.set_files("/output", &["a.png"]);
        navigator.goto("/output").await.unwrap();

        server.set_files("/output", &["a.png", "b.png"]);
        let mut rx = navigator.subscribe();
        navigator.goto("/output").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let events = drain(&mut rx);
        assert_eq!(
            updates(&events),
            vec![
                ("/output".to_string(), ListingSource::Cache),
                ("/output".to_string(), ListingSource::Revalidated),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_once() {
        let (server, navigator) = setup();
        server.fail_reads("/broken");
        let mut rx = navigator.subscribe();

        let err = navigator.goto("/broken").await.unwrap_err();

        assert_eq!(err, CacheError::Transport(TransportError::Status(500)));
        let events = drain(&mut rx);
        let failures = events
            .iter()
            .filter(|event| matches!(event, NavigationEvent::Failed { .. }))
            .count();
        assert_eq!(failures, 1);
        assert!(matches!(events[0], NavigationEvent::Loading { .. }));
        assert_eq!(navigator.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_of_superseded_navigation_is_silent() {
        let (server, navigator) = setup();
        server.fail_reads("/broken");
        server.set_delay("/broken", Duration::from_millis(50));
        server.set_files("/ok", &[]);
        server.set_delay("/ok", Duration::from_millis(100));
        let mut rx = navigator.subscribe();

        let broken = navigator.goto("/broken");
        let ok = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            navigator.goto("/ok").await
        };
        let (broken, ok) = tokio::join!(broken, ok);

        assert!(broken.unwrap().is_superseded());
        assert!(ok.is_ok());
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|event| matches!(event, NavigationEvent::Failed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_skips_cache_and_validator() {
        let (server, navigator) = setup();
        server.set_files("/output", &["a.png"]);
        navigator.goto("/output").await.unwrap();
        let epoch = navigator.current_epoch();

        let refreshed = navigator.force_refresh("/output").await.unwrap();

        assert_eq!(refreshed.epoch(), epoch + 1);
        assert!(matches!(
            refreshed,
            Navigation::Rendered {
                source: ListingSource::Network,
                ..
            }
        ));
        let reads = server.reads();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[1].validator, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_children_are_prefetched() {
        let (server, navigator) = setup();
        server.set_listing(
            "/output",
            vec![folder("cats"), file("a.png"), folder("dogs")],
        );
        server.set_files("/output/cats", &["c.png"]);
        server.set_files("/output/dogs", &["d.png"]);

        navigator.goto("/output").await.unwrap();
        navigator.prefetch_idle().await;

        assert_eq!(server.reads_for("/output/cats"), 1);
        assert_eq!(server.reads_for("/output/dogs"), 1);

        // Now an instant, cached visit
        let cats = navigator.goto("/output/cats").await.unwrap();
        assert!(matches!(
            cats,
            Navigation::Rendered {
                source: ListingSource::Cache,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_go_up() {
        let (server, navigator) = setup();
        server.set_listing("/", vec![folder("output")]);
        server.set_listing("/output", vec![folder("a")]);
        server.set_files("/output/a", &[]);

        assert!(navigator.go_up().await.unwrap().is_none());

        navigator.goto("/output/a").await.unwrap();
        let up = navigator.go_up().await.unwrap().unwrap();
        assert!(!up.is_superseded());
        assert_eq!(navigator.current_path().as_deref(), Some("/output"));

        navigator.go_up().await.unwrap();
        assert_eq!(navigator.current_path().as_deref(), Some("/"));
        assert!(navigator.go_up().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paths_are_normalized() {
        let (server, navigator) = setup();
        server.set_files("/output/a", &["x.png"]);

        navigator.goto("output//a/").await.unwrap();
        assert!(navigator.cached("/output/a").unwrap().is_some());

        let err = navigator.goto("/output/../etc").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidPath(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hover_and_preload() {
        let (server, navigator) = setup();
        for path in ["/a", "/b", "/c"] {
            server.set_files(path, &[]);
        }

        assert!(navigator.hover("/a", Duration::from_millis(500)).unwrap());
        navigator.prefetch_idle().await;
        assert_eq!(server.reads_for("/a"), 1);

        let fetched = navigator.preload(&["/a", "/b", "/c"]).await.unwrap();
        assert_eq!(fetched, 2);
        assert_eq!(server.batches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_and_history() {
        let (server, navigator) = setup();
        server.set_files("/output/cats", &[]);
        server.set_files("/output/dogs", &[]);
        for _ in 0..3 {
            navigator.goto("/output/cats").await.unwrap();
        }
        navigator.goto("/output/dogs").await.unwrap();

        assert_eq!(
            navigator.frequent_folders(2),
            vec!["/output/cats".to_string(), "/output/dogs".to_string()]
        );
        assert_eq!(navigator.history()[0].path, "/output/dogs");

        navigator.clear_cache();
        assert_eq!(navigator.stats().entries, 0);
        assert!(navigator.cached("/output/cats").unwrap().is_none());
        // History survives a cache clear
        assert_eq!(navigator.history().len(), 2);
    }
}
