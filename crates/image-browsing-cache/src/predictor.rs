//! Visit history and prefetch nomination
//!
//! Every folder visit updates a bounded, persisted history. Opening a folder
//! nominates four tiers of candidates to the prefetch scheduler:
//!
//! | priority | tier                                   |
//! |----------|----------------------------------------|
//! | 0        | children of the opened folder          |
//! | 1        | sibling folders                        |
//! | 2        | most frequently visited folders        |
//! | 3        | most recently visited folders          |
//!
//! A path nominated once is not nominated again until the nominated set
//! expires or is reset after a broad invalidation.

use crate::config::CacheConfig;
use crate::error::StorageError;
use crate::prefetch::{PrefetchScheduler, PRIORITY_URGENT};
use crate::storage::{DurableStore, HISTORY_KEY};
use crate::types::AccessRecord;
use chrono::Utc;
use hashlink::LinkedHashMap;
use moka::sync::Cache;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

const PRIORITY_SIBLINGS: u8 = 1;
const PRIORITY_FREQUENT: u8 = 2;
const PRIORITY_RECENT: u8 = 3;

pub struct AccessPredictor {
    scheduler: PrefetchScheduler,
    storage: Arc<dyn DurableStore>,
    /// Front = least recently visited
    history: Mutex<LinkedHashMap<String, AccessRecord>>,
    nominated: Cache<String, ()>,
    history_capacity: usize,
    hover_threshold: Duration,
    children_limit: usize,
    siblings_limit: usize,
    frequent_limit: usize,
    recent_limit: usize,
}

impl AccessPredictor {
    pub fn new(
        config: &CacheConfig,
        scheduler: PrefetchScheduler,
        storage: Arc<dyn DurableStore>,
    ) -> Self {
        let nominated = Cache::builder()
            .max_capacity(config.nomination_capacity)
            .time_to_live(config.nomination_ttl)
            .build();

        let predictor = Self {
            scheduler,
            storage,
            history: Mutex::new(LinkedHashMap::new()),
            nominated,
            history_capacity: config.history_capacity.max(1),
            hover_threshold: config.hover_threshold,
            children_limit: config.children_limit,
            siblings_limit: config.siblings_limit,
            frequent_limit: config.frequent_limit,
            recent_limit: config.recent_limit,
        };
        predictor.restore();
        predictor
    }

    fn history(&self) -> MutexGuard<'_, LinkedHashMap<String, AccessRecord>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn restore(&self) {
        let raw = match self.storage.load(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to load visit history");
                return;
            }
        };

        let mut records: Vec<AccessRecord> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable visit history");
                return;
            }
        };
        // Stable, so equal timestamps keep their stored order
        records.sort_by_key(|record| record.last_visited_at);

        let mut history = self.history();
        for record in records {
            history.remove(&record.path);
            history.insert(record.path.clone(), record);
        }
        while history.len() > self.history_capacity {
            history.pop_front();
        }
        debug!(records = history.len(), "Restored visit history");
    }

    fn persist(&self, history: &LinkedHashMap<String, AccessRecord>) {
        let records: Vec<&AccessRecord> = history.values().collect();
        let result = serde_json::to_string(&records)
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.save(HISTORY_KEY, &raw));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist visit history");
        }
    }

    /// Count a visit to `path` and make it the most recent one
    pub fn record_visit(&self, path: &str) {
        let mut history = self.history();
        let visit_count = history.remove(path).map_or(0, |r| r.visit_count) + 1;
        history.insert(
            path.to_string(),
            AccessRecord {
                path: path.to_string(),
                last_visited_at: Utc::now().timestamp_millis(),
                visit_count,
            },
        );
        while history.len() > self.history_capacity {
            history.pop_front();
        }
        self.persist(&history);
    }

    /// Visited paths ordered by visit count, most recently visited first on ties
    pub fn frequent(&self, limit: usize) -> Vec<String> {
        let history = self.history();
        let mut records: Vec<&AccessRecord> = history.values().rev().collect();
        records.sort_by(|a, b| b.visit_count.cmp(&a.visit_count));
        records
            .into_iter()
            .take(limit)
            .map(|record| record.path.clone())
            .collect()
    }

    /// Visited paths, most recent first
    pub fn recent(&self, limit: usize) -> Vec<String> {
        self.history()
            .keys()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// History records, most recent first
    pub fn records(&self) -> Vec<AccessRecord> {
        self.history().values().rev().cloned().collect()
    }

    /// Nominate prefetch candidates for a freshly opened folder.
    /// Returns how many paths were nominated.
    pub fn on_folder_open(&self, path: &str, siblings: &[String], children: &[String]) -> usize {
        // Over-fetch the history tiers so the opened folder itself never
        // crowds out a candidate
        let frequent = self.frequent(self.frequent_limit + 1);
        let recent = self.recent(self.recent_limit + 1);

        let tiers: [(u8, &[String], usize); 4] = [
            (PRIORITY_URGENT, children, self.children_limit),
            (PRIORITY_SIBLINGS, siblings, self.siblings_limit),
            (PRIORITY_FREQUENT, frequent.as_slice(), self.frequent_limit),
            (PRIORITY_RECENT, recent.as_slice(), self.recent_limit),
        ];

        let mut total = 0;
        for (priority, candidates, limit) in tiers {
            let picked: Vec<String> = candidates
                .iter()
                .filter(|candidate| candidate.as_str() != path)
                .take(limit)
                .filter(|candidate| !self.nominated.contains_key(candidate.as_str()))
                .cloned()
                .collect();
            total += self.nominate(picked, priority);
        }
        debug!(path, nominated = total, "Nominated prefetch candidates");
        total
    }

    /// A folder hovered for at least the threshold is about to be opened
    pub fn on_hover(&self, path: &str, hovered: Duration) -> bool {
        if hovered < self.hover_threshold {
            return false;
        }
        debug!(path, hovered_ms = hovered.as_millis() as u64, "Hover prefetch");
        self.nominate(vec![path.to_string()], PRIORITY_URGENT);
        true
    }

    /// After moving up to `path`, warm the folders next to it
    pub fn on_navigate_up(&self, path: &str, parent_siblings: &[String]) -> usize {
        let picked: Vec<String> = parent_siblings
            .iter()
            .filter(|candidate| candidate.as_str() != path)
            .filter(|candidate| !self.nominated.contains_key(candidate.as_str()))
            .take(self.siblings_limit)
            .cloned()
            .collect();
        self.nominate(picked, PRIORITY_SIBLINGS)
    }

    fn nominate(&self, paths: Vec<String>, priority: u8) -> usize {
        if paths.is_empty() {
            return 0;
        }
        for path in &paths {
            self.nominated.insert(path.clone(), ());
        }
        let count = paths.len();
        self.scheduler.enqueue(paths, priority);
        count
    }

    pub fn is_nominated(&self, path: &str) -> bool {
        self.nominated.contains_key(path)
    }

    /// Forget every nomination so invalidated paths can be prefetched again
    pub fn reset_nominations(&self) {
        let mut reset = 0;
        for (path, ()) in self.nominated.iter() {
            self.nominated.invalidate(path.as_str());
            reset += 1;
        }
        debug!(reset, "Reset prefetch nominations");
    }

    pub fn scheduler(&self) -> &PrefetchScheduler {
        &self.scheduler
    }
}
