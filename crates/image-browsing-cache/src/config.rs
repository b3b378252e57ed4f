use std::env;
use std::time::Duration;

/// Tunables for the listing cache, prefetcher and predictor
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached folder listings
    pub capacity: usize,
    /// Entries older than this are treated as absent
    pub max_age: Duration,
    /// Byte budget of the durable store
    pub storage_quota_bytes: usize,
    /// Maximum simultaneous prefetch reads
    pub prefetch_concurrency: usize,
    /// Maximum number of remembered folder visits
    pub history_capacity: usize,
    /// Hover duration after which a folder is prefetched at top priority
    pub hover_threshold: Duration,
    pub children_limit: usize,
    pub siblings_limit: usize,
    pub frequent_limit: usize,
    pub recent_limit: usize,
    pub nomination_capacity: u64,
    pub nomination_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            max_age: Duration::from_secs(10 * 60),
            storage_quota_bytes: 5 * 1024 * 1024, // 5 MiB, a typical local storage budget
            prefetch_concurrency: 6,
            history_capacity: 100,
            hover_threshold: Duration::from_millis(300),
            children_limit: 10,
            siblings_limit: 5,
            frequent_limit: 5,
            recent_limit: 3,
            nomination_capacity: 1_000,
            nomination_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl CacheConfig {
    /// Parse configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let capacity = parse_var("IMAGE_BROWSING_CACHE_CAPACITY").unwrap_or(defaults.capacity);

        let max_age = parse_var("IMAGE_BROWSING_CACHE_MAX_AGE_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_age);

        let storage_quota_bytes =
            parse_var("IMAGE_BROWSING_STORAGE_QUOTA_BYTES").unwrap_or(defaults.storage_quota_bytes);

        let prefetch_concurrency = parse_var("IMAGE_BROWSING_PREFETCH_CONCURRENCY")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.prefetch_concurrency);

        let history_capacity =
            parse_var("IMAGE_BROWSING_HISTORY_CAPACITY").unwrap_or(defaults.history_capacity);

        let hover_threshold = parse_var("IMAGE_BROWSING_HOVER_THRESHOLD_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.hover_threshold);

        Self {
            capacity,
            max_age,
            storage_quota_bytes,
            prefetch_concurrency,
            history_capacity,
            hover_threshold,
            ..defaults
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
