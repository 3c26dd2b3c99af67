//! Caching layer for docvqa-runtime.
//!
//! Relevance verdicts depend only on the question and the provision text,
//! so they are memoised across requests to save classifier calls when the
//! same provisions come back on a retry or for a repeated question.

use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use docvqa_core::RelevanceVerdict;

/// Cache key for a relevance verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RelevanceKey(u64);

impl RelevanceKey {
    pub fn new(question: &str, content: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        question.hash(&mut hasher);
        content.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// Relevance verdict cache using moka.
pub struct RelevanceCache {
    cache: Cache<RelevanceKey, RelevanceVerdict>,
}

impl RelevanceCache {
    /// Create a new cache with the given capacity and time-to-live.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &RelevanceKey) -> Option<RelevanceVerdict> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: RelevanceKey, verdict: RelevanceVerdict) {
        self.cache.insert(key, verdict).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for RelevanceCache {
    fn default() -> Self {
        Self::new(10_000, Duration::from_secs(3600))
    }
}

impl std::fmt::Debug for RelevanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelevanceCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
