//! Search cache and query deduplicator (C1).
//!
//! Thread-safe LRU+TTL cache keyed by normalized query, with a fuzzy
//! (character-bigram similarity) fallback lookup, plus a pre-flight
//! deduplicator that collapses near-duplicate queries out of a research
//! plan before any searches are dispatched.

use chrono::Utc;
use ra_domain::search::{CacheEntry, SearchHit};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Normalize a query for cache-key purposes: trim, lowercase, collapse
/// internal whitespace runs to a single space.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, Copy, Default)]
struct StatsInner {
    hits: u64,
    similar_hits: u64,
    misses: u64,
}

/// Point-in-time snapshot of cache effectiveness.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp())
}

/// LRU+TTL cache of search results, keyed by [`normalize_query`].
pub struct SearchCache {
    entries: parking_lot::RwLock<HashMap<String, CacheEntry>>,
    /// LRU order: front = least recently used, back = most recently used.
    order: parking_lot::RwLock<VecDeque<String>>,
    max_size: usize,
    ttl_secs: i64,
    similarity_threshold: f64,
    stats: parking_lot::RwLock<StatsInner>,
    clock: Clock,
}

impl SearchCache {
    pub fn new(max_size: usize, ttl_secs: u64, similarity_threshold: f64) -> Self {
        Self {
            entries: Default::default(),
            order: Default::default(),
            max_size,
            ttl_secs: ttl_secs as i64,
            similarity_threshold,
            stats: Default::default(),
            clock: system_clock(),
        }
    }

    /// Construct a cache with an injected clock, for TTL-expiry tests.
    pub fn with_clock(max_size: usize, ttl_secs: u64, similarity_threshold: f64, clock: Clock) -> Self {
        Self {
            entries: Default::default(),
            order: Default::default(),
            max_size,
            ttl_secs: ttl_secs as i64,
            similarity_threshold,
            stats: Default::default(),
            clock,
        }
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        now - entry.insertion_time > self.ttl_secs
    }

    fn touch_order(&self, key: &str) {
        let mut order = self.order.write();
        order.retain(|k| k != key);
        order.push_back(key.to_string());
    }

    fn evict_lru_if_needed(&self) {
        if self.entries.read().len() < self.max_size {
            return;
        }
        let lru_key = self.order.write().pop_front();
        if let Some(key) = lru_key {
            self.entries.write().remove(&key);
        }
    }

    /// (I5) Drop every expired entry. Called opportunistically on access;
    /// callers needing a full eager sweep may invoke it directly.
    pub fn evict_expired(&self) {
        let now = self.now();
        let expired: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| self.is_expired(e, now))
            .map(|(k, _)| k.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        let mut entries = self.entries.write();
        let mut order = self.order.write();
        for key in &expired {
            entries.remove(key);
            order.retain(|k| k != key);
        }
    }

    /// Exact-match lookup on the normalized query. Updates LRU recency and
    /// `hit_count` on a hit; expired entries are invisible and dropped.
    pub fn get(&self, query: &str) -> Option<Vec<SearchHit>> {
        let key = normalize_query(query);
        let now = self.now();
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !self.is_expired(entry, now) => {}
                Some(_) => {
                    drop(entries);
                    self.entries.write().remove(&key);
                    self.order.write().retain(|k| k != &key);
                    self.stats.write().misses += 1;
                    return None;
                }
                None => {
                    drop(entries);
                    self.stats.write().misses += 1;
                    return None;
                }
            }
        }
        let results = {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&key).expect("checked above");
            entry.hit_count += 1;
            entry.results.clone()
        };
        self.touch_order(&key);
        self.stats.write().hits += 1;
        Some(results)
    }

    /// Fuzzy lookup: linear scan over unexpired entries, returning the
    /// first whose normalized-query similarity to `query` meets the
    /// configured threshold (default 0.85). Returns the matched query
    /// alongside its results so callers can mark the bag `cached=true`
    /// against the right key.
    pub fn get_fuzzy(&self, query: &str) -> Option<(String, Vec<SearchHit>)> {
        let key = normalize_query(query);
        let now = self.now();
        let candidate = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|(_, e)| !self.is_expired(e, now))
                .find(|(k, _)| strsim::sorensen_dice(&key, k) >= self.similarity_threshold)
                .map(|(k, e)| (k.clone(), e.results.clone()))
        };
        match candidate {
            Some((matched_key, results)) => {
                {
                    let mut entries = self.entries.write();
                    if let Some(entry) = entries.get_mut(&matched_key) {
                        entry.hit_count += 1;
                    }
                }
                self.touch_order(&matched_key);
                self.stats.write().similar_hits += 1;
                Some((matched_key, results))
            }
            None => {
                self.stats.write().misses += 1;
                None
            }
        }
    }

    /// Insert or refresh a cache entry. Evicts the least-recently-used
    /// entry first if the cache is already at `max_size`.
    pub fn set(&self, query: &str, results: Vec<SearchHit>) {
        let key = normalize_query(query);
        self.evict_expired();
        if !self.entries.read().contains_key(&key) {
            self.evict_lru_if_needed();
        }
        let now = self.now();
        self.entries.write().insert(
            key.clone(),
            CacheEntry {
                query: key.clone(),
                results,
                insertion_time: now,
                hit_count: 0,
            },
        );
        self.touch_order(&key);
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.entries.read().len();
        let s = *self.stats.read();
        let total = s.hits + s.similar_hits + s.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (s.hits + s.similar_hits) as f64 / total as f64
        };
        CacheStats {
            size,
            max_size: self.max_size,
            hits: s.hits,
            similar_hits: s.similar_hits,
            misses: s.misses,
            hit_rate,
        }
    }
}

/// Pre-flight plan deduplicator: collapses queries whose similarity to an
/// already-kept query meets `threshold`, preserving first-occurrence order.
pub struct QueryDeduplicator {
    pub threshold: f64,
}

impl QueryDeduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// (P4) `unique.len() + duplicates.len() == plan.len()`, and no two
    /// entries of `unique` have similarity ≥ `threshold`.
    pub fn dedupe(&self, plan: &[String]) -> (Vec<String>, Vec<String>) {
        let mut unique: Vec<String> = Vec::new();
        let mut unique_normalized: Vec<String> = Vec::new();
        let mut duplicates: Vec<String> = Vec::new();

        for query in plan {
            let normalized = normalize_query(query);
            let is_duplicate = unique_normalized
                .iter()
                .any(|kept| strsim::sorensen_dice(&normalized, kept) >= self.threshold);
            if is_duplicate {
                duplicates.push(query.clone());
            } else {
                unique.push(query.clone());
                unique_normalized.push(normalized);
            }
        }
        (unique, duplicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            url: url.into(),
            score: 0.9,
            ..Default::default()
        }
    }

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_query("  AI   Chips "), "ai chips");
    }

    #[test]
    fn exact_hit_increments_hits_and_returns_results() {
        let cache = SearchCache::new(10, 3600, 0.85);
        cache.set("AI chips", vec![hit("https://a.com")]);
        let got = cache.get("ai chips").unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_on_unknown_query() {
        let cache = SearchCache::new(10, 3600, 0.85);
        assert!(cache.get("nothing here").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn fuzzy_match_serves_similar_query() {
        let cache = SearchCache::new(10, 3600, 0.85);
        cache.set("AI chips 2024", vec![hit("https://a.com")]);
        let (matched, results) = cache.get_fuzzy("ai  chips 2024").unwrap();
        assert_eq!(matched, "ai chips 2024");
        assert_eq!(results.len(), 1);
        assert_eq!(cache.stats().similar_hits, 1);
    }

    #[test]
    fn ttl_expiry_makes_entry_invisible() {
        let clock = Arc::new(AtomicI64::new(0));
        let clock_read = clock.clone();
        let cache = SearchCache::with_clock(10, 60, 0.85, Arc::new(move || clock_read.load(Ordering::SeqCst)));
        cache.set("ai chips", vec![hit("https://a.com")]);
        assert!(cache.get("ai chips").is_some());
        clock.store(61, Ordering::SeqCst);
        assert!(cache.get("ai chips").is_none());
    }

    #[test]
    fn lru_eviction_drops_least_recently_used() {
        let cache = SearchCache::new(2, 3600, 0.85);
        cache.set("q1", vec![hit("https://1.com")]);
        cache.set("q2", vec![hit("https://2.com")]);
        cache.get("q1").unwrap(); // q1 now most-recently-used; q2 is LRU
        cache.set("q3", vec![hit("https://3.com")]);
        assert!(cache.get("q2").is_none());
        assert!(cache.get("q1").is_some());
        assert!(cache.get("q3").is_some());
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let dedup = QueryDeduplicator::new(0.85);
        let plan = vec![
            "AI chips".to_string(),
            "AI chips 2024".to_string(),
            "ai  chips".to_string(),
        ];
        let (unique, duplicates) = dedup.dedupe(&plan);
        assert_eq!(unique.len() + duplicates.len(), plan.len());
        assert_eq!(unique[0], "AI chips");
        assert!(duplicates.contains(&"ai  chips".to_string()));
    }

    #[test]
    fn dedup_keeps_genuinely_distinct_queries() {
        let dedup = QueryDeduplicator::new(0.85);
        let plan = vec!["lithium battery density".to_string(), "sodium battery cost".to_string()];
        let (unique, duplicates) = dedup.dedupe(&plan);
        assert_eq!(unique.len(), 2);
        assert!(duplicates.is_empty());
    }
}
