use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search cache + dedup (C1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Policy constants for the search cache and the pre-flight query
/// deduplicator. Exposed as configuration per the open question in
/// spec.md §9: "the dedup similarity threshold, cache TTL, tier
/// boundaries, and confidence threshold are policy constants in the
/// source — expose them as configuration."
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in.
    #[serde(default = "d_max_size")]
    pub max_size: usize,
    /// Entry time-to-live, in seconds.
    #[serde(default = "d_ttl_secs")]
    pub ttl_secs: u64,
    /// Similarity threshold (0.0-1.0) for fuzzy cache lookups and for the
    /// pre-flight plan deduplicator.
    #[serde(default = "d_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: d_max_size(),
            ttl_secs: d_ttl_secs(),
            similarity_threshold: d_similarity_threshold(),
        }
    }
}

fn d_max_size() -> usize {
    256
}
fn d_ttl_secs() -> u64 {
    3600
}
fn d_similarity_threshold() -> f64 {
    0.85
}
