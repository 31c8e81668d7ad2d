use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result aggregator (C2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Cap on surviving hits per originating query.
    #[serde(default = "d_max_per_query")]
    pub max_results_per_query: usize,
    /// Content-similarity (title+snippet) dedup threshold among survivors.
    #[serde(default = "d_content_similarity")]
    pub content_similarity_threshold: f64,
    /// Score floor for tier 1.
    #[serde(default = "d_tier1")]
    pub tier_1_threshold: f64,
    /// Score floor for tier 2 (below tier 1, above this is tier 2, below is tier 3).
    #[serde(default = "d_tier2")]
    pub tier_2_threshold: f64,
    /// Default per-tier hit caps and total char cap for `to_context`.
    #[serde(default = "d_ctx_tier1")]
    pub context_max_tier1: usize,
    #[serde(default = "d_ctx_tier2")]
    pub context_max_tier2: usize,
    #[serde(default = "d_ctx_tier3")]
    pub context_max_tier3: usize,
    #[serde(default = "d_ctx_chars")]
    pub context_max_chars: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_results_per_query: d_max_per_query(),
            content_similarity_threshold: d_content_similarity(),
            tier_1_threshold: d_tier1(),
            tier_2_threshold: d_tier2(),
            context_max_tier1: d_ctx_tier1(),
            context_max_tier2: d_ctx_tier2(),
            context_max_tier3: d_ctx_tier3(),
            context_max_chars: d_ctx_chars(),
        }
    }
}

fn d_max_per_query() -> usize {
    3
}
fn d_content_similarity() -> f64 {
    0.7
}
fn d_tier1() -> f64 {
    0.6
}
fn d_tier2() -> f64 {
    0.3
}
fn d_ctx_tier1() -> usize {
    8
}
fn d_ctx_tier2() -> usize {
    6
}
fn d_ctx_tier3() -> usize {
    4
}
fn d_ctx_chars() -> usize {
    12_000
}
