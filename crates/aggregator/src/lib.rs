//! Result aggregator (C2).
//!
//! Merges per-query result bags into ranked, tiered evidence: canonicalize
//! URLs, dedup by canonical URL then by content similarity, cap per
//! originating query, rank, and partition into three score tiers. Produces
//! a writer-facing projection with stable `[Sq-i]` citation tags.

use ra_domain::search::{canonicalize_url, ResultBag};

/// One surviving hit after dedup, carrying its stable citation tag.
#[derive(Debug, Clone)]
pub struct RankedHit {
    pub url: String,
    pub canonical_url: String,
    pub title: Option<String>,
    pub excerpt: String,
    pub score: f64,
    pub query: String,
    /// Stable `Sq-i` tag: `q` is the query's ordinal position in
    /// `scraped_content`, `i` is the hit's ordinal position within that
    /// query's bag — both assigned at scrape time, so the tag never
    /// changes across rerank/dedup/revision as long as the underlying
    /// bag is unchanged.
    pub citation_tag: String,
    insertion_order: usize,
}

#[derive(Debug, Clone)]
pub struct AggregationReport {
    pub tier_1: Vec<RankedHit>,
    pub tier_2: Vec<RankedHit>,
    pub tier_3: Vec<RankedHit>,
    pub total_before: usize,
    pub total_after: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregatorParams {
    pub max_results_per_query: usize,
    pub content_similarity_threshold: f64,
    pub tier_1_threshold: f64,
    pub tier_2_threshold: f64,
}

impl Default for AggregatorParams {
    fn default() -> Self {
        Self {
            max_results_per_query: 3,
            content_similarity_threshold: 0.7,
            tier_1_threshold: 0.6,
            tier_2_threshold: 0.3,
        }
    }
}

fn content_key(hit: &RankedHit) -> String {
    format!("{} {}", hit.title.as_deref().unwrap_or(""), hit.excerpt).to_lowercase()
}

/// (P6) Aggregator monotonicity: this function is pure given its input —
/// removing an input hit can only remove candidates from the output tiers,
/// never promote a surviving hit across a tier boundary, since tiering
/// depends only on that hit's own `score`.
pub fn aggregate(bags: &[ResultBag], params: &AggregatorParams) -> AggregationReport {
    let mut flat: Vec<RankedHit> = Vec::new();
    let mut counter = 0usize;
    for (q_idx, bag) in bags.iter().enumerate() {
        for (h_idx, hit) in bag.results.iter().enumerate() {
            flat.push(RankedHit {
                url: hit.url.clone(),
                canonical_url: canonicalize_url(&hit.url),
                title: hit.title.clone(),
                excerpt: hit.excerpt.clone(),
                score: hit.score,
                query: bag.query.clone(),
                citation_tag: format!("S{}-{}", q_idx + 1, h_idx + 1),
                insertion_order: counter,
            });
            counter += 1;
        }
    }
    let total_before = flat.len();

    // Dedup by canonical URL: keep the highest-scoring, first-inserted-on-tie.
    flat.sort_by(|a, b| {
        a.canonical_url
            .cmp(&b.canonical_url)
            .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.insertion_order.cmp(&b.insertion_order))
    });
    let mut by_url: Vec<RankedHit> = Vec::new();
    let mut last_url: Option<String> = None;
    for hit in flat.into_iter() {
        if last_url.as_deref() == Some(hit.canonical_url.as_str()) {
            continue;
        }
        last_url = Some(hit.canonical_url.clone());
        by_url.push(hit);
    }

    // Dedup by content similarity (title+excerpt), examining highest score
    // first so ties resolve in favor of the better-scored hit.
    by_url.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.insertion_order.cmp(&b.insertion_order))
    });
    let mut kept: Vec<RankedHit> = Vec::new();
    let mut kept_keys: Vec<String> = Vec::new();
    for hit in by_url.into_iter() {
        let key = content_key(&hit);
        let is_duplicate = kept_keys
            .iter()
            .any(|k| strsim::sorensen_dice(&key, k) >= params.content_similarity_threshold);
        if is_duplicate {
            continue;
        }
        kept_keys.push(key);
        kept.push(hit);
    }

    // Cap per originating query, preferring higher score (already sorted desc).
    let mut per_query_count: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    let mut capped: Vec<RankedHit> = Vec::new();
    for hit in kept.into_iter() {
        let count = per_query_count.entry(hit.query.clone()).or_insert(0);
        if *count >= params.max_results_per_query {
            continue;
        }
        *count += 1;
        capped.push(hit);
    }

    // Final rank: score descending, stable on ties by original insertion order.
    capped.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.insertion_order.cmp(&b.insertion_order))
    });
    let total_after = capped.len();

    let mut tier_1 = Vec::new();
    let mut tier_2 = Vec::new();
    let mut tier_3 = Vec::new();
    for hit in capped.into_iter() {
        if hit.score >= params.tier_1_threshold {
            tier_1.push(hit);
        } else if hit.score >= params.tier_2_threshold {
            tier_2.push(hit);
        } else {
            tier_3.push(hit);
        }
    }

    AggregationReport {
        tier_1,
        tier_2,
        tier_3,
        total_before,
        total_after,
    }
}

/// Writer-facing projection of an [`AggregationReport`]: an evidence block
/// with inline citation tags, and a parallel sources table.
#[derive(Debug, Clone)]
pub struct ContextProjection {
    pub evidence_block: String,
    pub sources_table: String,
}

impl AggregationReport {
    pub fn to_context(&self, max_tier1: usize, max_tier2: usize, max_tier3: usize, max_chars: usize) -> ContextProjection {
        let mut sections = Vec::new();
        let mut sources = Vec::new();

        let mut push_tier = |label: &str, hits: &[RankedHit], cap: usize| {
            for hit in hits.iter().take(cap) {
                let title = hit.title.as_deref().unwrap_or("(untitled)");
                sections.push(format!(
                    "[{tag}] ({tier}) {title}\n{excerpt}",
                    tag = hit.citation_tag,
                    tier = label,
                    title = title,
                    excerpt = hit.excerpt,
                ));
                sources.push(format!("[{}] {} — {}", hit.citation_tag, title, hit.url));
            }
        };
        push_tier("tier 1", &self.tier_1, max_tier1);
        push_tier("tier 2", &self.tier_2, max_tier2);
        push_tier("tier 3", &self.tier_3, max_tier3);

        let mut evidence_block = sections.join("\n\n=== BEGIN EVIDENCE ===\n\n");
        evidence_block = format!("=== BEGIN EVIDENCE ===\n\n{evidence_block}\n\n=== END EVIDENCE ===");
        if evidence_block.len() > max_chars {
            let boundary = floor_char_boundary(&evidence_block, max_chars.saturating_sub(16));
            evidence_block.truncate(boundary);
            evidence_block.push_str("\n[TRUNCATED_TOTAL_CAP]");
        }

        ContextProjection {
            evidence_block,
            sources_table: sources.join("\n"),
        }
    }
}

/// UTF-8-safe floor: the largest byte index ≤ `idx` that lies on a char boundary.
fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::search::SearchHit;

    fn hit(url: &str, title: &str, excerpt: &str, score: f64) -> SearchHit {
        SearchHit {
            url: url.into(),
            title: Some(title.into()),
            excerpt: excerpt.into(),
            score,
            ..Default::default()
        }
    }

    fn bag(query: &str, hits: Vec<SearchHit>) -> ResultBag {
        ResultBag {
            query: query.into(),
            timestamp: 0,
            cached: false,
            results: hits,
        }
    }

    #[test]
    fn dedups_by_canonical_url_keeping_higher_score() {
        let bags = vec![bag(
            "q1",
            vec![
                hit("https://example.com/a", "A", "first", 0.5),
                hit("https://example.com/a/", "A dup", "second", 0.9),
            ],
        )];
        let report = aggregate(&bags, &AggregatorParams::default());
        assert_eq!(report.total_before, 2);
        assert_eq!(report.total_after, 1);
        assert_eq!(report.tier_1[0].score, 0.9);
    }

    #[test]
    fn tiers_partition_by_score_thresholds() {
        let bags = vec![bag(
            "q1",
            vec![
                hit("https://a.com", "A", "unique content alpha", 0.8),
                hit("https://b.com", "B", "unique content beta", 0.5),
                hit("https://c.com", "C", "unique content gamma", 0.1),
            ],
        )];
        let report = aggregate(&bags, &AggregatorParams::default());
        assert_eq!(report.tier_1.len(), 1);
        assert_eq!(report.tier_2.len(), 1);
        assert_eq!(report.tier_3.len(), 1);
    }

    #[test]
    fn caps_per_originating_query() {
        let bags = vec![bag(
            "q1",
            vec![
                hit("https://a.com", "A", "content alpha one", 0.9),
                hit("https://b.com", "B", "content beta two", 0.85),
                hit("https://c.com", "C", "content gamma three", 0.8),
                hit("https://d.com", "D", "content delta four", 0.75),
            ],
        )];
        let params = AggregatorParams {
            max_results_per_query: 3,
            ..Default::default()
        };
        let report = aggregate(&bags, &params);
        assert_eq!(report.total_after, 3);
    }

    #[test]
    fn citation_tags_are_stable_query_and_hit_ordinals() {
        let bags = vec![
            bag("q1", vec![hit("https://a.com", "A", "alpha content", 0.9)]),
            bag("q2", vec![hit("https://b.com", "B", "beta content", 0.4)]),
        ];
        let report = aggregate(&bags, &AggregatorParams::default());
        assert_eq!(report.tier_1[0].citation_tag, "S1-1");
        assert_eq!(report.tier_3[0].citation_tag, "S2-1");
    }

    #[test]
    fn removing_a_hit_never_promotes_a_survivor_to_a_higher_tier() {
        let bags_full = vec![bag(
            "q1",
            vec![
                hit("https://a.com", "A", "alpha unique content", 0.5),
                hit("https://b.com", "B", "beta unique content", 0.9),
            ],
        )];
        let bags_reduced = vec![bag(
            "q1",
            vec![hit("https://a.com", "A", "alpha unique content", 0.5)],
        )];
        let full = aggregate(&bags_full, &AggregatorParams::default());
        let reduced = aggregate(&bags_reduced, &AggregatorParams::default());
        let full_a_tier = if full.tier_1.iter().any(|h| h.url == "https://a.com") {
            1
        } else if full.tier_2.iter().any(|h| h.url == "https://a.com") {
            2
        } else {
            3
        };
        let reduced_a_tier = if reduced.tier_1.iter().any(|h| h.url == "https://a.com") {
            1
        } else if reduced.tier_2.iter().any(|h| h.url == "https://a.com") {
            2
        } else {
            3
        };
        assert_eq!(full_a_tier, reduced_a_tier);
    }

    #[test]
    fn to_context_produces_parallel_sources_table() {
        let bags = vec![bag("q1", vec![hit("https://a.com", "A", "alpha content here", 0.9)])];
        let report = aggregate(&bags, &AggregatorParams::default());
        let projection = report.to_context(8, 6, 4, 10_000);
        assert!(projection.evidence_block.contains("[S1-1]"));
        assert!(projection.sources_table.contains("[S1-1]"));
        assert!(projection.sources_table.contains("https://a.com"));
    }

    #[test]
    fn to_context_respects_total_char_cap() {
        let bags = vec![bag(
            "q1",
            vec![hit("https://a.com", "A", &"x".repeat(1000), 0.9)],
        )];
        let report = aggregate(&bags, &AggregatorParams::default());
        let projection = report.to_context(8, 6, 4, 100);
        assert!(projection.evidence_block.len() <= 100 + 32);
        assert!(projection.evidence_block.ends_with("[TRUNCATED_TOTAL_CAP]"));
    }
}
