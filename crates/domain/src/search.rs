use serde::{Deserialize, Serialize};

/// A single web search result (C1/C2/C8.searcher).
///
/// Missing fields default to empty string / `0.0`; `score` is only
/// comparable within a single run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchHit {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Snippet / summary / raw excerpt — whichever the provider supplied.
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

/// One query's result set within `scraped_content` (a "bag").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBag {
    pub query: String,
    pub timestamp: i64,
    #[serde(default)]
    pub cached: bool,
    pub results: Vec<SearchHit>,
}

/// A cached search-result entry, bounded by `(max_size, ttl)` in the owning cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub insertion_time: i64,
    #[serde(default)]
    pub hit_count: u64,
}

/// Known URL tracking query-keys stripped during canonicalization.
const TRACKING_KEYS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "ref",
    "mc_cid",
    "mc_eid",
];

/// Canonicalize a URL for dedup purposes: lowercase scheme+host, strip a
/// trailing slash from the path, drop known tracking query keys, and drop
/// the fragment.
///
/// Idempotent: `canonicalize_url(canonicalize_url(u)) == canonicalize_url(u)`.
/// Malformed input (no recognizable scheme) is returned lowercased and
/// trimmed, unchanged otherwise — canonicalization degrades gracefully
/// rather than failing.
pub fn canonicalize_url(url: &str) -> String {
    let url = url.trim();
    let without_fragment = url.split('#').next().unwrap_or(url);

    let (scheme_host_sep, rest) = match without_fragment.find("://") {
        Some(idx) => (idx, &without_fragment[idx + 3..]),
        None => return without_fragment.to_ascii_lowercase(),
    };
    let scheme = without_fragment[..scheme_host_sep].to_ascii_lowercase();

    let (authority, path_and_query) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let authority = authority.to_ascii_lowercase();

    let (path, query) = match path_and_query.find('?') {
        Some(idx) => (&path_and_query[..idx], Some(&path_and_query[idx + 1..])),
        None => (path_and_query, None),
    };
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    let mut out = format!("{scheme}://{authority}{path}");
    if let Some(q) = query {
        let kept: Vec<&str> = q
            .split('&')
            .filter(|kv| {
                let key = kv.split('=').next().unwrap_or("");
                !TRACKING_KEYS.contains(&key)
            })
            .collect();
        if !kept.is_empty() {
            out.push('?');
            out.push_str(&kept.join("&"));
        }
    }
    out
}
