//! Claim verifier (C6).
//!
//! Extracts candidate factual claims from a draft report and matches each
//! against the aggregator's tier 1-2 evidence, labeling every claim
//! verified, contradicted, or unsupported.

use ra_aggregator::RankedHit;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimStatus {
    Verified,
    Contradicted,
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct ClaimVerification {
    pub claim: String,
    pub status: ClaimStatus,
    pub evidence_urls: Vec<String>,
    pub score: f64,
    pub notes: String,
}

#[derive(Debug, Clone, Copy)]
pub struct VerifierParams {
    pub min_overlap_tokens: usize,
    pub max_evidence_urls: usize,
}

impl Default for VerifierParams {
    fn default() -> Self {
        Self {
            min_overlap_tokens: 2,
            max_evidence_urls: 5,
        }
    }
}

fn claim_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(study|report|data|research|survey|analysis)\b|\d{2,4}\b|\d+%").unwrap()
    })
}

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "is",
            "are", "was", "were", "be", "been", "it", "its", "this", "that", "as", "by", "with",
            "from",
        ]
        .into_iter()
        .collect()
    })
}

fn negation_markers() -> &'static [&'static str] {
    &["not", "no", "never", "didn't", "did not", "isn't", "wasn't", "doesn't"]
}

fn directional_markers_up() -> &'static [&'static str] {
    &["increase", "increased", "rose", "up", "grew", "growth", "higher"]
}

fn directional_markers_down() -> &'static [&'static str] {
    &["decrease", "decreased", "fell", "down", "declined", "drop", "lower"]
}

/// Split a draft into sentences, keeping only those carrying a claim marker
/// (study/report/data words, or a numeric/percentage pattern).
pub fn extract_claims(draft: &str) -> Vec<String> {
    draft
        .split(['.', '\n'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| claim_marker_re().is_match(s))
        .map(|s| s.to_string())
        .collect()
}

fn meaningful_terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && !stopwords().contains(t))
        .map(String::from)
        .collect()
}

fn has_negation(text: &str) -> bool {
    let lower = text.to_lowercase();
    negation_markers().iter().any(|m| lower.contains(m))
}

fn directional_polarity(text: &str) -> Option<bool> {
    let lower = text.to_lowercase();
    let up = directional_markers_up().iter().any(|m| lower.contains(m));
    let down = directional_markers_down().iter().any(|m| lower.contains(m));
    match (up, down) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

/// Verify one claim against the evidence corpus (tier 1-2 hits).
pub fn verify_claim(claim: &str, evidence: &[RankedHit], params: &VerifierParams) -> ClaimVerification {
    let claim_terms = meaningful_terms(claim);
    let claim_negated = has_negation(claim);
    let claim_direction = directional_polarity(claim);

    let mut best: Option<(usize, &RankedHit)> = None;
    let mut contradiction: Option<&RankedHit> = None;

    for hit in evidence {
        let evidence_text = format!("{} {}", hit.title.as_deref().unwrap_or(""), hit.excerpt);
        let evidence_terms = meaningful_terms(&evidence_text);
        let overlap = claim_terms.intersection(&evidence_terms).count();
        if overlap < params.min_overlap_tokens {
            continue;
        }

        let evidence_negated = has_negation(&evidence_text);
        let evidence_direction = directional_polarity(&evidence_text);
        let negation_conflict = claim_negated != evidence_negated;
        let direction_conflict = matches!((claim_direction, evidence_direction), (Some(a), Some(b)) if a != b);

        if negation_conflict || direction_conflict {
            contradiction = Some(hit);
            break;
        }

        let should_replace = match best {
            None => true,
            Some((best_overlap, _)) => overlap > best_overlap,
        };
        if should_replace {
            best = Some((overlap, hit));
        }
    }

    if let Some(hit) = contradiction {
        return ClaimVerification {
            claim: claim.to_string(),
            status: ClaimStatus::Contradicted,
            evidence_urls: vec![hit.url.clone()],
            score: 0.0,
            notes: "evidence polarity conflicts with claim".into(),
        };
    }

    match best {
        Some((overlap, hit)) => ClaimVerification {
            claim: claim.to_string(),
            status: ClaimStatus::Verified,
            evidence_urls: vec![hit.url.clone()].into_iter().take(params.max_evidence_urls).collect(),
            score: overlap as f64 / claim_terms.len().max(1) as f64,
            notes: String::new(),
        },
        None => ClaimVerification {
            claim: claim.to_string(),
            status: ClaimStatus::Unsupported,
            evidence_urls: Vec::new(),
            score: 0.0,
            notes: "no evidence with sufficient term overlap".into(),
        },
    }
}

/// Verify every extracted claim in a draft against the evidence corpus.
pub fn verify_draft(draft: &str, evidence: &[RankedHit], params: &VerifierParams) -> Vec<ClaimVerification> {
    extract_claims(draft)
        .iter()
        .map(|claim| verify_claim(claim, evidence, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(url: &str, excerpt: &str) -> RankedHit {
        // RankedHit has private insertion_order; build via aggregate() for a real instance.
        let bag = ra_domain::search::ResultBag {
            query: "q".into(),
            timestamp: 0,
            cached: false,
            results: vec![ra_domain::search::SearchHit {
                url: url.into(),
                title: Some("Annual report".into()),
                excerpt: excerpt.into(),
                score: 0.9,
                ..Default::default()
            }],
        };
        ra_aggregator::aggregate(&[bag], &ra_aggregator::AggregatorParams::default())
            .tier_1
            .remove(0)
    }

    #[test]
    fn extracts_sentences_with_claim_markers() {
        let draft = "This is a normal sentence. The report found revenue grew 12% in 2024. Nothing notable here.";
        let claims = extract_claims(draft);
        assert_eq!(claims.len(), 1);
        assert!(claims[0].contains("12%"));
    }

    #[test]
    fn contradicted_when_polarity_differs() {
        let claim = "The company's revenue increased in 2024 according to the annual report";
        let ev = evidence(
            "https://example.com/report",
            "The company's revenue did not increase in 2024 and decreased by 5%",
        );
        let result = verify_claim(claim, &[ev], &VerifierParams::default());
        assert_eq!(result.status, ClaimStatus::Contradicted);
        assert_eq!(result.evidence_urls, vec!["https://example.com/report".to_string()]);
    }

    #[test]
    fn verified_when_overlap_and_no_conflict() {
        let claim = "The company's revenue increased in 2024 per the annual report";
        let ev = evidence(
            "https://example.com/report",
            "Annual report confirms company revenue increased significantly in 2024",
        );
        let result = verify_claim(claim, &[ev], &VerifierParams::default());
        assert_eq!(result.status, ClaimStatus::Verified);
    }

    #[test]
    fn unsupported_when_no_overlap() {
        let claim = "The report found 2024 revenue up 12%";
        let ev = evidence("https://example.com/x", "Completely unrelated text about weather patterns");
        let result = verify_claim(claim, &[ev], &VerifierParams::default());
        assert_eq!(result.status, ClaimStatus::Unsupported);
    }
}
