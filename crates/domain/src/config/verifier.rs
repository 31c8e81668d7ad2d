use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Claim verifier (C6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Minimum shared meaningful-token overlap for a claim/evidence match.
    #[serde(default = "d_min_overlap")]
    pub min_overlap_tokens: usize,
    /// Max evidence URLs attached per claim.
    #[serde(default = "d_max_urls")]
    pub max_evidence_urls: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            min_overlap_tokens: d_min_overlap(),
            max_evidence_urls: d_max_urls(),
        }
    }
}

fn d_min_overlap() -> usize {
    2
}
fn d_max_urls() -> usize {
    5
}
