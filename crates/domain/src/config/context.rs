use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context manager (C5) — message/token truncation policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Truncation strategy selector, matching the three named strategies in
/// `original_source/agent/context_manager.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    #[default]
    Smart,
    Fifo,
    Middle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "d_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "d_reserve_tokens")]
    pub reserve_tokens: usize,
    #[serde(default = "d_keep_system")]
    pub keep_system_messages: usize,
    #[serde(default = "d_keep_recent")]
    pub keep_recent_messages: usize,
    #[serde(default)]
    pub strategy: TruncationStrategy,
    /// Messages shorter than this (in tokens) are never evicted individually.
    #[serde(default = "d_min_message_tokens")]
    pub min_message_tokens: usize,
    /// `should_truncate` fires once usage crosses this fraction of the
    /// model's context window.
    #[serde(default = "d_truncate_ratio")]
    pub truncate_ratio: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: d_max_tokens(),
            reserve_tokens: d_reserve_tokens(),
            keep_system_messages: d_keep_system(),
            keep_recent_messages: d_keep_recent(),
            strategy: TruncationStrategy::Smart,
            min_message_tokens: d_min_message_tokens(),
            truncate_ratio: d_truncate_ratio(),
        }
    }
}

fn d_max_tokens() -> usize {
    8_000
}
fn d_reserve_tokens() -> usize {
    1_000
}
fn d_keep_system() -> usize {
    2
}
fn d_keep_recent() -> usize {
    4
}
fn d_min_message_tokens() -> usize {
    50
}
fn d_truncate_ratio() -> f64 {
    0.9
}
