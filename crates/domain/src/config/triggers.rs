use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trigger manager (C9)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Execution history entries retained per manager (oldest dropped first).
    #[serde(default = "d_history_limit")]
    pub execution_history_limit: usize,
    /// Default webhook rate-limit window, in seconds.
    #[serde(default = "d_rate_window")]
    pub default_rate_window_secs: u64,
    /// Default webhook rate limit, requests per window.
    #[serde(default = "d_rate_limit")]
    pub default_rate_limit: u32,
    /// Default per-trigger execution timeout, in seconds.
    #[serde(default = "d_timeout")]
    pub default_timeout_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            execution_history_limit: d_history_limit(),
            default_rate_window_secs: d_rate_window(),
            default_rate_limit: d_rate_limit(),
            default_timeout_secs: d_timeout(),
        }
    }
}

fn d_history_limit() -> usize {
    200
}
fn d_rate_window() -> u64 {
    60
}
fn d_rate_limit() -> u32 {
    30
}
fn d_timeout() -> u64 {
    300
}
