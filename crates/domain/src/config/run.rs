use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run configuration (spec.md §6 "Run configuration (recognized options)")
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-run configuration accepted by the graph engine when a caller submits
/// `{query, images, mode-hints, config}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// "provider/model" role string for general-purpose nodes.
    #[serde(default = "d_model")]
    pub model: String,
    /// "provider/model" role string for the evaluator/reasoning-heavy nodes.
    #[serde(default = "d_model")]
    pub reasoning_model: String,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default = "d_max_revisions")]
    pub max_revisions: u32,
    #[serde(default = "d_confidence_threshold")]
    pub routing_confidence_threshold: f64,
    #[serde(default)]
    pub allow_interrupts: bool,
    #[serde(default)]
    pub human_review: bool,
    /// 0 = unlimited.
    #[serde(default)]
    pub tool_call_limit: u32,
    #[serde(default = "d_true")]
    pub tool_retry: bool,
    #[serde(default = "d_retry_attempts")]
    pub tool_retry_max_attempts: u32,
    #[serde(default = "d_retry_backoff")]
    pub tool_retry_backoff: f64,
    #[serde(default)]
    pub agent_profile: AgentProfile,
    #[serde(default = "d_true")]
    pub trim_messages: bool,
    #[serde(default = "d_keep_first")]
    pub trim_messages_keep_first: usize,
    #[serde(default = "d_keep_last")]
    pub trim_messages_keep_last: usize,
    #[serde(default)]
    pub summary_messages: bool,
    #[serde(default = "d_summary_trigger")]
    pub summary_messages_trigger: usize,
    /// Bound on C4's auto-continuation loop iterations.
    #[serde(default = "d_max_iterations")]
    pub max_continuation_iterations: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: d_model(),
            reasoning_model: d_model(),
            search_mode: SearchMode::default(),
            max_revisions: d_max_revisions(),
            routing_confidence_threshold: d_confidence_threshold(),
            allow_interrupts: false,
            human_review: false,
            tool_call_limit: 0,
            tool_retry: true,
            tool_retry_max_attempts: d_retry_attempts(),
            tool_retry_backoff: d_retry_backoff(),
            agent_profile: AgentProfile::default(),
            trim_messages: true,
            trim_messages_keep_first: d_keep_first(),
            trim_messages_keep_last: d_keep_last(),
            summary_messages: false,
            summary_messages_trigger: d_summary_trigger(),
            max_continuation_iterations: d_max_iterations(),
        }
    }
}

/// Either a bare mode string or an explicit set of use-flags, matching
/// spec.md's `search_mode: str | {use_web, use_agent, use_deep_search}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchMode {
    Named(String),
    Flags {
        #[serde(default)]
        use_web: bool,
        #[serde(default)]
        use_agent: bool,
        #[serde(default)]
        use_deep_search: bool,
    },
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Named("deep".into())
    }
}

/// `agent_profile.enabled_tools` — a named allowlist of tool capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentProfile {
    #[serde(default)]
    pub enabled_tools: HashMap<String, bool>,
}

impl AgentProfile {
    pub fn is_enabled(&self, tool: &str) -> bool {
        self.enabled_tools.get(tool).copied().unwrap_or(false)
    }
}

/// The canonical tool-capability names recognized by `agent_profile.enabled_tools`.
pub const KNOWN_TOOL_CAPABILITIES: &[&str] = &[
    "web_search",
    "crawl",
    "browser",
    "sandbox_browser",
    "sandbox_web_search",
    "python",
    "task_list",
    "computer_use",
    "mcp",
];

fn d_model() -> String {
    "default/default".into()
}
fn d_max_revisions() -> u32 {
    1
}
fn d_confidence_threshold() -> f64 {
    0.6
}
fn d_true() -> bool {
    true
}
fn d_retry_attempts() -> u32 {
    3
}
fn d_retry_backoff() -> f64 {
    1.0
}
fn d_keep_first() -> usize {
    2
}
fn d_keep_last() -> usize {
    4
}
fn d_summary_trigger() -> usize {
    20
}
fn d_max_iterations() -> u32 {
    10
}
