//! Planner node: turns the input into a multi-query research plan.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use ra_domain::config::RunConfig;
use ra_domain::error::Result;
use ra_domain::run_state::RunState;
use ra_domain::tool::Message;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::ProviderRegistry;

use crate::common::call_structured;

const PLANNER_SYSTEM_PROMPT: &str = "Break the user's request into 3 to 7 distinct web search \
queries that together would gather enough evidence to answer it thoroughly. Respond with JSON: \
{\"queries\": [str, ...], \"reasoning\": str}.";

const MAX_PLAN_QUERIES: usize = 6;

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    queries: Vec<String>,
    #[serde(default)]
    #[allow(dead_code)]
    reasoning: String,
}

pub struct PlannerNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
}

impl PlannerNode {
    pub fn new(registry: Arc<ProviderRegistry>, config: RunConfig) -> Self {
        Self { registry, config }
    }
}

/// Strip, lowercase-dedup, and clamp a raw query list to at most
/// [`MAX_PLAN_QUERIES`] entries, preserving first-seen order and casing.
fn normalize_queries(raw: Vec<String>, fallback_input: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for q in raw {
        let trimmed = q.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            out.push(trimmed.to_string());
        }
        if out.len() >= MAX_PLAN_QUERIES {
            break;
        }
    }
    if out.is_empty() {
        out.push(fallback_input.to_string());
    }
    out
}

#[async_trait]
impl Node for PlannerNode {
    fn name(&self) -> &str {
        "planner"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.model)?;
        let messages = vec![Message::system(PLANNER_SYSTEM_PROMPT), Message::user(state.input.clone())];

        let queries = match call_structured::<PlannerOutput>(provider.as_ref(), messages, model).await {
            Ok(o) => normalize_queries(o.queries, &state.input),
            Err(e) => {
                return Ok(NodeOutput::Partial(PartialRunState {
                    research_plan: vec![state.input.clone()],
                    errors: vec![format!("planner failed, falling back to a single query: {e}")],
                    ..Default::default()
                }));
            }
        };

        Ok(NodeOutput::Partial(PartialRunState {
            research_plan: queries,
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_case_insensitively_keeping_first_casing() {
        let queries = normalize_queries(
            vec!["Lithium Batteries".into(), "lithium batteries".into(), "sodium batteries".into()],
            "fallback",
        );
        assert_eq!(queries, vec!["Lithium Batteries".to_string(), "sodium batteries".to_string()]);
    }

    #[test]
    fn clamps_to_max_plan_queries() {
        let raw: Vec<String> = (0..10).map(|i| format!("query {i}")).collect();
        let queries = normalize_queries(raw, "fallback");
        assert_eq!(queries.len(), MAX_PLAN_QUERIES);
    }

    #[test]
    fn empty_input_falls_back_to_original_query() {
        let queries = normalize_queries(vec!["   ".into(), "".into()], "original input");
        assert_eq!(queries, vec!["original input".to_string()]);
    }

    #[test]
    fn strips_surrounding_whitespace() {
        let queries = normalize_queries(vec!["  padded query  ".into()], "fallback");
        assert_eq!(queries, vec!["padded query".to_string()]);
    }
}
