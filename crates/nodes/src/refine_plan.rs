//! Refine-plan node: expands the research plan after an `incomplete`
//! verdict, adding only queries not already covered.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use ra_cache::QueryDeduplicator;
use ra_domain::config::RunConfig;
use ra_domain::error::Result;
use ra_domain::run_state::RunState;
use ra_domain::tool::Message;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::ProviderRegistry;

use crate::common::call_structured;

const FOLLOWUP_SYSTEM_PROMPT: &str = "The research so far is missing some topics. Propose up to 3 \
additional, distinct web search queries that would fill the gaps. Respond with JSON: \
{\"queries\": [str, ...]}.";

/// Similarity threshold above which a candidate query is considered a
/// duplicate of one already dispatched.
const DEDUP_THRESHOLD: f64 = 0.85;

#[derive(Debug, Deserialize)]
struct FollowupOutput {
    queries: Vec<String>,
}

pub struct RefinePlanNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
}

impl RefinePlanNode {
    pub fn new(registry: Arc<ProviderRegistry>, config: RunConfig) -> Self {
        Self { registry, config }
    }
}

/// Build candidate follow-up queries from the evaluator's own suggestions,
/// falling back to a plain `"{original} {topic}"` synthesis per missing
/// topic when the evaluator didn't suggest anything concrete.
fn candidate_queries(suggested: &[String], missing_topics: &[String], original_input: &str) -> Vec<String> {
    if !suggested.is_empty() {
        return suggested.to_vec();
    }
    missing_topics.iter().map(|topic| format!("{original_input} {topic}")).collect()
}

#[async_trait]
impl Node for RefinePlanNode {
    fn name(&self) -> &str {
        "refine_plan"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        let evaluation = state.evaluation.as_ref();
        let mut candidates = evaluation
            .map(|e| candidate_queries(&e.suggested_queries, &e.missing_topics, &state.input))
            .unwrap_or_default();

        if candidates.is_empty() {
            let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.model)?;
            let messages = vec![
                Message::system(FOLLOWUP_SYSTEM_PROMPT),
                Message::user(state.input.clone()),
            ];
            candidates = call_structured::<FollowupOutput>(provider.as_ref(), messages, model)
                .await
                .map(|o| o.queries)
                .unwrap_or_default();
        }

        let deduper = QueryDeduplicator::new(DEDUP_THRESHOLD);
        let mut already_seen = state.research_plan.clone();
        already_seen.extend(candidates);
        let (unique, _duplicates) = deduper.dedupe(&already_seen);
        let new_queries: Vec<String> = unique
            .into_iter()
            .filter(|q| !state.research_plan.iter().any(|existing| existing == q))
            .collect();

        Ok(NodeOutput::Partial(PartialRunState {
            research_plan: new_queries,
            revision_count: Some(state.revision_count + 1),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_evaluator_suggested_queries() {
        let queries = candidate_queries(&["suggested one".to_string()], &["topic a".to_string()], "input");
        assert_eq!(queries, vec!["suggested one".to_string()]);
    }

    #[test]
    fn synthesizes_from_missing_topics_when_nothing_suggested() {
        let queries = candidate_queries(&[], &["battery density".to_string()], "EV market");
        assert_eq!(queries, vec!["EV market battery density".to_string()]);
    }

    #[test]
    fn empty_everything_yields_no_candidates() {
        let queries = candidate_queries(&[], &[], "input");
        assert!(queries.is_empty());
    }
}
