//! Evaluator node: scores a draft report against the evidence and decides
//! whether it passes, needs a redraft, or needs more research.

use std::sync::Arc;

use async_trait::async_trait;

use ra_aggregator::{aggregate, AggregatorParams};
use ra_domain::config::{AggregatorConfig, RunConfig};
use ra_domain::error::Result;
use ra_domain::run_state::{Evaluation, RunState, Verdict};
use ra_domain::tool::Message;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::ProviderRegistry;
use ra_verifier::{verify_draft, ClaimStatus, VerifierParams};

use crate::common::call_structured;

const EVALUATOR_SYSTEM_PROMPT: &str = "Evaluate the draft report against the user's request. Score \
each dimension from 0 to 1: coverage (does it address everything asked), accuracy (are claims \
well-supported), freshness (is the evidence current), coherence (is it well-organized and readable). \
List any missing_topics and, if more research would help, suggested_queries. Pick a verdict: `pass` \
if the report is ready to ship, `revise` if a redraft of the existing evidence would fix it, or \
`incomplete` if more research is needed first. Respond with JSON matching: {\"verdict\": ..., \
\"dimensions\": {\"coverage\": .., \"accuracy\": .., \"freshness\": .., \"coherence\": ..}, \
\"feedback\": str, \"missing_topics\": [str], \"suggested_queries\": [str]}.";

/// Below this, a `pass` verdict is downgraded regardless of what the model said.
const MIN_PASSING_SCORE: f64 = 0.6;

pub struct EvaluatorNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
    aggregator_config: AggregatorConfig,
}

impl EvaluatorNode {
    pub fn new(registry: Arc<ProviderRegistry>, config: RunConfig, aggregator_config: AggregatorConfig) -> Self {
        Self { registry, config, aggregator_config }
    }
}

/// Blend the verifier's verified-claim fraction into the LLM's own accuracy
/// score, and downgrade an unwarranted `pass` verdict.
fn reconcile(mut evaluation: Evaluation, verified_fraction: Option<f64>) -> Evaluation {
    if let Some(fraction) = verified_fraction {
        evaluation.dimensions.accuracy = (evaluation.dimensions.accuracy + fraction) / 2.0;
    }
    if evaluation.verdict == Verdict::Pass
        && (evaluation.dimensions.min() < MIN_PASSING_SCORE || !evaluation.missing_topics.is_empty())
    {
        evaluation.verdict = Verdict::Revise;
    }
    evaluation
}

#[async_trait]
impl Node for EvaluatorNode {
    fn name(&self) -> &str {
        "evaluator"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        let agg_params = AggregatorParams {
            max_results_per_query: self.aggregator_config.max_results_per_query,
            content_similarity_threshold: self.aggregator_config.content_similarity_threshold,
            tier_1_threshold: self.aggregator_config.tier_1_threshold,
            tier_2_threshold: self.aggregator_config.tier_2_threshold,
        };
        let report = aggregate(&state.scraped_content, &agg_params);
        let mut evidence = report.tier_1.clone();
        evidence.extend(report.tier_2.clone());

        let verified_fraction = if evidence.is_empty() {
            None
        } else {
            let verifications = verify_draft(&state.draft_report, &evidence, &VerifierParams::default());
            if verifications.is_empty() {
                None
            } else {
                let verified = verifications.iter().filter(|v| v.status == ClaimStatus::Verified).count();
                Some(verified as f64 / verifications.len() as f64)
            }
        };

        let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.reasoning_model)?;
        let messages = vec![
            Message::system(EVALUATOR_SYSTEM_PROMPT),
            Message::user(format!("Request: {}\n\nDraft report:\n{}", state.input, state.draft_report)),
        ];

        let evaluation = match call_structured::<Evaluation>(provider.as_ref(), messages, model).await {
            Ok(e) => reconcile(e, verified_fraction),
            Err(e) => {
                return Ok(NodeOutput::Partial(PartialRunState {
                    errors: vec![format!("evaluator failed, treating draft as passing: {e}")],
                    is_complete: Some(true),
                    final_report: Some(state.draft_report.clone()),
                    ..Default::default()
                }));
            }
        };

        Ok(NodeOutput::Partial(PartialRunState {
            evaluation: Some(evaluation),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::run_state::EvalDimensions;

    fn evaluation(verdict: Verdict, dims: EvalDimensions, missing: Vec<&str>) -> Evaluation {
        Evaluation {
            verdict,
            dimensions: dims,
            feedback: "ok".into(),
            missing_topics: missing.into_iter().map(String::from).collect(),
            suggested_queries: Vec::new(),
        }
    }

    fn dims(v: f64) -> EvalDimensions {
        EvalDimensions { coverage: v, accuracy: v, freshness: v, coherence: v }
    }

    #[test]
    fn pass_survives_when_scores_and_topics_are_clean() {
        let e = reconcile(evaluation(Verdict::Pass, dims(0.9), vec![]), None);
        assert_eq!(e.verdict, Verdict::Pass);
    }

    #[test]
    fn pass_is_downgraded_when_a_dimension_is_low() {
        let e = reconcile(evaluation(Verdict::Pass, dims(0.3), vec![]), None);
        assert_eq!(e.verdict, Verdict::Revise);
    }

    #[test]
    fn pass_is_downgraded_when_topics_are_missing() {
        let e = reconcile(evaluation(Verdict::Pass, dims(0.9), vec!["topic x"]), None);
        assert_eq!(e.verdict, Verdict::Revise);
    }

    #[test]
    fn verified_fraction_blends_into_accuracy() {
        let e = reconcile(evaluation(Verdict::Revise, dims(0.8), vec![]), Some(0.4));
        assert!((e.dimensions.accuracy - 0.6).abs() < 1e-9);
    }

    #[test]
    fn incomplete_verdict_is_not_touched_by_downgrade_logic() {
        let e = reconcile(evaluation(Verdict::Incomplete, dims(0.9), vec![]), None);
        assert_eq!(e.verdict, Verdict::Incomplete);
    }
}
