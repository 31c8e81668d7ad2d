//! Reviser node: redrafts the report from the existing evidence using the
//! evaluator's feedback, without doing any new research.

use std::sync::Arc;

use async_trait::async_trait;

use ra_domain::config::RunConfig;
use ra_domain::error::Result;
use ra_domain::run_state::RunState;
use ra_domain::tool::Message;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::{ChatRequest, ProviderRegistry};

const REVISER_SYSTEM_PROMPT: &str = "Rewrite the draft report to address the reviewer's feedback. \
Keep all citation tags intact and accurate; do not invent new facts or sources. Return only the \
revised report text.";

pub struct ReviserNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
}

impl ReviserNode {
    pub fn new(registry: Arc<ProviderRegistry>, config: RunConfig) -> Self {
        Self { registry, config }
    }
}

#[async_trait]
impl Node for ReviserNode {
    fn name(&self) -> &str {
        "reviser"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.model)?;
        let feedback = state.evaluation.as_ref().map(|e| e.feedback.as_str()).unwrap_or("");

        let messages = vec![
            Message::system(REVISER_SYSTEM_PROMPT),
            Message::user(format!(
                "Request: {}\n\nFeedback:\n{}\n\nCurrent draft:\n{}",
                state.input, feedback, state.draft_report
            )),
        ];

        let response = provider
            .chat(ChatRequest {
                messages,
                model,
                ..Default::default()
            })
            .await?;

        Ok(NodeOutput::Partial(PartialRunState {
            draft_report: Some(response.content),
            revision_count: Some(state.revision_count + 1),
            ..Default::default()
        }))
    }
}
