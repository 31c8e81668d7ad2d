//! Clarifier node: decides whether the input is too ambiguous to research
//! and, if so, short-circuits the run with a clarifying question.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use ra_domain::config::RunConfig;
use ra_domain::error::Result;
use ra_domain::run_state::RunState;
use ra_domain::tool::Message;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::ProviderRegistry;

use crate::common::call_structured;

const CLARIFIER_SYSTEM_PROMPT: &str = "Decide whether this request is too ambiguous to act on \
without more information from the user. Respond with JSON: {\"need_clarification\": bool, \
\"question\": str (a single clarifying question if needed, else empty), \"verification\": str \
(a short restatement of your understanding if no clarification is needed, else empty)}.";

#[derive(Debug, Deserialize)]
struct ClarifierOutput {
    need_clarification: bool,
    #[serde(default)]
    question: String,
    #[serde(default)]
    #[allow(dead_code)]
    verification: String,
}

pub struct ClarifierNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
}

impl ClarifierNode {
    pub fn new(registry: Arc<ProviderRegistry>, config: RunConfig) -> Self {
        Self { registry, config }
    }
}

#[async_trait]
impl Node for ClarifierNode {
    fn name(&self) -> &str {
        "clarifier"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.model)?;
        let messages = vec![Message::system(CLARIFIER_SYSTEM_PROMPT), Message::user(state.input.clone())];

        let output = match call_structured::<ClarifierOutput>(provider.as_ref(), messages, model).await {
            Ok(o) => o,
            Err(e) => {
                // Can't classify ambiguity; proceed rather than stall the run.
                return Ok(NodeOutput::Partial(PartialRunState {
                    needs_clarification: Some(false),
                    errors: vec![format!("clarifier failed, proceeding without clarification: {e}")],
                    ..Default::default()
                }));
            }
        };

        if output.need_clarification {
            Ok(NodeOutput::Partial(PartialRunState {
                needs_clarification: Some(true),
                final_report: Some(output.question),
                is_complete: Some(true),
                ..Default::default()
            }))
        } else {
            Ok(NodeOutput::Partial(PartialRunState {
                needs_clarification: Some(false),
                ..Default::default()
            }))
        }
    }
}
