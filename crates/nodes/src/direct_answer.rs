//! Direct-answer node: a single-turn LLM call for requests the router
//! decided need no research at all.

use async_trait::async_trait;
use std::sync::Arc;

use ra_domain::config::RunConfig;
use ra_domain::error::Result;
use ra_domain::run_state::RunState;
use ra_domain::tool::Message;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::{ChatRequest, ProviderRegistry};

pub struct DirectAnswerNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
}

impl DirectAnswerNode {
    pub fn new(registry: Arc<ProviderRegistry>, config: RunConfig) -> Self {
        Self { registry, config }
    }
}

#[async_trait]
impl Node for DirectAnswerNode {
    fn name(&self) -> &str {
        "direct_answer"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.model)?;
        let messages = vec![
            Message::system("Answer the user's request directly and concisely."),
            Message::user(state.input.clone()),
        ];

        let response = provider
            .chat(ChatRequest {
                messages,
                model,
                ..Default::default()
            })
            .await?;

        Ok(NodeOutput::Partial(PartialRunState {
            final_report: Some(response.content),
            is_complete: Some(true),
            ..Default::default()
        }))
    }
}
