//! Human-review node: the terminal node of every route. Finalizes the
//! report, or suspends the run for a human to approve the draft first.

use async_trait::async_trait;

use ra_domain::config::RunConfig;
use ra_domain::error::Result;
use ra_domain::run_state::RunState;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};

pub struct HumanReviewNode {
    config: RunConfig,
}

impl HumanReviewNode {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Node for HumanReviewNode {
    fn name(&self) -> &str {
        "human_review"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        if state.is_complete {
            return Ok(NodeOutput::Partial(PartialRunState::default()));
        }

        if self.config.allow_interrupts && self.config.human_review && !state.draft_report.is_empty() {
            return Ok(NodeOutput::Interrupt {
                payload: serde_json::json!({"draft_report": state.draft_report}),
            });
        }

        Ok(NodeOutput::Partial(PartialRunState {
            final_report: Some(state.draft_report.clone()),
            is_complete: Some(true),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::config::AgentProfile;
    use std::collections::HashMap;

    fn config(allow_interrupts: bool, human_review: bool) -> RunConfig {
        RunConfig {
            allow_interrupts,
            human_review,
            agent_profile: AgentProfile { enabled_tools: HashMap::new() },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn already_complete_run_passes_through_untouched() {
        let node = HumanReviewNode::new(config(true, true));
        let mut state = RunState::new("r1", "t1", "input");
        state.is_complete = true;
        let output = node.run(&state, None).await.unwrap();
        let NodeOutput::Partial(partial) = output else { panic!("expected partial") };
        assert!(partial.final_report.is_none());
    }

    #[tokio::test]
    async fn finalizes_draft_when_interrupts_disabled() {
        let node = HumanReviewNode::new(config(false, false));
        let mut state = RunState::new("r1", "t1", "input");
        state.draft_report = "the report".into();
        let output = node.run(&state, None).await.unwrap();
        let NodeOutput::Partial(partial) = output else { panic!("expected partial") };
        assert_eq!(partial.final_report, Some("the report".to_string()));
        assert_eq!(partial.is_complete, Some(true));
    }

    #[tokio::test]
    async fn interrupts_when_configured_and_a_draft_exists() {
        let node = HumanReviewNode::new(config(true, true));
        let mut state = RunState::new("r1", "t1", "input");
        state.draft_report = "the report".into();
        let output = node.run(&state, None).await.unwrap();
        assert!(matches!(output, NodeOutput::Interrupt { .. }));
    }
}
