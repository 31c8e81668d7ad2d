//! Writer node: drafts a cited report from the aggregated evidence, using
//! the auto-continuation loop (C4) to drive any code-execution sub-tool
//! calls (e.g. for charts) to completion.

use std::sync::Arc;

use async_trait::async_trait;

use ra_aggregator::{aggregate, AggregatorParams};
use ra_domain::config::{AggregatorConfig, RunConfig};
use ra_domain::error::Result;
use ra_domain::run_state::{CodeResult, RunState};
use ra_domain::tool::{Message, ToolDefinition};
use ra_engine::continuation::{decide, inject_tool_results, ContinuationPolicy, FinishReason, InjectionStrategy, LoopState};
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_providers::{ChatRequest, ProviderRegistry};
use ra_tools::registry::{invoke_tool, InvokePolicy, ToolRegistry};

const WRITER_SYSTEM_PROMPT: &str = "Write a thorough, well-organized report answering the user's \
request using only the evidence provided below. Cite every factual claim inline with its tag, \
e.g. [S1-2]. End the report with a \"Sources\" section listing each cited tag and its URL. If a \
chart would clarify the data, you may invoke the code-execution tool to produce one.";

fn map_finish_reason(reason: &Option<String>) -> FinishReason {
    match reason.as_deref() {
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        Some("length") | Some("max_tokens") => FinishReason::Length,
        _ => FinishReason::NaturalStop,
    }
}

pub struct WriterNode {
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
    aggregator_config: AggregatorConfig,
    tools: Arc<ToolRegistry>,
    code_tool_name: String,
}

impl WriterNode {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config: RunConfig,
        aggregator_config: AggregatorConfig,
        tools: Arc<ToolRegistry>,
        code_tool_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            config,
            aggregator_config,
            tools,
            code_tool_name: code_tool_name.into(),
        }
    }
}

#[async_trait]
impl Node for WriterNode {
    fn name(&self) -> &str {
        "writer"
    }

    async fn run(&self, state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
        let (provider, model) = crate::common::resolve_provider(&self.registry, &self.config.model)?;

        let agg_params = AggregatorParams {
            max_results_per_query: self.aggregator_config.max_results_per_query,
            content_similarity_threshold: self.aggregator_config.content_similarity_threshold,
            tier_1_threshold: self.aggregator_config.tier_1_threshold,
            tier_2_threshold: self.aggregator_config.tier_2_threshold,
        };
        let report = aggregate(&state.scraped_content, &agg_params);
        let projection = report.to_context(
            self.aggregator_config.context_max_tier1,
            self.aggregator_config.context_max_tier2,
            self.aggregator_config.context_max_tier3,
            self.aggregator_config.context_max_chars,
        );

        let allow_code = self.config.agent_profile.is_enabled("python");
        let tool_defs: Vec<ToolDefinition> = if allow_code {
            self.tools
                .get(&self.code_tool_name)
                .map(|t| {
                    vec![ToolDefinition {
                        name: t.name().to_string(),
                        description: t.description().to_string(),
                        parameters: t.parameters_schema(),
                    }]
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut messages = vec![
            Message::system(WRITER_SYSTEM_PROMPT),
            Message::user(format!(
                "Request: {}\n\n{}\n\nSources:\n{}",
                state.input, projection.evidence_block, projection.sources_table
            )),
        ];

        let policy = ContinuationPolicy {
            max_iterations: self.config.max_continuation_iterations,
            ..Default::default()
        };
        let mut call_count = state.tool_call_count;
        let mut code_results: Vec<CodeResult> = Vec::new();
        let mut draft = String::new();
        let mut iteration = 0u32;
        let mut errors = Vec::new();

        loop {
            iteration += 1;
            let response = provider
                .chat(ChatRequest {
                    messages: messages.clone(),
                    tools: tool_defs.clone(),
                    model: model.clone(),
                    ..Default::default()
                })
                .await?;

            messages.push(Message::assistant(response.content.clone()));
            draft = response.content.clone();

            let has_tool_calls = !response.tool_calls.is_empty();
            let mut any_failed = false;
            let mut results = Vec::new();
            for tc in &response.tool_calls {
                let invoked = invoke_tool(
                    &self.tools,
                    &tc.tool_name,
                    tc.arguments.clone(),
                    &mut call_count,
                    &InvokePolicy::default(),
                )
                .await?;
                any_failed |= !invoked.success;
                if tc.tool_name == self.code_tool_name {
                    code_results.push(CodeResult {
                        code: tc.arguments.get("code").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        output: if invoked.success {
                            invoked.output.clone()
                        } else {
                            invoked.error.clone().unwrap_or_default()
                        },
                        success: invoked.success,
                    });
                }
                if !invoked.success {
                    errors.push(format!("writer tool '{}' failed: {}", tc.tool_name, invoked.error.as_deref().unwrap_or("")));
                }
                results.push((tc.clone(), invoked));
            }

            let decision = decide(map_finish_reason(&response.finish_reason), has_tool_calls, any_failed, iteration, &policy);
            if !results.is_empty() {
                messages.extend(inject_tool_results(InjectionStrategy::ToolRole, &results));
            }
            if decision.next_state == LoopState::Stop {
                break;
            }
        }

        Ok(NodeOutput::Partial(PartialRunState {
            draft_report: Some(draft),
            code_results,
            tool_call_count_delta: call_count - state.tool_call_count,
            errors,
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_tool_calls_finish_reason() {
        assert_eq!(map_finish_reason(&Some("tool_calls".into())), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason(&Some("function_call".into())), FinishReason::ToolCalls);
    }

    #[test]
    fn maps_length_finish_reason() {
        assert_eq!(map_finish_reason(&Some("length".into())), FinishReason::Length);
        assert_eq!(map_finish_reason(&Some("max_tokens".into())), FinishReason::Length);
    }

    #[test]
    fn unrecognized_or_missing_finish_reason_is_natural_stop() {
        assert_eq!(map_finish_reason(&Some("stop".into())), FinishReason::NaturalStop);
        assert_eq!(map_finish_reason(&None), FinishReason::NaturalStop);
    }
}
