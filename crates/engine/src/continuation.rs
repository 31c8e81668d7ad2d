//! Auto-continuation loop (C4): the state machine that drives multi-turn
//! tool use for a single agent-style node, plus the tagged-markup tool
//! call parser and the three result-injection strategies.
//!
//! The imperative loop (LLM call → detect → execute → inject → repeat)
//! lives in the node that drives a specific provider and tool registry;
//! this module holds the pure, independently testable pieces: the
//! state-transition decision, the streaming-safe markup parser, and the
//! injection projections.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use ra_domain::tool::{Message, ToolCall};
use ra_domain::tool_result::ToolResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Calling,
    Detect,
    Execute,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    NaturalStop,
    Length,
    ToolCalls,
}

#[derive(Debug, Clone, Copy)]
pub struct ContinuationPolicy {
    pub continue_on_tool_calls: bool,
    pub continue_on_length: bool,
    pub stop_on_tool_failure: bool,
    pub max_iterations: u32,
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self {
            continue_on_tool_calls: true,
            continue_on_length: false,
            stop_on_tool_failure: false,
            max_iterations: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NaturalStop,
    LengthWithoutContinue,
    ToolFailure,
    MaxIterations,
}

#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub next_state: LoopState,
    pub stop_reason: Option<StopReason>,
}

/// Pure continuation decision: `(state, finish_reason, has_tool_calls,
/// tool_results, policy) -> next state`. Does not perform any I/O.
pub fn decide(
    finish_reason: FinishReason,
    has_tool_calls: bool,
    any_tool_failed: bool,
    iteration_count: u32,
    policy: &ContinuationPolicy,
) -> Decision {
    if iteration_count >= policy.max_iterations {
        return Decision {
            next_state: LoopState::Stop,
            stop_reason: Some(StopReason::MaxIterations),
        };
    }
    if has_tool_calls && any_tool_failed && policy.stop_on_tool_failure {
        return Decision {
            next_state: LoopState::Stop,
            stop_reason: Some(StopReason::ToolFailure),
        };
    }
    if has_tool_calls && policy.continue_on_tool_calls {
        return Decision {
            next_state: LoopState::Execute,
            stop_reason: None,
        };
    }
    match finish_reason {
        FinishReason::Length if policy.continue_on_length => Decision {
            next_state: LoopState::Calling,
            stop_reason: None,
        },
        FinishReason::Length => Decision {
            next_state: LoopState::Stop,
            stop_reason: Some(StopReason::LengthWithoutContinue),
        },
        _ => Decision {
            next_state: LoopState::Stop,
            stop_reason: Some(StopReason::NaturalStop),
        },
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tagged-markup tool call detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn invoke_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<invoke name="([^"]*)">"#).unwrap())
}

fn parameter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<parameter name="([^"]*)">(.*?)</parameter>"#).unwrap())
}

/// Infer a JSON value from a parameter's raw text: integer, float,
/// boolean, or string, in that order.
fn infer_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return Value::from(f);
    }
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(trimmed.to_string()),
    }
}

fn parse_invoke_block(block: &str, call_id: String) -> Option<ToolCall> {
    let tool_name = invoke_name_re().captures(block)?.get(1)?.as_str().to_string();
    let mut arguments = serde_json::Map::new();
    for caps in parameter_re().captures_iter(block) {
        let key = caps.get(1)?.as_str().to_string();
        let raw = caps.get(2)?.as_str();
        arguments.insert(key, infer_value(raw));
    }
    Some(ToolCall {
        call_id,
        tool_name,
        arguments: Value::Object(arguments),
    })
}

/// Streaming-safe parser for `<function_calls><invoke name="X">
/// <parameter name="k">v</parameter>…</invoke>…</function_calls>` blocks.
/// Feed it chunks as they arrive; completed `<invoke>…</invoke>` blocks
/// are extracted and drained from the buffer as soon as their closing
/// tag appears, without waiting for `</function_calls>`.
#[derive(Default)]
pub struct TaggedCallParser {
    buffer: String,
    next_id: u32,
}

impl TaggedCallParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of streamed assistant text. Returns any tool
    /// calls whose `<invoke>` block closed as a result.
    pub fn feed(&mut self, chunk: &str) -> Vec<ToolCall> {
        self.buffer.push_str(chunk);
        self.drain_complete_invokes()
    }

    fn drain_complete_invokes(&mut self) -> Vec<ToolCall> {
        let mut calls = Vec::new();
        loop {
            let Some(start) = self.buffer.find("<invoke ") else {
                break;
            };
            let Some(end_rel) = self.buffer[start..].find("</invoke>") else {
                break;
            };
            let end = start + end_rel + "</invoke>".len();
            let block = self.buffer[start..end].to_string();
            self.next_id += 1;
            if let Some(call) = parse_invoke_block(&block, format!("tagged-{}", self.next_id)) {
                calls.push(call);
            }
            self.buffer.replace_range(..end, "");
        }
        calls
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result injection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionStrategy {
    /// Native tool-role messages with `tool_call_id`.
    ToolRole,
    /// A single user-role message with `<tool_result>` blocks, for
    /// providers without a tool role.
    TaggedUser,
    /// Assistant-role acknowledgement text, for providers supporting
    /// neither (degraded mode).
    DegradedAssistant,
}

/// Project executed tool results back into the conversation per the
/// selected strategy. All three must yield semantically equivalent state
/// transitions (the `Execute → Calling` edge fires regardless).
pub fn inject_tool_results(strategy: InjectionStrategy, results: &[(ToolCall, ToolResult)]) -> Vec<Message> {
    match strategy {
        InjectionStrategy::ToolRole => results
            .iter()
            .map(|(tc, result)| {
                let content = if result.success {
                    result.output.clone()
                } else {
                    result.error.clone().unwrap_or_else(|| result.output.clone())
                };
                Message::tool_result(tc.call_id.clone(), content)
            })
            .collect(),
        InjectionStrategy::TaggedUser => {
            let mut body = String::new();
            for (tc, result) in results {
                if result.success {
                    body.push_str(&format!(
                        "<tool_result name=\"{}\"><output>{}</output></tool_result>\n",
                        tc.tool_name, result.output
                    ));
                } else {
                    body.push_str(&format!(
                        "<tool_result name=\"{}\"><error>{}</error></tool_result>\n",
                        tc.tool_name,
                        result.error.as_deref().unwrap_or("unknown error")
                    ));
                }
            }
            vec![Message::user(body)]
        }
        InjectionStrategy::DegradedAssistant => {
            let mut body = String::new();
            for (tc, result) in results {
                let summary = if result.success {
                    result.output.as_str()
                } else {
                    result.error.as_deref().unwrap_or("unknown error")
                };
                body.push_str(&format!("[tool {} result: {}]\n", tc.tool_name, summary));
            }
            vec![Message::assistant(body)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decide_continues_on_tool_calls_by_default() {
        let d = decide(FinishReason::ToolCalls, true, false, 1, &ContinuationPolicy::default());
        assert_eq!(d.next_state, LoopState::Execute);
        assert!(d.stop_reason.is_none());
    }

    #[test]
    fn decide_stops_on_natural_finish_without_tool_calls() {
        let d = decide(FinishReason::NaturalStop, false, false, 1, &ContinuationPolicy::default());
        assert_eq!(d.next_state, LoopState::Stop);
        assert_eq!(d.stop_reason, Some(StopReason::NaturalStop));
    }

    #[test]
    fn decide_stops_at_max_iterations_even_with_tool_calls() {
        let policy = ContinuationPolicy {
            max_iterations: 3,
            ..Default::default()
        };
        let d = decide(FinishReason::ToolCalls, true, false, 3, &policy);
        assert_eq!(d.stop_reason, Some(StopReason::MaxIterations));
    }

    #[test]
    fn decide_stops_on_tool_failure_when_configured() {
        let policy = ContinuationPolicy {
            stop_on_tool_failure: true,
            ..Default::default()
        };
        let d = decide(FinishReason::ToolCalls, true, true, 1, &policy);
        assert_eq!(d.stop_reason, Some(StopReason::ToolFailure));
    }

    #[test]
    fn decide_continues_on_length_when_policy_allows() {
        let policy = ContinuationPolicy {
            continue_on_length: true,
            ..Default::default()
        };
        let d = decide(FinishReason::Length, false, false, 1, &policy);
        assert_eq!(d.next_state, LoopState::Calling);
    }

    #[test]
    fn decide_stops_on_length_without_continue_policy() {
        let d = decide(FinishReason::Length, false, false, 1, &ContinuationPolicy::default());
        assert_eq!(d.stop_reason, Some(StopReason::LengthWithoutContinue));
    }

    #[test]
    fn tagged_parser_handles_scenario_s3_chunked_stream() {
        let mut parser = TaggedCallParser::new();
        let mut all_calls = Vec::new();
        all_calls.extend(parser.feed("Let me search.\n"));
        all_calls.extend(parser.feed(
            "<function_calls>\n<invoke name=\"search_web\">\n\
             <parameter name=\"query\">asyncio</parameter>\n\
             <parameter name=\"max_results\">3</parameter>\n\
             </invoke>\n</function_calls>\n",
        ));
        assert_eq!(all_calls.len(), 1);
        assert_eq!(all_calls[0].tool_name, "search_web");
        assert_eq!(all_calls[0].arguments["query"], "asyncio");
        assert_eq!(all_calls[0].arguments["max_results"], 3);
    }

    #[test]
    fn tagged_parser_splits_invoke_across_many_small_chunks() {
        let mut parser = TaggedCallParser::new();
        let full = "<invoke name=\"x\"><parameter name=\"a\">1</parameter></invoke>";
        let mut calls = Vec::new();
        for byte in full.as_bytes().chunks(3) {
            calls.extend(parser.feed(std::str::from_utf8(byte).unwrap()));
        }
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "x");
        assert_eq!(calls[0].arguments["a"], 1);
    }

    #[test]
    fn inject_tool_role_produces_one_message_per_result() {
        let tc = ToolCall {
            call_id: "c1".into(),
            tool_name: "search".into(),
            arguments: Value::Null,
        };
        let result = ToolResult::ok("done");
        let messages = inject_tool_results(InjectionStrategy::ToolRole, &[(tc, result)]);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0].role, ra_domain::tool::Role::Tool));
    }

    #[test]
    fn inject_tagged_user_wraps_in_tool_result_blocks() {
        let tc = ToolCall {
            call_id: "c1".into(),
            tool_name: "search".into(),
            arguments: Value::Null,
        };
        let result = ToolResult::ok("done");
        let messages = inject_tool_results(InjectionStrategy::TaggedUser, &[(tc, result)]);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].content.extract_all_text().contains("<tool_result name=\"search\">"));
    }

    #[test]
    fn inject_degraded_assistant_summarizes_failures() {
        let tc = ToolCall {
            call_id: "c1".into(),
            tool_name: "search".into(),
            arguments: Value::Null,
        };
        let result = ToolResult::err("timed out");
        let messages = inject_tool_results(InjectionStrategy::DegradedAssistant, &[(tc, result)]);
        assert!(messages[0].content.extract_all_text().contains("timed out"));
    }
}
