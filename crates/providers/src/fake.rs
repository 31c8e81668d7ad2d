//! In-memory fake [`LlmProvider`] for graph end-to-end tests (C8).
//!
//! No persistence, no network: callers script a response queue per node
//! and the fake consumes one entry per call, matching the node by its
//! system prompt. Used alongside [`crate::registry::ProviderRegistry`]'s
//! test constructor and the `ra_nodes` fan-out/searcher fixtures to drive
//! the whole graph without a real model or search backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use ra_domain::capability::{LlmCapabilities, ToolSupport};
use ra_domain::error::{Error, Result};
use ra_domain::stream::{BoxStream, StreamEvent};
use ra_domain::tool::Role;

use crate::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};

/// Classify a request by its system prompt so a single fake instance can
/// script independent response sequences per graph node. Each arm matches
/// a unique prefix of that node's system prompt constant.
fn node_key(req: &ChatRequest) -> &'static str {
    let system = req
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .and_then(|m| m.content.text())
        .unwrap_or("");

    if system.starts_with("You classify") {
        "router"
    } else if system.starts_with("Decide whether") {
        "clarifier"
    } else if system.starts_with("Answer the user's request directly") {
        "direct_answer"
    } else if system.starts_with("Break the user's request") {
        "planner"
    } else if system.starts_with("Write a thorough") {
        "writer"
    } else if system.starts_with("Evaluate the draft") {
        "evaluator"
    } else if system.starts_with("The research so far") {
        "refine_plan"
    } else if system.starts_with("Rewrite the draft report") {
        "reviser"
    } else {
        "unknown"
    }
}

/// A scripted stand-in for a real provider. Tests enqueue one response
/// body per expected call via [`FakeLlmProvider::push`]; `chat` consumes
/// the queue for the calling node in FIFO order.
#[derive(Default)]
pub struct FakeLlmProvider {
    scripts: Mutex<HashMap<&'static str, VecDeque<String>>>,
}

impl FakeLlmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue the next response body a given node's call should receive.
    /// Plain prose for nodes that read `response.content` directly
    /// (`direct_answer`, `writer`, `reviser`); a JSON string for nodes
    /// that go through `call_structured` (`router`, `clarifier`,
    /// `planner`, `evaluator`, `refine_plan`).
    pub fn push(&self, node: &'static str, content: impl Into<String>) -> &Self {
        self.scripts.lock().unwrap().entry(node).or_default().push_back(content.into());
        self
    }
}

#[async_trait]
impl LlmProvider for FakeLlmProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let key = node_key(&req);
        let content = self.scripts.lock().unwrap().get_mut(key).and_then(|q| q.pop_front()).ok_or_else(|| {
            Error::Provider {
                provider: "fake".into(),
                message: format!("no scripted response left for node '{key}'"),
            }
        })?;

        Ok(ChatResponse {
            content,
            tool_calls: Vec::new(),
            usage: None,
            model: "fake".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        Err(Error::Provider {
            provider: "fake".into(),
            message: "fake provider does not support streaming".into(),
        })
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        Err(Error::Provider {
            provider: "fake".into(),
            message: "fake provider does not support embeddings".into(),
        })
    }

    fn capabilities(&self) -> &LlmCapabilities {
        static CAPS: LlmCapabilities = LlmCapabilities {
            supports_tools: ToolSupport::Basic,
            supports_streaming: false,
            supports_json_mode: true,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        };
        &CAPS
    }

    fn provider_id(&self) -> &str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::tool::Message;

    #[tokio::test]
    async fn routes_by_system_prompt_and_consumes_in_order() {
        let fake = FakeLlmProvider::new();
        fake.push("router", r#"{"route":"direct","confidence":0.9}"#);
        fake.push("router", r#"{"route":"deep","confidence":0.9}"#);

        let req = ChatRequest {
            messages: vec![Message::system("You classify a user's request..."), Message::user("hi")],
            ..Default::default()
        };
        let first = fake.chat(req.clone()).await.unwrap();
        assert!(first.content.contains("direct"));
        let second = fake.chat(req).await.unwrap();
        assert!(second.content.contains("deep"));
    }

    #[tokio::test]
    async fn exhausted_queue_is_an_error() {
        let fake = FakeLlmProvider::new();
        let req = ChatRequest {
            messages: vec![Message::system("Write a thorough report"), Message::user("hi")],
            ..Default::default()
        };
        assert!(fake.chat(req).await.is_err());
    }
}
