//! Searcher node (fan-out sub-node): resolves one dispatched query against
//! the cache, falling back to the search tool on a miss.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use ra_cache::SearchCache;
use ra_domain::error::{Error, Result};
use ra_domain::run_state::RunState;
use ra_domain::search::{ResultBag, SearchHit};
use ra_engine::cancel::CancelMap;
use ra_engine::graph::{Node, NodeOutput, PartialRunState};
use ra_tools::registry::{invoke_tool, InvokePolicy, ToolRegistry};

/// Candidate hits requested per query before C2's aggregator tiers and caps them.
const SEARCH_FETCH_SIZE: u32 = 10;

pub struct SearcherNode {
    cache: Arc<SearchCache>,
    tools: Arc<ToolRegistry>,
    cancel_map: Arc<CancelMap>,
    search_tool_name: String,
    invoke_policy: InvokePolicy,
}

impl SearcherNode {
    pub fn new(
        cache: Arc<SearchCache>,
        tools: Arc<ToolRegistry>,
        cancel_map: Arc<CancelMap>,
        search_tool_name: impl Into<String>,
        invoke_policy: InvokePolicy,
    ) -> Self {
        Self {
            cache,
            tools,
            cancel_map,
            search_tool_name: search_tool_name.into(),
            invoke_policy,
        }
    }

    fn empty_bag(query: String, cancelled: bool) -> NodeOutput {
        NodeOutput::Partial(PartialRunState {
            scraped_content: vec![ResultBag {
                query,
                timestamp: Utc::now().timestamp(),
                cached: false,
                results: Vec::new(),
            }],
            is_cancelled: if cancelled { Some(true) } else { None },
            ..Default::default()
        })
    }
}

#[async_trait]
impl Node for SearcherNode {
    fn name(&self) -> &str {
        "searcher"
    }

    async fn run(&self, state: &RunState, task: Option<&Value>) -> Result<NodeOutput> {
        let query = task
            .and_then(|t| t.get("query"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Other("searcher invoked without a query task".into()))?
            .to_string();

        // Every fan-out task must return exactly one bag, even a cancelled
        // or empty one: downstream logic infers how many queries have
        // already been dispatched from `scraped_content.len()`.
        if self.cancel_map.get(&state.run_id).map(|t| t.is_cancelled()).unwrap_or(false) {
            return Ok(Self::empty_bag(query, true));
        }

        if let Some(hits) = self.cache.get(&query) {
            return Ok(NodeOutput::Partial(PartialRunState {
                scraped_content: vec![ResultBag {
                    query,
                    timestamp: Utc::now().timestamp(),
                    cached: true,
                    results: hits,
                }],
                ..Default::default()
            }));
        }
        if let Some((_, hits)) = self.cache.get_fuzzy(&query) {
            return Ok(NodeOutput::Partial(PartialRunState {
                scraped_content: vec![ResultBag {
                    query,
                    timestamp: Utc::now().timestamp(),
                    cached: true,
                    results: hits,
                }],
                ..Default::default()
            }));
        }

        let mut call_count = state.tool_call_count;
        let result = invoke_tool(
            &self.tools,
            &self.search_tool_name,
            serde_json::json!({"query": query, "max_results": SEARCH_FETCH_SIZE}),
            &mut call_count,
            &self.invoke_policy,
        )
        .await?;
        let tool_call_count_delta = call_count - state.tool_call_count;

        let mut errors = Vec::new();
        let hits: Vec<SearchHit> = if result.success {
            serde_json::from_str(&result.output).unwrap_or_else(|e| {
                errors.push(format!("search tool returned unparseable results for '{query}': {e}"));
                Vec::new()
            })
        } else {
            errors.push(format!(
                "search failed for '{query}': {}",
                result.error.as_deref().unwrap_or("unknown error")
            ));
            Vec::new()
        };

        self.cache.set(&query, hits.clone());

        Ok(NodeOutput::Partial(PartialRunState {
            scraped_content: vec![ResultBag {
                query,
                timestamp: Utc::now().timestamp(),
                cached: false,
                results: hits,
            }],
            tool_call_count_delta,
            errors,
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::run_state::RunState;
    use ra_tools::registry::{Tool, ToolInvokeError};
    use ra_domain::tool_result::ToolResult;

    struct SeededSearch(Vec<SearchHit>);

    #[async_trait]
    impl Tool for SeededSearch {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "seeded search"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(&self, _args: Value) -> std::result::Result<ToolResult, ToolInvokeError> {
            Ok(ToolResult::from_value(self.0.clone()))
        }
    }

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            url: url.into(),
            score: 0.8,
            ..Default::default()
        }
    }

    fn node_with_seeded_results(hits: Vec<SearchHit>) -> SearcherNode {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(Arc::new(SeededSearch(hits)), vec![]).unwrap();
        SearcherNode::new(
            Arc::new(SearchCache::new(100, 3600, 0.85)),
            tools,
            Arc::new(CancelMap::new()),
            "web_search",
            InvokePolicy::default(),
        )
    }

    #[tokio::test]
    async fn cache_miss_invokes_tool_and_populates_cache() {
        let node = node_with_seeded_results(vec![hit("https://a.com")]);
        let state = RunState::new("r1", "t1", "query");
        let output = node.run(&state, Some(&serde_json::json!({"query": "some query"}))).await.unwrap();
        let NodeOutput::Partial(partial) = output else { panic!("expected partial") };
        assert_eq!(partial.scraped_content.len(), 1);
        assert_eq!(partial.scraped_content[0].results.len(), 1);
        assert!(!partial.scraped_content[0].cached);
        assert_eq!(partial.tool_call_count_delta, 1);
    }

    #[tokio::test]
    async fn cache_hit_skips_tool_and_marks_cached() {
        let node = node_with_seeded_results(vec![hit("https://a.com")]);
        node.cache.set("repeat query", vec![hit("https://cached.com")]);
        let state = RunState::new("r1", "t1", "query");
        let output = node.run(&state, Some(&serde_json::json!({"query": "repeat query"}))).await.unwrap();
        let NodeOutput::Partial(partial) = output else { panic!("expected partial") };
        assert!(partial.scraped_content[0].cached);
        assert_eq!(partial.tool_call_count_delta, 0);
    }

    #[tokio::test]
    async fn cancelled_run_returns_empty_bag_preserving_dispatch_count() {
        let node = node_with_seeded_results(vec![hit("https://a.com")]);
        let token = node.cancel_map.register("r1");
        token.cancel();
        let state = RunState::new("r1", "t1", "query");
        let output = node.run(&state, Some(&serde_json::json!({"query": "anything"}))).await.unwrap();
        let NodeOutput::Partial(partial) = output else { panic!("expected partial") };
        assert_eq!(partial.scraped_content.len(), 1);
        assert!(partial.scraped_content[0].results.is_empty());
        assert_eq!(partial.is_cancelled, Some(true));
    }

    #[tokio::test]
    async fn missing_query_task_is_an_error() {
        let node = node_with_seeded_results(vec![]);
        let state = RunState::new("r1", "t1", "query");
        let result = node.run(&state, None).await;
        assert!(result.is_err());
    }
}
