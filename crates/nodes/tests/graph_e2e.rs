//! End-to-end graph tests driving the full node set against a scripted
//! [`FakeLlmProvider`] and seeded search tools, no real model or network
//! involved. Covers the direct-answer route (S1), a deep-research run with
//! one evaluator-triggered revision (S2, the scenario that would have
//! caught an inverted evaluator edge), and cancellation mid fan-out (S6).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use ra_domain::config::{AggregatorConfig, ContextConfig, RunConfig, SearchMode};
use ra_domain::run_state::{Route, RunState};
use ra_domain::search::SearchHit;
use ra_domain::tool_result::ToolResult;
use ra_cache::SearchCache;
use ra_engine::cancel::CancelMap;
use ra_engine::checkpoint::{Checkpointer, InMemoryCheckpointer};
use ra_engine::graph::EngineResult;
use ra_nodes::build_graph;
use ra_providers::{FakeLlmProvider, LlmProvider, ProviderRegistry};
use ra_tools::registry::{Tool, ToolInvokeError, ToolRegistry};

fn fake_registry(fake: Arc<FakeLlmProvider>) -> Arc<ProviderRegistry> {
    let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
    providers.insert("fake".to_string(), fake as Arc<dyn LlmProvider>);
    Arc::new(ProviderRegistry::from_providers(providers))
}

fn run_config(mode: &str) -> RunConfig {
    RunConfig {
        model: "fake/fake-model".into(),
        reasoning_model: "fake/fake-model".into(),
        search_mode: SearchMode::Named(mode.into()),
        ..Default::default()
    }
}

fn hit(url: &str) -> SearchHit {
    SearchHit {
        url: url.into(),
        score: 0.9,
        ..Default::default()
    }
}

/// Returns the same seeded hits for every query, ignoring the query itself.
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

/// Like [`SeededSearch`], but sleeps before answering, to give a
/// cancellation time to land while the fan-out is in flight.
struct SlowSearch(Vec<SearchHit>, Duration);

#[async_trait]
impl Tool for SlowSearch {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "slow seeded search"
    }
    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    async fn invoke(&self, _args: Value) -> std::result::Result<ToolResult, ToolInvokeError> {
        tokio::time::sleep(self.1).await;
        Ok(ToolResult::from_value(self.0.clone()))
    }
}

#[tokio::test]
async fn s1_direct_answer_skips_research_entirely() {
    let fake = Arc::new(FakeLlmProvider::new());
    fake.push("direct_answer", "The answer is 4.");

    let engine = build_graph(
        fake_registry(fake),
        run_config("direct"),
        AggregatorConfig::default(),
        Arc::new(SearchCache::new(100, 3600, 0.85)),
        Arc::new(ToolRegistry::new()),
        Arc::new(CancelMap::new()),
        Arc::new(InMemoryCheckpointer::new()) as Arc<dyn Checkpointer>,
        ContextConfig::default(),
        "web_search",
        "python_exec",
    );

    let state = RunState::new("run-s1", "thread-s1", "What is 2+2?");
    match engine.run(state, None).await.unwrap() {
        EngineResult::Completed(s) => {
            assert_eq!(s.route, Some(Route::Direct));
            assert!(s.research_plan.is_empty());
            assert!(s.scraped_content.is_empty());
            assert!(s.is_complete);
            assert!(s.final_report.contains('4'));
        }
        _ => panic!("expected the direct-answer route to complete"),
    }
}

#[tokio::test]
async fn s2_deep_research_revises_once_then_completes() {
    let fake = Arc::new(FakeLlmProvider::new());
    fake.push("planner", r#"{"queries":["lithium supply","lithium demand","lithium recycling"]}"#);
    fake.push("writer", "Draft citing [S1-1]. Sources:\n[S1-1] https://a.com");
    fake.push(
        "evaluator",
        r#"{"verdict":"revise","dimensions":{"coverage":0.5,"accuracy":0.5,"freshness":0.5,"coherence":0.5},
        "feedback":"missing pricing data","missing_topics":["lithium pricing"],"suggested_queries":["lithium price trend"]}"#,
    );
    fake.push("writer", "Final report citing [S1-1] and [S4-1]. Sources:\n[S1-1] https://a.com\n[S4-1] https://d.com");
    fake.push(
        "evaluator",
        r#"{"verdict":"pass","dimensions":{"coverage":0.9,"accuracy":0.9,"freshness":0.9,"coherence":0.9},
        "feedback":"solid","missing_topics":[],"suggested_queries":[]}"#,
    );

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(SeededSearch(vec![hit("https://a.com")])), vec![]).unwrap();

    let engine = build_graph(
        fake_registry(fake),
        run_config("deep"),
        AggregatorConfig::default(),
        Arc::new(SearchCache::new(100, 3600, 0.85)),
        tools,
        Arc::new(CancelMap::new()),
        Arc::new(InMemoryCheckpointer::new()) as Arc<dyn Checkpointer>,
        ContextConfig::default(),
        "web_search",
        "python_exec",
    );

    let state = RunState::new("run-s2", "thread-s2", "How is the lithium market trending?");
    match engine.run(state, None).await.unwrap() {
        EngineResult::Completed(s) => {
            assert_eq!(s.route, Some(Route::Deep));
            assert_eq!(s.revision_count, 1);
            assert_eq!(s.research_plan.len(), 4);
            assert_eq!(s.scraped_content.len(), 4);
            assert!(s.is_complete);
            assert!(s.final_report.contains("[S1-1]"));
            assert!(s.final_report.contains("[S4-1]"));
            assert!(s.final_report.contains("Sources"));
        }
        _ => panic!("expected the deep-research run to complete after one revision"),
    }
}

#[tokio::test]
async fn s6_cancellation_mid_fan_out_stops_before_writer() {
    let fake = Arc::new(FakeLlmProvider::new());
    fake.push("planner", r#"{"queries":["q1","q2","q3","q4"]}"#);

    let tools = Arc::new(ToolRegistry::new());
    tools
        .register(Arc::new(SlowSearch(vec![hit("https://a.com")], Duration::from_millis(150))), vec![])
        .unwrap();

    let cancel_map = Arc::new(CancelMap::new());
    let engine = build_graph(
        fake_registry(fake),
        run_config("deep"),
        AggregatorConfig::default(),
        Arc::new(SearchCache::new(100, 3600, 0.85)),
        tools,
        cancel_map.clone(),
        Arc::new(InMemoryCheckpointer::new()) as Arc<dyn Checkpointer>,
        ContextConfig::default(),
        "web_search",
        "python_exec",
    );

    let state = RunState::new("run-s6", "thread-s6", "research something broad");
    let run_id = state.run_id.clone();

    let (result, _) = tokio::join!(engine.run(state, None), async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel_map.cancel(&run_id);
    });

    match result.unwrap() {
        EngineResult::Cancelled(s) => {
            assert!(s.is_cancelled);
            assert_eq!(s.scraped_content.len(), 4);
            assert!(s.draft_report.is_empty());
            assert!(s.evaluation.is_none());
        }
        _ => panic!("expected the run to be cancelled mid-fan-out"),
    }
}
