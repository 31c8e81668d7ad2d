//! Research-agent node set (C8): the LLM- and tool-calling nodes wired
//! into a `GraphEngine` by [`build_graph`].

mod common;

pub mod clarifier;
pub mod direct_answer;
pub mod evaluator;
pub mod human_review;
pub mod planner;
pub mod refine_plan;
pub mod reviser;
pub mod router;
pub mod searcher;
pub mod writer;

use std::sync::Arc;

use ra_cache::{QueryDeduplicator, SearchCache};
use ra_domain::config::{AggregatorConfig, ContextConfig, RunConfig};
use ra_domain::run_state::{Route, RunState, Verdict};
use ra_engine::cancel::CancelMap;
use ra_engine::checkpoint::Checkpointer;
use ra_engine::graph::{GraphEngine, Transition};
use ra_providers::ProviderRegistry;
use ra_tools::registry::{InvokePolicy, ToolRegistry};

use clarifier::ClarifierNode;
use direct_answer::DirectAnswerNode;
use evaluator::EvaluatorNode;
use human_review::HumanReviewNode;
use planner::PlannerNode;
use refine_plan::RefinePlanNode;
use reviser::ReviserNode;
use router::RouterNode;
use searcher::SearcherNode;
use writer::WriterNode;

/// Similarity threshold for deduping the dispatched research plan against
/// itself before fanning out to the searcher.
const PLAN_DEDUP_THRESHOLD: f64 = 0.85;

/// How many dispatched queries have already been searched. `refine_plan`
/// appends new queries onto `research_plan`; everything past this offset
/// hasn't been searched yet and becomes the next fan-out's task list.
fn dispatched_count(state: &RunState) -> usize {
    state.scraped_content.len()
}

/// Assemble the full research-agent graph: router/clarifier/direct-answer
/// for routing, planner/searcher for research, writer/evaluator/refine_plan
/// /reviser for the draft-and-critique loop, and human_review as the single
/// terminal node every route funnels into.
#[allow(clippy::too_many_arguments)]
pub fn build_graph(
    registry: Arc<ProviderRegistry>,
    config: RunConfig,
    aggregator_config: AggregatorConfig,
    cache: Arc<SearchCache>,
    tools: Arc<ToolRegistry>,
    cancel_map: Arc<CancelMap>,
    checkpointer: Arc<dyn Checkpointer>,
    context_config: ContextConfig,
    search_tool_name: impl Into<String>,
    code_tool_name: impl Into<String>,
) -> GraphEngine {
    let search_tool_name = search_tool_name.into();
    let code_tool_name = code_tool_name.into();
    let search_invoke_policy = InvokePolicy {
        call_budget: config.tool_call_limit,
        retry: config.tool_retry,
        max_attempts: config.tool_retry_max_attempts,
        backoff_secs: config.tool_retry_backoff,
    };

    let mut engine = GraphEngine::new("router", checkpointer, cancel_map.clone(), context_config);

    engine
        .add_node(Arc::new(RouterNode::new(registry.clone(), config.clone())))
        .add_node(Arc::new(ClarifierNode::new(registry.clone(), config.clone())))
        .add_node(Arc::new(DirectAnswerNode::new(registry.clone(), config.clone())))
        .add_node(Arc::new(PlannerNode::new(registry.clone(), config.clone())))
        .add_node(Arc::new(SearcherNode::new(
            cache,
            tools.clone(),
            cancel_map,
            search_tool_name,
            search_invoke_policy,
        )))
        .add_node(Arc::new(WriterNode::new(
            registry.clone(),
            config.clone(),
            aggregator_config.clone(),
            tools,
            code_tool_name,
        )))
        .add_node(Arc::new(EvaluatorNode::new(registry.clone(), config.clone(), aggregator_config)))
        .add_node(Arc::new(RefinePlanNode::new(registry.clone(), config.clone())))
        .add_node(Arc::new(ReviserNode::new(registry, config.clone())))
        .add_node(Arc::new(HumanReviewNode::new(config.clone())));

    engine.add_edge(
        "router",
        Arc::new(|s: &RunState| match s.route {
            Some(Route::Direct) => Transition::Goto("direct_answer".into()),
            Some(Route::Clarify) => Transition::Goto("clarifier".into()),
            _ => Transition::Goto("planner".into()),
        }),
    );

    engine.add_edge(
        "clarifier",
        Arc::new(|s: &RunState| {
            if s.needs_clarification {
                Transition::Goto("human_review".into())
            } else {
                Transition::Goto("planner".into())
            }
        }),
    );

    engine.add_edge("direct_answer", Arc::new(|_s: &RunState| Transition::Goto("human_review".into())));

    engine.add_edge(
        "planner",
        Arc::new(|s: &RunState| {
            let deduper = QueryDeduplicator::new(PLAN_DEDUP_THRESHOLD);
            let (unique, _duplicates) = deduper.dedupe(&s.research_plan);
            let tasks = unique.into_iter().map(|q| serde_json::json!({"query": q})).collect();
            Transition::FanOut {
                node: "searcher".into(),
                tasks,
                join: "writer".into(),
                max_parallel: 0,
            }
        }),
    );

    engine.add_edge(
        "writer",
        Arc::new(|s: &RunState| match s.route {
            Some(Route::Web) => Transition::Goto("human_review".into()),
            _ => Transition::Goto("evaluator".into()),
        }),
    );

    engine.add_edge(
        "evaluator",
        Arc::new(|s: &RunState| {
            if s.revision_count >= s.max_revisions {
                return Transition::Goto("human_review".into());
            }
            match s.evaluation.as_ref().map(|e| e.verdict) {
                Some(Verdict::Revise) => Transition::Goto("refine_plan".into()),
                Some(Verdict::Incomplete) => Transition::Goto("reviser".into()),
                _ => Transition::Goto("human_review".into()),
            }
        }),
    );

    engine.add_edge(
        "refine_plan",
        Arc::new(|s: &RunState| {
            let new_tasks: Vec<serde_json::Value> = s.research_plan[dispatched_count(s).min(s.research_plan.len())..]
                .iter()
                .map(|q| serde_json::json!({"query": q}))
                .collect();
            if new_tasks.is_empty() {
                return Transition::Goto("writer".into());
            }
            Transition::FanOut {
                node: "searcher".into(),
                tasks: new_tasks,
                join: "writer".into(),
                max_parallel: 0,
            }
        }),
    );

    engine.add_edge("reviser", Arc::new(|_s: &RunState| Transition::Goto("evaluator".into())));

    engine
}
