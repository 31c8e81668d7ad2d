//! Graph engine (C7): a typed state-machine runtime over [`RunState`].
//!
//! Nodes are pure `(&RunState) -> PartialRunState` (async, since most do
//! I/O). Partial states merge field-wise into the run state; list fields
//! named in the data model append-concat, `messages` additionally goes
//! through the context manager's cap (C5). Conditional edges are a pure
//! `(&RunState) -> Transition` selecting the next node, a fan-out batch,
//! an interrupt, or the end of the run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ra_context::ContextManager;
use ra_domain::config::ContextConfig;
use ra_domain::error::{Error, Result};
use ra_domain::run_state::{CodeResult, Evaluation, Route, RunState};
use ra_domain::search::ResultBag;
use ra_domain::tool::Message;

use crate::cancel::CancelMap;
use crate::checkpoint::Checkpointer;

/// A node's contribution to run state. Engine-merged; never mutates
/// `RunState` directly so nodes stay pure and independently testable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialRunState {
    pub route: Option<Route>,
    pub needs_clarification: Option<bool>,
    #[serde(default)]
    pub research_plan: Vec<String>,
    #[serde(default)]
    pub scraped_content: Vec<ResultBag>,
    pub draft_report: Option<String>,
    pub final_report: Option<String>,
    pub evaluation: Option<Evaluation>,
    pub revision_count: Option<u32>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub code_results: Vec<CodeResult>,
    pub is_complete: Option<bool>,
    pub is_cancelled: Option<bool>,
    #[serde(default)]
    pub tool_call_count_delta: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Field-wise merge of a `PartialRunState` into the durable `RunState`.
/// Scalars/options overwrite when present; list fields append-concat.
/// `messages` is appended here too — the engine caps it separately via
/// the context manager once the merge completes.
pub fn merge_into(state: &mut RunState, partial: PartialRunState) {
    if let Some(route) = partial.route {
        state.route = Some(route);
    }
    if let Some(v) = partial.needs_clarification {
        state.needs_clarification = v;
    }
    state.research_plan.extend(partial.research_plan);
    state.scraped_content.extend(partial.scraped_content);
    if let Some(v) = partial.draft_report {
        state.draft_report = v;
    }
    if let Some(v) = partial.final_report {
        state.final_report = v;
    }
    if let Some(v) = partial.evaluation {
        state.evaluation = Some(v);
    }
    if let Some(v) = partial.revision_count {
        state.revision_count = v;
    }
    state.messages.extend(partial.messages);
    state.code_results.extend(partial.code_results);
    if let Some(v) = partial.is_complete {
        state.is_complete = v;
    }
    if let Some(v) = partial.is_cancelled {
        state.is_cancelled = v;
    }
    state.tool_call_count += partial.tool_call_count_delta;
    state.errors.extend(partial.errors);
}

pub type NodeId = String;

/// What a node produced: either state to merge, or a request to suspend
/// the run and hand control back to the caller (human review).
pub enum NodeOutput {
    Partial(PartialRunState),
    Interrupt { payload: serde_json::Value },
}

/// A single schedulable unit of the graph.
#[async_trait]
pub trait Node: Send + Sync {
    fn name(&self) -> &str;

    /// Run the node. `task` carries the fan-out sub-state (e.g. one
    /// searcher's assigned query) for nodes invoked via `Transition::FanOut`;
    /// `None` for nodes invoked directly.
    async fn run(&self, state: &RunState, task: Option<&serde_json::Value>) -> Result<NodeOutput>;
}

/// What happens after a node completes.
pub enum Transition {
    Goto(NodeId),
    /// Run `node` once per entry in `tasks`, concurrently, bounded by
    /// `max_parallel` (0 = unbounded); merge all results, then continue
    /// at `join`.
    FanOut {
        node: NodeId,
        tasks: Vec<serde_json::Value>,
        join: NodeId,
        max_parallel: usize,
    },
    End,
}

pub type EdgeFn = Arc<dyn Fn(&RunState) -> Transition + Send + Sync>;

/// A suspended run, resumable with caller-supplied data.
pub struct InterruptHandle {
    pub run_id: String,
    pub thread_id: String,
    pub checkpoint_id: String,
    pub node: NodeId,
    pub payload: serde_json::Value,
}

pub enum EngineResult {
    Completed(RunState),
    Suspended(InterruptHandle),
    Cancelled(RunState),
}

/// Wires nodes and edges into a runnable graph, and drives execution.
pub struct GraphEngine {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, EdgeFn>,
    entry: NodeId,
    checkpointer: Arc<dyn Checkpointer>,
    cancel_map: Arc<CancelMap>,
    context: ContextManager,
    context_config: ContextConfig,
}

impl GraphEngine {
    pub fn new(
        entry: impl Into<NodeId>,
        checkpointer: Arc<dyn Checkpointer>,
        cancel_map: Arc<CancelMap>,
        context_config: ContextConfig,
    ) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: entry.into(),
            checkpointer,
            cancel_map,
            context: ContextManager::default(),
            context_config,
        }
    }

    pub fn add_node(&mut self, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.insert(node.name().to_string(), node);
        self
    }

    pub fn add_edge(&mut self, node_id: impl Into<NodeId>, edge: EdgeFn) -> &mut Self {
        self.edges.insert(node_id.into(), edge);
        self
    }

    /// Drive `state` to completion, suspension, or cancellation. `state`
    /// should already have its `run_id` populated; a cancel token is
    /// registered for that id and removed on exit.
    pub async fn run(&self, mut state: RunState, resume_at: Option<NodeId>) -> Result<EngineResult> {
        let run_id = state.run_id.clone();
        let thread_id = state.thread_id.clone();
        let cancel_token = self.cancel_map.register(&run_id);

        let mut current = resume_at.unwrap_or_else(|| self.entry.clone());
        let mut checkpoint_seq: u64 = 0;

        let result = loop {
            if cancel_token.is_cancelled() {
                state.is_cancelled = true;
                break EngineResult::Cancelled(state);
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| Error::Other(format!("unknown node: {current}")))?
                .clone();

            tracing::debug!(node = %current, run_id = %run_id, "node starting");
            let output = node.run(&state, None).await?;

            match output {
                NodeOutput::Interrupt { payload } => {
                    checkpoint_seq += 1;
                    let checkpoint_id = format!("{checkpoint_seq:06}-{current}");
                    self.checkpointer.save(&thread_id, &checkpoint_id, &state).await?;
                    self.cancel_map.remove(&run_id);
                    break EngineResult::Suspended(InterruptHandle {
                        run_id,
                        thread_id,
                        checkpoint_id,
                        node: current,
                        payload,
                    });
                }
                NodeOutput::Partial(partial) => {
                    self.apply(&mut state, partial);
                }
            }

            checkpoint_seq += 1;
            let checkpoint_id = format!("{checkpoint_seq:06}-{current}");
            self.checkpointer.save(&thread_id, &checkpoint_id, &state).await?;

            if state.is_cancelled {
                break EngineResult::Cancelled(state);
            }

            let Some(edge) = self.edges.get(&current) else {
                break EngineResult::Completed(state);
            };

            match edge(&state) {
                Transition::Goto(next) => current = next,
                Transition::End => break EngineResult::Completed(state),
                Transition::FanOut {
                    node: fan_node,
                    tasks,
                    join,
                    max_parallel,
                } => {
                    self.run_fan_out(&fan_node, &tasks, max_parallel, &mut state).await?;
                    checkpoint_seq += 1;
                    let checkpoint_id = format!("{checkpoint_seq:06}-{fan_node}-join");
                    self.checkpointer.save(&thread_id, &checkpoint_id, &state).await?;
                    current = join;
                }
            }
        };

        self.cancel_map.remove(&run_id);
        Ok(result)
    }

    /// Run `node` once per task concurrently (bounded by `max_parallel`),
    /// merging every result into `state` in task order (O1: order of
    /// completion is irrelevant, only order of merge for determinism).
    async fn run_fan_out(
        &self,
        node_id: &str,
        tasks: &[serde_json::Value],
        max_parallel: usize,
        state: &mut RunState,
    ) -> Result<()> {
        let node = self
            .nodes
            .get(node_id)
            .ok_or_else(|| Error::Other(format!("unknown fan-out node: {node_id}")))?
            .clone();

        let limit = if max_parallel == 0 { tasks.len().max(1) } else { max_parallel };
        let mut results: Vec<Option<PartialRunState>> = Vec::with_capacity(tasks.len());
        for chunk in tasks.chunks(limit.max(1)) {
            let snapshot = state.clone();
            let futures = chunk.iter().map(|task| {
                let node = node.clone();
                let snapshot = &snapshot;
                async move { node.run(snapshot, Some(task)).await }
            });
            let outcomes = futures_util::future::join_all(futures).await;
            for outcome in outcomes {
                match outcome? {
                    NodeOutput::Partial(p) => results.push(Some(p)),
                    NodeOutput::Interrupt { .. } => {
                        return Err(Error::Other(format!(
                            "node {node_id} requested an interrupt from inside a fan-out, which is not supported"
                        )));
                    }
                }
            }
        }

        for partial in results.into_iter().flatten() {
            self.apply(state, partial);
        }
        Ok(())
    }

    fn apply(&self, state: &mut RunState, partial: PartialRunState) {
        let had_new_messages = !partial.messages.is_empty();
        merge_into(state, partial);
        if had_new_messages {
            state.messages = self.context.truncate_messages(&state.messages, &self.context_config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointer;
    use ra_domain::config::TruncationStrategy;

    struct Echo(&'static str, NodeId);

    #[async_trait]
    impl Node for Echo {
        fn name(&self) -> &str {
            self.1.as_str()
        }
        async fn run(&self, _state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
            Ok(NodeOutput::Partial(PartialRunState {
                draft_report: Some(self.0.to_string()),
                ..Default::default()
            }))
        }
    }

    fn ctx_config() -> ContextConfig {
        ContextConfig {
            max_tokens: 10_000,
            reserve_tokens: 0,
            keep_system_messages: 1,
            keep_recent_messages: 10,
            strategy: TruncationStrategy::Smart,
            min_message_tokens: 0,
            truncate_ratio: 0.9,
        }
    }

    fn engine(entry: &str) -> GraphEngine {
        GraphEngine::new(
            entry,
            Arc::new(InMemoryCheckpointer::new()),
            Arc::new(CancelMap::new()),
            ctx_config(),
        )
    }

    #[tokio::test]
    async fn runs_linear_graph_to_completion() {
        let mut eng = engine("a");
        eng.add_node(Arc::new(Echo("first", "a".into())));
        eng.add_node(Arc::new(Echo("second", "b".into())));
        eng.add_edge("a", Arc::new(|_s: &RunState| Transition::Goto("b".into())));
        eng.add_edge("b", Arc::new(|_s: &RunState| Transition::End));

        let state = RunState::new("run-1", "thread-1", "hi");
        match eng.run(state, None).await.unwrap() {
            EngineResult::Completed(s) => assert_eq!(s.draft_report, "second"),
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn missing_edge_ends_the_run() {
        let mut eng = engine("a");
        eng.add_node(Arc::new(Echo("only", "a".into())));
        let state = RunState::new("run-2", "thread-2", "hi");
        match eng.run(state, None).await.unwrap() {
            EngineResult::Completed(s) => assert_eq!(s.draft_report, "only"),
            _ => panic!("expected completion"),
        }
    }

    struct Interrupter;

    #[async_trait]
    impl Node for Interrupter {
        fn name(&self) -> &str {
            "interrupter"
        }
        async fn run(&self, _state: &RunState, _task: Option<&serde_json::Value>) -> Result<NodeOutput> {
            Ok(NodeOutput::Interrupt {
                payload: serde_json::json!({"question": "ok?"}),
            })
        }
    }

    #[tokio::test]
    async fn interrupt_suspends_and_persists_checkpoint() {
        let mut eng = engine("interrupter");
        eng.add_node(Arc::new(Interrupter));
        let state = RunState::new("run-3", "thread-3", "hi");
        match eng.run(state, None).await.unwrap() {
            EngineResult::Suspended(handle) => {
                assert_eq!(handle.node, "interrupter");
                assert_eq!(handle.payload["question"], "ok?");
            }
            _ => panic!("expected suspension"),
        }
    }

    struct Fanned;

    #[async_trait]
    impl Node for Fanned {
        fn name(&self) -> &str {
            "fanned"
        }
        async fn run(&self, _state: &RunState, task: Option<&serde_json::Value>) -> Result<NodeOutput> {
            let q = task.and_then(|t| t.as_str()).unwrap_or("?");
            Ok(NodeOutput::Partial(PartialRunState {
                errors: vec![format!("saw:{q}")],
                ..Default::default()
            }))
        }
    }

    #[tokio::test]
    async fn fan_out_merges_all_results_before_join() {
        let mut eng = engine("start");
        eng.add_node(Arc::new(Echo("go", "start".into())));
        eng.add_node(Arc::new(Fanned));
        eng.add_node(Arc::new(Echo("done", "join".into())));
        eng.add_edge(
            "start",
            Arc::new(|_s: &RunState| Transition::FanOut {
                node: "fanned".into(),
                tasks: vec![serde_json::json!("q1"), serde_json::json!("q2")],
                join: "join".into(),
                max_parallel: 0,
            }),
        );
        eng.add_edge("join", Arc::new(|_s: &RunState| Transition::End));

        let state = RunState::new("run-4", "thread-4", "hi");
        match eng.run(state, None).await.unwrap() {
            EngineResult::Completed(s) => {
                assert_eq!(s.errors.len(), 2);
                assert!(s.errors.contains(&"saw:q1".to_string()));
                assert!(s.errors.contains(&"saw:q2".to_string()));
            }
            _ => panic!("expected completion"),
        }
    }
}
