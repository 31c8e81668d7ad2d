//! Drives one research-agent run to completion (or suspension) against the
//! shared [`AppState`] services. The single entry point both the CLI `run`
//! subcommand and trigger firings go through.

use std::sync::Arc;

use uuid::Uuid;

use ra_domain::run_state::RunState;
use ra_engine::graph::EngineResult;

use crate::state::AppState;

/// Outcome of one run, flattened for callers that don't care about the
/// full [`EngineResult`]/[`RunState`] machinery.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { report: String },
    Suspended { node: String, payload: serde_json::Value },
    Cancelled,
}

/// Run the research-agent graph once against `input`, returning the final
/// report or the reason the run didn't reach one.
pub async fn execute_run(
    state: &AppState,
    thread_id: impl Into<String>,
    input: impl Into<String>,
) -> anyhow::Result<RunOutcome> {
    let run_id = Uuid::new_v4().to_string();
    let run_state = RunState::new(run_id, thread_id.into(), input.into());

    let engine = ra_nodes::build_graph(
        state.llm.clone(),
        state.config.run.clone(),
        state.config.aggregator.clone(),
        state.cache.clone(),
        state.tools.clone(),
        state.cancel_map.clone(),
        state.checkpointer.clone(),
        state.config.context.clone(),
        state.tool_names.search.clone(),
        state.tool_names.code.clone(),
    );

    let run_span = tracing::info_span!("run", run_id = %run_state.run_id, thread_id = %run_state.thread_id);
    let result = tracing::Instrument::instrument(engine.run(run_state, None), run_span).await?;

    Ok(match result {
        EngineResult::Completed(s) => RunOutcome::Completed { report: s.final_report },
        EngineResult::Suspended(handle) => {
            RunOutcome::Suspended { node: handle.node, payload: handle.payload }
        }
        EngineResult::Cancelled(_) => RunOutcome::Cancelled,
    })
}

/// Spawn a run in the background, logging the outcome rather than
/// returning it. Used by the trigger scheduler, where nothing is blocked
/// on the run's completion.
pub fn spawn_run(
    state: Arc<AppState>,
    thread_id: String,
    input: String,
    on_done: impl FnOnce(anyhow::Result<RunOutcome>) + Send + 'static,
) {
    tokio::spawn(async move {
        let outcome = execute_run(&state, thread_id, input).await;
        on_done(outcome);
    });
}
