//! Scheduled-trigger sleep loop, run as its own `tokio::spawn`'d task
//! alongside the HTTP server — mirrors the teacher's one-task-per-concern
//! convention for run execution (see `run_driver::execute_run`'s own
//! `tracing::info_span!`-wrapped spawn).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use ra_domain::trigger::{ExecutionStatus, Trigger};

use crate::runtime::run_driver::{execute_run, RunOutcome};
use crate::state::AppState;

const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Poll the trigger manager's scheduled executor every [`TICK_INTERVAL`]
/// and fire any schedules that have come due. Runs forever; intended to be
/// `tokio::spawn`'d once at startup.
pub async fn run_scheduler(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        interval.tick().await;
        for (trigger_id, fire_count) in state.triggers.scheduled.due(Utc::now()) {
            let Some(trigger) = state.triggers.get(&trigger_id) else { continue };
            for _ in 0..fire_count {
                fire_trigger(state.clone(), trigger.clone());
            }
        }
    }
}

/// Start one run for a trigger firing, recording start/completion against
/// the trigger manager's execution history.
pub fn fire_trigger(state: Arc<AppState>, trigger: Trigger) {
    let trigger_id = trigger.id().to_owned();
    let Ok(execution_id) = state.triggers.record_start(&trigger_id) else { return };

    let common = trigger.common().clone();
    let input = render_task_input(&common.task, &common.task_params);

    tokio::spawn({
        let state = state.clone();
        let trigger_id = trigger_id.clone();
        async move {
            let outcome = execute_run(&state, format!("trigger:{trigger_id}"), input).await;
            let (status, result, error) = match outcome {
                Ok(RunOutcome::Completed { report }) => {
                    (ExecutionStatus::Success, Some(serde_json::json!({"report": report})), None)
                }
                Ok(RunOutcome::Suspended { node, payload }) => {
                    (ExecutionStatus::Success, Some(serde_json::json!({"suspended_at": node, "payload": payload})), None)
                }
                Ok(RunOutcome::Cancelled) => (ExecutionStatus::Cancelled, None, None),
                Err(e) => (ExecutionStatus::Failed, None, Some(e.to_string())),
            };
            if let Err(e) = state.triggers.record_completion(&execution_id, status, result, error) {
                tracing::warn!(error = %e, trigger_id = %trigger_id, "failed to record trigger completion");
            }
            state.triggers.scheduled.release(&trigger_id);
        }
    });
}

/// Substitute `{{key}}` placeholders in the trigger's task template with
/// its configured params, falling back to the bare task string.
fn render_task_input(task: &str, params: &std::collections::HashMap<String, serde_json::Value>) -> String {
    let mut rendered = task.to_owned();
    for (key, value) in params {
        let placeholder = format!("{{{{{key}}}}}");
        let value_str = value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string());
        rendered = rendered.replace(&placeholder, &value_str);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_placeholders() {
        let mut params = std::collections::HashMap::new();
        params.insert("topic".to_string(), serde_json::json!("rust async runtimes"));
        let rendered = render_task_input("Research {{topic}} and summarize.", &params);
        assert_eq!(rendered, "Research rust async runtimes and summarize.");
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        let params = std::collections::HashMap::new();
        let rendered = render_task_input("Research {{topic}}.", &params);
        assert_eq!(rendered, "Research {{topic}}.");
    }

    #[test]
    fn non_string_param_is_stringified() {
        let mut params = std::collections::HashMap::new();
        params.insert("limit".to_string(), serde_json::json!(5));
        let rendered = render_task_input("Find {{limit}} sources.", &params);
        assert_eq!(rendered, "Find 5 sources.");
    }
}
