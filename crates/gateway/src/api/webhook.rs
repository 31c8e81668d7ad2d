//! Webhook trigger HTTP surface: `ANY <endpoint_path>` → [`WebhookExecutor`]
//! dispatch → one research-agent run → the trigger's execution bookkeeping.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use ra_domain::trigger::ExecutionStatus;
use ra_triggers::{WebhookOutcome, WebhookRequest};

use crate::runtime::run_driver::{execute_run, RunOutcome};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct WebhookResponse {
    success: bool,
    status_code: u16,
    trigger_id: Option<String>,
    trigger_name: Option<String>,
    execution_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl WebhookResponse {
    fn empty(status: StatusCode) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                success: false,
                status_code: status.as_u16(),
                trigger_id: None,
                trigger_name: None,
                execution_count: None,
                result: None,
                error: None,
            }),
        )
    }
}

pub async fn handle(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> impl IntoResponse {
    let endpoint = format!("/{path}");
    let bearer_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let body_json = (!body.is_empty())
        .then(|| serde_json::from_slice::<serde_json::Value>(&body).ok())
        .flatten();
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_owned(), v.to_owned())))
        .collect();

    let req = WebhookRequest {
        method: method.as_str(),
        bearer_token,
        body: body_json,
        query,
        headers: header_map,
    };

    let outcome = state.triggers.webhook.dispatch(&endpoint, &req);

    let (trigger_id, task_params) = match outcome {
        WebhookOutcome::NotFound => return WebhookResponse::empty(StatusCode::NOT_FOUND).into_response(),
        WebhookOutcome::MethodNotAllowed => {
            return WebhookResponse::empty(StatusCode::METHOD_NOT_ALLOWED).into_response()
        }
        WebhookOutcome::Unauthorized => return WebhookResponse::empty(StatusCode::UNAUTHORIZED).into_response(),
        WebhookOutcome::RateLimited => return WebhookResponse::empty(StatusCode::TOO_MANY_REQUESTS).into_response(),
        WebhookOutcome::Accepted { trigger_id, task_params } => (trigger_id, task_params),
    };

    let Some(trigger) = state.triggers.get(&trigger_id) else {
        return WebhookResponse::empty(StatusCode::NOT_FOUND).into_response();
    };
    let trigger_name = trigger.common().name.clone();

    if state.llm.is_empty() {
        let Ok(execution_id) = state.triggers.record_start(&trigger_id) else {
            return WebhookResponse::empty(StatusCode::SERVICE_UNAVAILABLE).into_response();
        };
        let _ = state.triggers.record_completion(
            &execution_id,
            ExecutionStatus::Failed,
            None,
            Some("no LLM providers configured".into()),
        );
        let execution_count = state.triggers.get(&trigger_id).map(|t| t.common().stats.execution_count);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(WebhookResponse {
                success: false,
                status_code: 503,
                trigger_id: Some(trigger_id),
                trigger_name: Some(trigger_name),
                execution_count,
                result: None,
                error: Some("no LLM providers configured".into()),
            }),
        )
            .into_response();
    }

    let Ok(execution_id) = state.triggers.record_start(&trigger_id) else {
        return WebhookResponse::empty(StatusCode::INTERNAL_SERVER_ERROR).into_response();
    };

    let input = render_task_params(&task_params);
    let run_result = execute_run(&state, format!("webhook:{trigger_id}"), input).await;

    let (status_code, status, result, error) = match &run_result {
        Ok(RunOutcome::Completed { report }) => {
            (200, ExecutionStatus::Success, Some(serde_json::json!({"report": report})), None)
        }
        Ok(RunOutcome::Suspended { node, payload }) => (
            200,
            ExecutionStatus::Success,
            Some(serde_json::json!({"suspended_at": node, "payload": payload})),
            None,
        ),
        Ok(RunOutcome::Cancelled) => (500, ExecutionStatus::Cancelled, None, Some("run cancelled".to_string())),
        Err(e) => (500, ExecutionStatus::Failed, None, Some(e.to_string())),
    };

    let _ = state.triggers.record_completion(&execution_id, status, result.clone(), error.clone());
    let execution_count = state.triggers.get(&trigger_id).map(|t| t.common().stats.execution_count);

    (
        StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(WebhookResponse {
            success: status_code == 200,
            status_code,
            trigger_id: Some(trigger_id),
            trigger_name: Some(trigger_name),
            execution_count,
            result,
            error,
        }),
    )
        .into_response()
}

/// Flatten the webhook executor's extracted `task_params` (`body`, `query`,
/// `header_*`) into a single input string for the run: the body's `input`
/// or `query` field if present, else the whole extracted map stringified.
fn render_task_params(task_params: &HashMap<String, serde_json::Value>) -> String {
    if let Some(input) = task_params
        .get("body")
        .and_then(|b| b.get("input").or_else(|| b.get("query")))
        .and_then(|v| v.as_str())
    {
        return input.to_owned();
    }
    if let Some(query) = task_params.get("query").and_then(|q| q.get("q")).and_then(|v| v.as_str()) {
        return query.to_owned();
    }
    serde_json::to_string(task_params).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_body_input_field() {
        let mut params = HashMap::new();
        params.insert("body".to_string(), serde_json::json!({"input": "summarize rust 1.80 changes"}));
        assert_eq!(render_task_params(&params), "summarize rust 1.80 changes");
    }

    #[test]
    fn falls_back_to_query_q_param() {
        let mut params = HashMap::new();
        params.insert("query".to_string(), serde_json::json!({"q": "latest wasm runtimes"}));
        assert_eq!(render_task_params(&params), "latest wasm runtimes");
    }

    #[test]
    fn falls_back_to_stringified_params_when_nothing_recognized() {
        let mut params = HashMap::new();
        params.insert("header_x-id".to_string(), serde_json::json!("abc"));
        let rendered = render_task_params(&params);
        assert!(rendered.contains("abc"));
    }
}
