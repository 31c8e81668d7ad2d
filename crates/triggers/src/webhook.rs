//! Webhook trigger executor (C9): endpoint lookup, method/auth checks, and
//! request-to-task-params extraction.

use std::collections::HashMap;

use parking_lot::RwLock;
use subtle::ConstantTimeEq;

use ra_domain::trigger::WebhookFields;

use crate::rate_limit::RateLimiter;

/// Outcome of dispatching an inbound webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Accepted { trigger_id: String, task_params: HashMap<String, serde_json::Value> },
    NotFound,
    MethodNotAllowed,
    Unauthorized,
    RateLimited,
}

/// One inbound request, already parsed by the HTTP layer.
pub struct WebhookRequest<'a> {
    pub method: &'a str,
    pub bearer_token: Option<&'a str>,
    pub body: Option<serde_json::Value>,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

/// Routes inbound webhook requests to registered triggers by endpoint path.
#[derive(Default)]
pub struct WebhookExecutor {
    routes: RwLock<HashMap<String, (String, WebhookFields)>>,
    rate_limiter: RateLimiter,
}

impl WebhookExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, trigger_id: &str, fields: WebhookFields) {
        self.routes
            .write()
            .insert(fields.endpoint_path.clone(), (trigger_id.to_owned(), fields));
    }

    pub fn unregister_by_trigger(&self, trigger_id: &str) {
        self.routes.write().retain(|_, (id, _)| id != trigger_id);
    }

    /// Dispatch an inbound request addressed to `path`.
    pub fn dispatch(&self, path: &str, req: &WebhookRequest<'_>) -> WebhookOutcome {
        let routes = self.routes.read();
        let Some((trigger_id, fields)) = routes.get(path) else {
            return WebhookOutcome::NotFound;
        };

        if !fields
            .allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(req.method))
        {
            return WebhookOutcome::MethodNotAllowed;
        }

        if fields.require_auth {
            let expected = fields.auth_token.as_deref().unwrap_or("");
            let provided = req.bearer_token.unwrap_or("");
            if expected.is_empty() || !bytes_eq_constant_time(expected.as_bytes(), provided.as_bytes()) {
                return WebhookOutcome::Unauthorized;
            }
        }

        if fields.rate_limit > 0
            && !self.rate_limiter.check(
                trigger_id,
                fields.rate_limit,
                std::time::Duration::from_secs(fields.rate_window_secs),
            )
        {
            return WebhookOutcome::RateLimited;
        }

        let mut task_params = HashMap::new();
        if fields.extract_body {
            if let Some(body) = &req.body {
                task_params.insert("body".to_owned(), body.clone());
            }
        }
        if fields.extract_query {
            let query_json: serde_json::Value = req
                .query
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect::<serde_json::Map<_, _>>()
                .into();
            task_params.insert("query".to_owned(), query_json);
        }
        for header_name in &fields.extract_headers {
            if let Some(value) = req.headers.get(header_name) {
                task_params.insert(
                    format!("header_{header_name}"),
                    serde_json::Value::String(value.clone()),
                );
            }
        }

        WebhookOutcome::Accepted {
            trigger_id: trigger_id.clone(),
            task_params,
        }
    }
}

/// Constant-time comparison guarding against timing attacks on the bearer
/// token, mirroring the HMAC-signature compare pattern used elsewhere for
/// webhook verification.
fn bytes_eq_constant_time(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.ct_eq(provided).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(require_auth: bool, token: Option<&str>) -> WebhookFields {
        WebhookFields {
            endpoint_path: "/hooks/t1".into(),
            allowed_methods: vec!["POST".into()],
            require_auth,
            auth_token: token.map(str::to_owned),
            extract_body: true,
            extract_query: true,
            extract_headers: vec!["x-request-id".into()],
            rate_limit: 2,
            rate_window_secs: 60,
        }
    }

    fn req<'a>(method: &'a str, token: Option<&'a str>) -> WebhookRequest<'a> {
        WebhookRequest {
            method,
            bearer_token: token,
            body: Some(serde_json::json!({"k": "v"})),
            query: HashMap::from([("q".to_owned(), "1".to_owned())]),
            headers: HashMap::from([("x-request-id".to_owned(), "abc".to_owned())]),
        }
    }

    #[test]
    fn unknown_path_returns_not_found() {
        let exec = WebhookExecutor::new();
        exec.register("t1", fields(false, None));
        assert_eq!(exec.dispatch("/hooks/missing", &req("POST", None)), WebhookOutcome::NotFound);
    }

    #[test]
    fn disallowed_method_is_rejected() {
        let exec = WebhookExecutor::new();
        exec.register("t1", fields(false, None));
        assert_eq!(exec.dispatch("/hooks/t1", &req("GET", None)), WebhookOutcome::MethodNotAllowed);
    }

    #[test]
    fn missing_or_wrong_token_is_unauthorized() {
        let exec = WebhookExecutor::new();
        exec.register("t1", fields(true, Some("secret")));
        assert_eq!(exec.dispatch("/hooks/t1", &req("POST", None)), WebhookOutcome::Unauthorized);
        assert_eq!(exec.dispatch("/hooks/t1", &req("POST", Some("wrong"))), WebhookOutcome::Unauthorized);
    }

    #[test]
    fn correct_token_is_accepted_and_extracts_params() {
        let exec = WebhookExecutor::new();
        exec.register("t1", fields(true, Some("secret")));
        match exec.dispatch("/hooks/t1", &req("POST", Some("secret"))) {
            WebhookOutcome::Accepted { trigger_id, task_params } => {
                assert_eq!(trigger_id, "t1");
                assert!(task_params.contains_key("body"));
                assert!(task_params.contains_key("query"));
                assert!(task_params.contains_key("header_x-request-id"));
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_blocks_after_threshold() {
        let exec = WebhookExecutor::new();
        exec.register("t1", fields(false, None));
        assert!(matches!(exec.dispatch("/hooks/t1", &req("POST", None)), WebhookOutcome::Accepted { .. }));
        assert!(matches!(exec.dispatch("/hooks/t1", &req("POST", None)), WebhookOutcome::Accepted { .. }));
        assert_eq!(exec.dispatch("/hooks/t1", &req("POST", None)), WebhookOutcome::RateLimited);
    }
}
