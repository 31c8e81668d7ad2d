//! Tool registry and invocation (C3).
//!
//! Generalizes the gateway's `dispatch_tool` match-on-name convention into a
//! uniform `Tool` trait with a single `ToolResult` return contract, plus
//! retry-with-backoff and a per-run call budget.

use ra_domain::error::{Error, Result};
use ra_domain::tool::ToolDefinition;
use ra_domain::tool_result::ToolResult;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Error a [`Tool`] raises internally, before it is normalized into a
/// [`ToolResult`]. Distinguishes retriable failures from ones that should
/// fail fast.
#[derive(Debug, Clone)]
pub enum ToolInvokeError {
    /// Network timeout, rate limit, provider 5xx — worth retrying.
    Transient(String),
    /// Anything else: bad arguments, programming error, permanent failure.
    Fatal(String),
}

impl std::fmt::Display for ToolInvokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolInvokeError::Transient(m) | ToolInvokeError::Fatal(m) => write!(f, "{m}"),
        }
    }
}

/// A single capability: schema + invocation, registered under a name.
///
/// Modeled as a capability record rather than a class hierarchy — the
/// registry is a flat mapping of name to `Arc<dyn Tool>`.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. Implementations should return `Err(Transient(..))`
    /// for errors worth retrying (timeouts, 5xx, rate limits) so the
    /// registry's retry policy can apply; anything else should be
    /// `Err(Fatal(..))` or an `Ok(ToolResult { success: false, .. })`.
    async fn invoke(&self, args: serde_json::Value) -> std::result::Result<ToolResult, ToolInvokeError>;
}

struct Registration {
    tool: Arc<dyn Tool>,
    tags: Vec<String>,
}

/// Process-wide mapping of tool name to capability. Structural mutations
/// (register/unregister) acquire a single coarse lock; reads operate on an
/// immutable snapshot via `Arc` clones.
#[derive(Default)]
pub struct ToolRegistry {
    tools: parking_lot::RwLock<HashMap<String, Registration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if a tool with the same name is already
    /// registered — use [`ToolRegistry::register_override`] to replace one.
    pub fn register(&self, tool: Arc<dyn Tool>, tags: Vec<String>) -> Result<()> {
        let mut tools = self.tools.write();
        if tools.contains_key(tool.name()) {
            return Err(Error::Config(format!(
                "tool '{}' is already registered",
                tool.name()
            )));
        }
        tools.insert(tool.name().to_string(), Registration { tool, tags });
        Ok(())
    }

    /// Register a tool, replacing any existing registration under the same name.
    pub fn register_override(&self, tool: Arc<dyn Tool>, tags: Vec<String>) {
        let mut tools = self.tools.write();
        tools.insert(tool.name().to_string(), Registration { tool, tags });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).map(|r| r.tool.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<Arc<dyn Tool>> {
        self.tools
            .read()
            .values()
            .filter(|r| r.tags.iter().any(|t| t == tag))
            .map(|r| r.tool.clone())
            .collect()
    }

    /// Tool definitions exposed to the LLM, in registration order is not
    /// guaranteed (backed by a `HashMap`); callers that need a stable order
    /// should sort by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .values()
            .map(|r| ToolDefinition {
                name: r.tool.name().to_string(),
                description: r.tool.description().to_string(),
                parameters: r.tool.parameters_schema(),
            })
            .collect()
    }
}

/// Retry/budget policy applied uniformly to every tool invocation.
#[derive(Debug, Clone, Copy)]
pub struct InvokePolicy {
    /// 0 = unlimited.
    pub call_budget: u32,
    pub retry: bool,
    pub max_attempts: u32,
    pub backoff_secs: f64,
}

impl Default for InvokePolicy {
    fn default() -> Self {
        Self {
            call_budget: 0,
            retry: true,
            max_attempts: 3,
            backoff_secs: 1.0,
        }
    }
}

/// Invoke a tool by name, applying budget and retry policy.
///
/// `call_count` is the run's cumulative `tool_call_count`; the caller is
/// responsible for persisting the incremented value back onto `RunState`.
/// Returns `Err(Error::BudgetExceeded)` rather than a `ToolResult` when the
/// budget is exhausted, since that is fatal for the run (spec I3), not a
/// degraded-but-continuing tool outcome.
pub async fn invoke_tool(
    registry: &ToolRegistry,
    name: &str,
    args: serde_json::Value,
    call_count: &mut u32,
    policy: &InvokePolicy,
) -> Result<ToolResult> {
    if policy.call_budget > 0 && *call_count >= policy.call_budget {
        return Err(Error::BudgetExceeded(format!(
            "tool-call limit exceeded ({} calls, limit {})",
            call_count, policy.call_budget
        )));
    }
    *call_count += 1;

    let Some(tool) = registry.get(name) else {
        return Ok(ToolResult::err(format!("unknown tool: {name}")));
    };

    let mut attempt: u32 = 0;
    loop {
        match tool.invoke(args.clone()).await {
            Ok(result) => return Ok(result),
            Err(ToolInvokeError::Fatal(message)) => return Ok(ToolResult::err(message)),
            Err(ToolInvokeError::Transient(message)) => {
                attempt += 1;
                if !policy.retry || attempt >= policy.max_attempts {
                    return Ok(ToolResult::err(message));
                }
                let wait = policy.backoff_secs * 2f64.powi(attempt as i32 - 1);
                tracing::warn!(tool = %name, attempt, wait_secs = wait, "retrying transient tool error");
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(&self, args: serde_json::Value) -> std::result::Result<ToolResult, ToolInvokeError> {
            Ok(ToolResult::ok(args.to_string()))
        }
    }

    struct AlwaysTransient {
        attempts: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl Tool for AlwaysTransient {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "always fails transiently"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(&self, _args: serde_json::Value) -> std::result::Result<ToolResult, ToolInvokeError> {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(ToolInvokeError::Transient("timed out".into()))
        }
    }

    #[tokio::test]
    async fn register_then_get() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), vec![]).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn register_duplicate_without_override_fails() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), vec![]).unwrap();
        let err = registry.register(Arc::new(EchoTool), vec![]);
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn invoke_unknown_tool_returns_failed_result_not_budget_error() {
        let registry = ToolRegistry::new();
        let mut count = 0;
        let result = invoke_tool(&registry, "nope", serde_json::json!({}), &mut count, &InvokePolicy::default())
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn budget_exceeded_is_fatal() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool), vec![]).unwrap();
        let mut count = 5;
        let policy = InvokePolicy {
            call_budget: 5,
            ..InvokePolicy::default()
        };
        let err = invoke_tool(&registry, "echo", serde_json::json!({}), &mut count, &policy).await;
        assert!(matches!(err, Err(Error::BudgetExceeded(_))));
    }

    #[tokio::test]
    async fn transient_error_retries_up_to_max_attempts() {
        let registry = ToolRegistry::new();
        let flaky = Arc::new(AlwaysTransient {
            attempts: std::sync::atomic::AtomicU32::new(0),
        });
        registry.register(flaky.clone(), vec![]).unwrap();
        let mut count = 0;
        let policy = InvokePolicy {
            max_attempts: 3,
            backoff_secs: 0.001,
            ..InvokePolicy::default()
        };
        let result = invoke_tool(&registry, "flaky", serde_json::json!({}), &mut count, &policy)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(flaky.attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
