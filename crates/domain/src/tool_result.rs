use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Universal return value of every tool invocation (C3).
///
/// Every tool call is normalized to this shape regardless of whether the
/// underlying callable returns it directly, returns a bare value (wrapped
/// as `success: true`), or raises (wrapped as `success: false`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Wrap an arbitrary serializable value as a successful result.
    pub fn from_value(value: impl Serialize) -> Self {
        match serde_json::to_string(&value) {
            Ok(output) => Self::ok(output),
            Err(e) => Self::err(format!("failed to stringify tool output: {e}")),
        }
    }
}

/// Distinguished error categories surfaced on a failed [`ToolResult`],
/// mirroring spec §5/§7's error taxonomy for tool failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorType {
    Timeout,
    Transient,
    BudgetExceeded,
    Validation,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_has_no_error() {
        let r = ToolResult::ok("done");
        assert!(r.success);
        assert_eq!(r.output, "done");
        assert!(r.error.is_none());
    }

    #[test]
    fn err_has_empty_output() {
        let r = ToolResult::err("boom");
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.output.is_empty());
    }

    #[test]
    fn from_value_stringifies_json() {
        let r = ToolResult::from_value(serde_json::json!({"a": 1}));
        assert!(r.success);
        assert_eq!(r.output, r#"{"a":1}"#);
    }

    #[test]
    fn with_metadata_roundtrips_through_json() {
        let r = ToolResult::ok("x").with_metadata("attempt", serde_json::json!(2));
        let json = serde_json::to_string(&r).unwrap();
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.metadata.get("attempt"), Some(&serde_json::json!(2)));
    }
}
