use crate::search::ResultBag;
use crate::tool::Message;
use serde::{Deserialize, Serialize};

/// One image attached to the run's input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInput {
    pub mime: String,
    /// Base64-encoded bytes.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The router's classification of a run's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Direct,
    Web,
    Deep,
    /// Reserved for a future multi-agent coordinator variant; the current
    /// node set treats it the same as `Deep`.
    Agent,
    Clarify,
}

/// Evaluator verdict on a draft report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Revise,
    Incomplete,
}

/// Per-dimension evaluator scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvalDimensions {
    pub coverage: f64,
    pub accuracy: f64,
    pub freshness: f64,
    pub coherence: f64,
}

impl EvalDimensions {
    pub fn min(&self) -> f64 {
        self.coverage
            .min(self.accuracy)
            .min(self.freshness)
            .min(self.coherence)
    }
}

/// The evaluator's structured output against a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub dimensions: EvalDimensions,
    /// Free-text summary of the evaluation.
    pub feedback: String,
    #[serde(default)]
    pub missing_topics: Vec<String>,
    #[serde(default)]
    pub suggested_queries: Vec<String>,
}

/// One sandboxed code-execution result, accumulated by the writer's sub-tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeResult {
    pub code: String,
    pub output: String,
    #[serde(default)]
    pub success: bool,
}

/// The graph engine's durable run state (spec §3), persisted at each node
/// boundary. Nodes return a `PartialRunState` that the engine merges into
/// this via per-field reducers (list-valued fields append-concat; see
/// [`crate::run_state`] merge helpers in the owning engine crate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub input: String,
    #[serde(default)]
    pub images: Vec<ImageInput>,
    pub user_id: String,
    pub thread_id: String,
    pub run_id: String,

    pub route: Option<Route>,
    #[serde(default)]
    pub needs_clarification: bool,

    #[serde(default)]
    pub research_plan: Vec<String>,
    #[serde(default)]
    pub scraped_content: Vec<ResultBag>,

    #[serde(default)]
    pub draft_report: String,
    #[serde(default)]
    pub final_report: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,

    #[serde(default)]
    pub revision_count: u32,
    pub max_revisions: u32,

    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub code_results: Vec<CodeResult>,

    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub is_cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_token_id: Option<String>,

    #[serde(default)]
    pub tool_call_count: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, thread_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            images: Vec::new(),
            user_id: String::new(),
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            route: None,
            needs_clarification: false,
            research_plan: Vec::new(),
            scraped_content: Vec::new(),
            draft_report: String::new(),
            final_report: String::new(),
            evaluation: None,
            revision_count: 0,
            max_revisions: 1,
            messages: Vec::new(),
            code_results: Vec::new(),
            is_complete: false,
            is_cancelled: false,
            cancel_token_id: None,
            tool_call_count: 0,
            errors: Vec::new(),
        }
    }

    /// (I1) invariant check: revision_count never exceeds max_revisions.
    pub fn within_revision_budget(&self) -> bool {
        self.revision_count <= self.max_revisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_incomplete_with_empty_plan() {
        let s = RunState::new("r1", "t1", "hello");
        assert!(!s.is_complete);
        assert!(s.research_plan.is_empty());
        assert_eq!(s.revision_count, 0);
    }

    #[test]
    fn within_revision_budget_true_at_limit() {
        let mut s = RunState::new("r1", "t1", "hello");
        s.max_revisions = 2;
        s.revision_count = 2;
        assert!(s.within_revision_budget());
        s.revision_count = 3;
        assert!(!s.within_revision_budget());
    }

    #[test]
    fn eval_dimensions_min_picks_lowest() {
        let d = EvalDimensions {
            coverage: 0.9,
            accuracy: 0.4,
            freshness: 0.8,
            coherence: 0.95,
        };
        assert!((d.min() - 0.4).abs() < f64::EPSILON);
    }
}
