use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status shared by every trigger variant: create → active →
/// (paused ↔ active) → disabled|error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Paused,
    Disabled,
    Error,
}

/// Running counters maintained per trigger across its lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TriggerStats {
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired_at: Option<i64>,
}

/// Fields shared by all three trigger variants (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCommon {
    pub id: String,
    pub name: String,
    pub status: TriggerStatus,
    pub agent_id: String,
    pub task: String,
    #[serde(default)]
    pub task_params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub stats: TriggerStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledFields {
    pub cron_expr: String,
    pub timezone: String,
    #[serde(default)]
    pub run_immediately: bool,
    #[serde(default)]
    pub catch_up: MissedPolicy,
    #[serde(default = "d_max_instances")]
    pub max_instances: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_time: Option<i64>,
}

fn d_max_instances() -> u32 {
    1
}

/// How a scheduled trigger behaves when its process was offline across one
/// or more fire times. Generalizes spec §4.9's boolean `catch_up` flag:
/// `Skip` == `catch_up=false`; `RunOnce` fires a single time on restart
/// rather than replaying every missed slot; `CatchUp` == `catch_up=true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    #[default]
    Skip,
    RunOnce,
    CatchUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookFields {
    pub endpoint_path: String,
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub extract_body: bool,
    #[serde(default)]
    pub extract_query: bool,
    #[serde(default)]
    pub extract_headers: Vec<String>,
    pub rate_limit: u32,
    pub rate_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFields {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_filter: Option<String>,
    #[serde(default)]
    pub data_filters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub batch_window_ms: Option<u64>,
}

/// One of the three trigger variants that can launch a run autonomously.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Scheduled {
        #[serde(flatten)]
        common: TriggerCommon,
        #[serde(flatten)]
        fields: ScheduledFields,
    },
    Webhook {
        #[serde(flatten)]
        common: TriggerCommon,
        #[serde(flatten)]
        fields: WebhookFields,
    },
    Event {
        #[serde(flatten)]
        common: TriggerCommon,
        #[serde(flatten)]
        fields: EventFields,
    },
}

impl Trigger {
    pub fn common(&self) -> &TriggerCommon {
        match self {
            Trigger::Scheduled { common, .. }
            | Trigger::Webhook { common, .. }
            | Trigger::Event { common, .. } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut TriggerCommon {
        match self {
            Trigger::Scheduled { common, .. }
            | Trigger::Webhook { common, .. }
            | Trigger::Event { common, .. } => common,
        }
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }
}

/// Status of one trigger firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

/// A record of one trigger firing, capped to `execution_history_limit`
/// per manager (oldest dropped first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerExecution {
    pub id: String,
    pub trigger_id: String,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common() -> TriggerCommon {
        TriggerCommon {
            id: "t1".into(),
            name: "daily-digest".into(),
            status: TriggerStatus::Active,
            agent_id: "agent-1".into(),
            task: "research".into(),
            task_params: HashMap::new(),
            stats: TriggerStats::default(),
        }
    }

    #[test]
    fn scheduled_trigger_serde_roundtrip() {
        let t = Trigger::Scheduled {
            common: common(),
            fields: ScheduledFields {
                cron_expr: "*/15 * * * *".into(),
                timezone: "Asia/Shanghai".into(),
                run_immediately: false,
                catch_up: MissedPolicy::Skip,
                max_instances: 1,
                next_run_time: None,
            },
        };
        let json = serde_json::to_string(&t).unwrap();
        let back: Trigger = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), "t1");
    }

    #[test]
    fn missed_policy_defaults_to_skip() {
        assert_eq!(MissedPolicy::default(), MissedPolicy::Skip);
    }

    #[test]
    fn webhook_trigger_kind_tag_present_in_json() {
        let t = Trigger::Webhook {
            common: common(),
            fields: WebhookFields {
                endpoint_path: "/hooks/t1".into(),
                allowed_methods: vec!["POST".into()],
                require_auth: true,
                auth_token: Some("secret".into()),
                extract_body: true,
                extract_query: false,
                extract_headers: vec![],
                rate_limit: 30,
                rate_window_secs: 60,
            },
        };
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"kind\":\"webhook\""));
    }
}
