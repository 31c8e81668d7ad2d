//! Trigger manager (C9): owns the full lifecycle of every registered
//! trigger, dispatches to the scheduled/webhook/event executors, and keeps
//! a capped execution history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use ra_domain::config::TriggerConfig;
use ra_domain::error::{Error, Result};
use ra_domain::trigger::{
    ExecutionStatus, Trigger, TriggerExecution, TriggerStatus,
};

use crate::event::EventExecutor;
use crate::scheduled::{ScheduledEntry, ScheduledExecutor};
use crate::webhook::WebhookExecutor;

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct PersistedState {
    triggers: Vec<Trigger>,
    executions: Vec<TriggerExecution>,
}

/// Owns every registered trigger's lifecycle state and fans firings out to
/// the per-kind executors.
pub struct TriggerManager {
    config: TriggerConfig,
    state_path: Option<PathBuf>,
    triggers: RwLock<HashMap<String, Trigger>>,
    executions: RwLock<Vec<TriggerExecution>>,
    pub scheduled: ScheduledExecutor,
    pub webhook: WebhookExecutor,
    pub event: EventExecutor,
}

impl TriggerManager {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            state_path: None,
            triggers: RwLock::new(HashMap::new()),
            executions: RwLock::new(Vec::new()),
            scheduled: ScheduledExecutor::new(),
            webhook: WebhookExecutor::new(),
            event: EventExecutor::new(),
        }
    }

    /// Load persisted trigger state from `path`, or start empty if it
    /// doesn't exist yet. Subsequent mutations are flushed back to `path`.
    pub fn load(path: impl AsRef<Path>, config: TriggerConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let persisted: PersistedState = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            PersistedState::default()
        };

        let manager = Self::new(config);
        {
            let mut triggers = manager.triggers.write();
            for trigger in persisted.triggers {
                triggers.insert(trigger.id().to_owned(), trigger);
            }
        }
        *manager.executions.write() = persisted.executions;

        let now = Utc::now();
        for trigger in manager.triggers.read().values() {
            manager.wire_executor(trigger, now);
        }

        Ok(Self { state_path: Some(path), ..manager })
    }

    fn wire_executor(&self, trigger: &Trigger, now: chrono::DateTime<Utc>) {
        if trigger.common().status != TriggerStatus::Active {
            return;
        }
        match trigger {
            Trigger::Scheduled { common, fields } => {
                self.scheduled.register(
                    ScheduledEntry {
                        trigger_id: common.id.clone(),
                        cron_expr: fields.cron_expr.clone(),
                        timezone: fields.timezone.clone(),
                        catch_up: fields.catch_up,
                        max_instances: fields.max_instances,
                        max_catchup_runs: 24,
                        last_run_at: common.stats.last_fired_at.and_then(|ts| {
                            chrono::DateTime::from_timestamp(ts, 0)
                        }),
                        next_run_time: None,
                    },
                    now,
                );
            }
            Trigger::Webhook { common, fields } => {
                self.webhook.register(&common.id, fields.clone());
            }
            Trigger::Event { common, fields } => {
                self.event.register(&common.id, fields.clone());
            }
        }
    }

    fn flush(&self) -> Result<()> {
        let Some(path) = &self.state_path else { return Ok(()) };
        let state = PersistedState {
            triggers: self.triggers.read().values().cloned().collect(),
            executions: self.executions.read().clone(),
        };
        let json = serde_json::to_string_pretty(&state)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn create(&self, mut trigger: Trigger) -> Result<String> {
        if trigger.common().id.is_empty() {
            trigger.common_mut().id = Uuid::new_v4().to_string();
        }
        trigger.common_mut().status = TriggerStatus::Active;
        let id = trigger.id().to_owned();
        self.wire_executor(&trigger, Utc::now());
        self.triggers.write().insert(id.clone(), trigger);
        self.flush()?;
        Ok(id)
    }

    pub fn get(&self, trigger_id: &str) -> Option<Trigger> {
        self.triggers.read().get(trigger_id).cloned()
    }

    pub fn list(&self) -> Vec<Trigger> {
        self.triggers.read().values().cloned().collect()
    }

    fn set_status(&self, trigger_id: &str, status: TriggerStatus) -> Result<()> {
        let mut triggers = self.triggers.write();
        let trigger = triggers
            .get_mut(trigger_id)
            .ok_or_else(|| Error::Other(format!("trigger not found: {trigger_id}")))?;
        trigger.common_mut().status = status;
        drop(triggers);
        self.unwire(trigger_id);
        if status == TriggerStatus::Active {
            if let Some(trigger) = self.triggers.read().get(trigger_id) {
                self.wire_executor(trigger, Utc::now());
            }
        }
        self.flush()
    }

    fn unwire(&self, trigger_id: &str) {
        self.scheduled.unregister(trigger_id);
        self.webhook.unregister_by_trigger(trigger_id);
        self.event.unregister_by_trigger(trigger_id);
    }

    pub fn pause(&self, trigger_id: &str) -> Result<()> {
        self.set_status(trigger_id, TriggerStatus::Paused)
    }

    pub fn resume(&self, trigger_id: &str) -> Result<()> {
        self.set_status(trigger_id, TriggerStatus::Active)
    }

    pub fn disable(&self, trigger_id: &str) -> Result<()> {
        self.set_status(trigger_id, TriggerStatus::Disabled)
    }

    pub fn mark_error(&self, trigger_id: &str) -> Result<()> {
        self.set_status(trigger_id, TriggerStatus::Error)
    }

    pub fn delete(&self, trigger_id: &str) -> Result<()> {
        self.unwire(trigger_id);
        self.triggers.write().remove(trigger_id);
        self.flush()
    }

    /// Record the start of a new execution, returning its id.
    pub fn record_start(&self, trigger_id: &str) -> Result<String> {
        let execution = TriggerExecution {
            id: Uuid::new_v4().to_string(),
            trigger_id: trigger_id.to_owned(),
            started_at: Utc::now().timestamp(),
            completed_at: None,
            status: ExecutionStatus::Running,
            error: None,
            retry_attempt: 0,
            result: None,
        };
        let id = execution.id.clone();
        let mut executions = self.executions.write();
        executions.push(execution);
        let limit = self.config.execution_history_limit;
        if executions.len() > limit {
            let overflow = executions.len() - limit;
            executions.drain(0..overflow);
        }
        drop(executions);
        if let Some(mut trigger) = self.get(trigger_id) {
            trigger.common_mut().stats.execution_count += 1;
            self.triggers.write().insert(trigger_id.to_owned(), trigger);
        }
        self.flush()?;
        Ok(id)
    }

    pub fn record_completion(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<()> {
        let trigger_id = {
            let mut executions = self.executions.write();
            let execution = executions
                .iter_mut()
                .find(|e| e.id == execution_id)
                .ok_or_else(|| Error::Other(format!("execution not found: {execution_id}")))?;
            execution.completed_at = Some(Utc::now().timestamp());
            execution.status = status;
            execution.result = result;
            execution.error = error;
            execution.trigger_id.clone()
        };
        if let Some(mut trigger) = self.get(&trigger_id) {
            trigger.common_mut().stats.last_fired_at = Some(Utc::now().timestamp());
            match status {
                ExecutionStatus::Success => trigger.common_mut().stats.success_count += 1,
                ExecutionStatus::Failed | ExecutionStatus::Timeout => {
                    trigger.common_mut().stats.failure_count += 1
                }
                _ => {}
            }
            self.triggers.write().insert(trigger_id, trigger);
        }
        self.flush()
    }

    pub fn execution_history(&self, trigger_id: &str) -> Vec<TriggerExecution> {
        self.executions
            .read()
            .iter()
            .filter(|e| e.trigger_id == trigger_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ra_domain::trigger::{MissedPolicy, ScheduledFields, TriggerCommon, TriggerStats};

    fn scheduled_trigger(id: &str) -> Trigger {
        Trigger::Scheduled {
            common: TriggerCommon {
                id: id.to_owned(),
                name: "daily-digest".into(),
                status: TriggerStatus::Active,
                agent_id: "agent-1".into(),
                task: "research".into(),
                task_params: HashMap::new(),
                stats: TriggerStats::default(),
            },
            fields: ScheduledFields {
                cron_expr: "0 9 * * *".into(),
                timezone: "UTC".into(),
                run_immediately: false,
                catch_up: MissedPolicy::Skip,
                max_instances: 1,
                next_run_time: None,
            },
        }
    }

    #[test]
    fn create_assigns_id_and_activates() {
        let manager = TriggerManager::new(TriggerConfig::default());
        let mut trigger = scheduled_trigger("");
        trigger.common_mut().status = TriggerStatus::Paused;
        let id = manager.create(trigger).unwrap();
        assert!(!id.is_empty());
        assert_eq!(manager.get(&id).unwrap().common().status, TriggerStatus::Active);
    }

    #[test]
    fn pause_resume_roundtrip() {
        let manager = TriggerManager::new(TriggerConfig::default());
        let id = manager.create(scheduled_trigger("t1")).unwrap();
        manager.pause(&id).unwrap();
        assert_eq!(manager.get(&id).unwrap().common().status, TriggerStatus::Paused);
        manager.resume(&id).unwrap();
        assert_eq!(manager.get(&id).unwrap().common().status, TriggerStatus::Active);
    }

    #[test]
    fn execution_history_is_capped() {
        let mut config = TriggerConfig::default();
        config.execution_history_limit = 2;
        let manager = TriggerManager::new(config);
        let id = manager.create(scheduled_trigger("t1")).unwrap();
        let e1 = manager.record_start(&id).unwrap();
        let _e2 = manager.record_start(&id).unwrap();
        let _e3 = manager.record_start(&id).unwrap();
        let history = manager.execution_history(&id);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|e| e.id != e1));
    }

    #[test]
    fn record_completion_updates_stats() {
        let manager = TriggerManager::new(TriggerConfig::default());
        let id = manager.create(scheduled_trigger("t1")).unwrap();
        let exec_id = manager.record_start(&id).unwrap();
        manager
            .record_completion(&exec_id, ExecutionStatus::Success, Some(serde_json::json!({"ok": true})), None)
            .unwrap();
        let trigger = manager.get(&id).unwrap();
        assert_eq!(trigger.common().stats.success_count, 1);
        assert!(trigger.common().stats.last_fired_at.is_some());
    }

    #[test]
    fn disable_unwires_scheduled_executor() {
        let manager = TriggerManager::new(TriggerConfig::default());
        let id = manager.create(scheduled_trigger("t1")).unwrap();
        let due_before = manager.scheduled.due(Utc::now() + chrono::Duration::days(1)).len();
        manager.disable(&id).unwrap();
        let due_after = manager.scheduled.due(Utc::now() + chrono::Duration::days(1)).len();
        assert!(due_after <= due_before);
    }

    #[test]
    fn persists_and_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triggers.json");
        let id = {
            let manager = TriggerManager::load(&path, TriggerConfig::default()).unwrap();
            manager.create(scheduled_trigger("t1")).unwrap()
        };
        let reloaded = TriggerManager::load(&path, TriggerConfig::default()).unwrap();
        assert_eq!(reloaded.get(&id).unwrap().id(), "t1");
    }
}
