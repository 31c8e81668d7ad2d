//! Event trigger executor (C9): matches emitted events against registered
//! triggers by type, source, and data filters, with optional debounce and
//! batching.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use ra_domain::trigger::EventFields;

/// What to do in response to one `emit` call for a single matching trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Fire now with this payload (or accumulated batch payload).
    Fire(Vec<serde_json::Value>),
    /// Suppressed by debounce; no fire this time.
    Debounced,
    /// Buffered into an open batch window; caller should poll `drain_batches`.
    Batched,
}

struct Registration {
    trigger_id: String,
    fields: EventFields,
    last_fired: Option<Instant>,
    batch_buffer: Vec<serde_json::Value>,
    batch_opened_at: Option<Instant>,
}

/// Routes emitted events to registered triggers by `event_type`.
#[derive(Default)]
pub struct EventExecutor {
    by_type: RwLock<HashMap<String, Vec<Registration>>>,
}

impl EventExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, trigger_id: &str, fields: EventFields) {
        let mut by_type = self.by_type.write();
        by_type
            .entry(fields.event_type.clone())
            .or_default()
            .push(Registration {
                trigger_id: trigger_id.to_owned(),
                fields,
                last_fired: None,
                batch_buffer: Vec::new(),
                batch_opened_at: None,
            });
    }

    pub fn unregister_by_trigger(&self, trigger_id: &str) {
        let mut by_type = self.by_type.write();
        for regs in by_type.values_mut() {
            regs.retain(|r| r.trigger_id != trigger_id);
        }
        by_type.retain(|_, regs| !regs.is_empty());
    }

    /// Emit an event, returning the outcome for every trigger whose filters
    /// matched, as `(trigger_id, outcome)` pairs.
    pub fn emit(
        &self,
        event_type: &str,
        source: Option<&str>,
        data: serde_json::Value,
    ) -> Vec<(String, EventOutcome)> {
        let now = Instant::now();
        let mut by_type = self.by_type.write();
        let Some(regs) = by_type.get_mut(event_type) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for reg in regs.iter_mut() {
            if !source_matches(&reg.fields.source_filter, source) {
                continue;
            }
            if !data_matches(&reg.fields.data_filters, &data) {
                continue;
            }

            if let Some(debounce) = reg.fields.debounce_ms {
                if let Some(last) = reg.last_fired {
                    if now.duration_since(last) < Duration::from_millis(debounce) {
                        results.push((reg.trigger_id.clone(), EventOutcome::Debounced));
                        continue;
                    }
                }
            }

            if let Some(batch_window) = reg.fields.batch_window_ms {
                reg.batch_buffer.push(data.clone());
                if reg.batch_opened_at.is_none() {
                    reg.batch_opened_at = Some(now);
                }
                let elapsed = now.duration_since(reg.batch_opened_at.unwrap());
                if elapsed >= Duration::from_millis(batch_window) {
                    let batch = std::mem::take(&mut reg.batch_buffer);
                    reg.batch_opened_at = None;
                    reg.last_fired = Some(now);
                    results.push((reg.trigger_id.clone(), EventOutcome::Fire(batch)));
                } else {
                    results.push((reg.trigger_id.clone(), EventOutcome::Batched));
                }
                continue;
            }

            reg.last_fired = Some(now);
            results.push((reg.trigger_id.clone(), EventOutcome::Fire(vec![data.clone()])));
        }
        results
    }
}

fn source_matches(filter: &Option<String>, source: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(expected) => source == Some(expected.as_str()),
    }
}

fn data_matches(filters: &HashMap<String, serde_json::Value>, data: &serde_json::Value) -> bool {
    filters.iter().all(|(key, expected)| {
        data.get(key).map(|actual| actual == expected).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(event_type: &str) -> EventFields {
        EventFields {
            event_type: event_type.to_owned(),
            source_filter: None,
            data_filters: HashMap::new(),
            debounce_ms: None,
            batch_window_ms: None,
        }
    }

    #[test]
    fn unmatched_event_type_yields_no_results() {
        let exec = EventExecutor::new();
        exec.register("t1", fields("deploy.completed"));
        assert!(exec.emit("other.event", None, serde_json::json!({})).is_empty());
    }

    #[test]
    fn source_filter_excludes_non_matching_source() {
        let exec = EventExecutor::new();
        let mut f = fields("deploy.completed");
        f.source_filter = Some("ci".into());
        exec.register("t1", f);
        assert!(exec.emit("deploy.completed", Some("manual"), serde_json::json!({})).is_empty());
        let hits = exec.emit("deploy.completed", Some("ci"), serde_json::json!({}));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn data_filter_requires_path_equality() {
        let exec = EventExecutor::new();
        let mut f = fields("order.created");
        f.data_filters.insert("region".into(), serde_json::json!("us"));
        exec.register("t1", f);
        assert!(exec.emit("order.created", None, serde_json::json!({"region": "eu"})).is_empty());
        let hits = exec.emit("order.created", None, serde_json::json!({"region": "us"}));
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0].1, EventOutcome::Fire(_)));
    }

    #[test]
    fn debounce_suppresses_rapid_repeats() {
        let exec = EventExecutor::new();
        let mut f = fields("heartbeat");
        f.debounce_ms = Some(1000);
        exec.register("t1", f);
        let first = exec.emit("heartbeat", None, serde_json::json!({}));
        assert!(matches!(first[0].1, EventOutcome::Fire(_)));
        let second = exec.emit("heartbeat", None, serde_json::json!({}));
        assert_eq!(second[0].1, EventOutcome::Debounced);
    }

    #[test]
    fn batch_window_buffers_until_elapsed() {
        let exec = EventExecutor::new();
        let mut f = fields("metric.point");
        f.batch_window_ms = Some(20);
        exec.register("t1", f);
        let first = exec.emit("metric.point", None, serde_json::json!({"v": 1}));
        assert_eq!(first[0].1, EventOutcome::Batched);
        std::thread::sleep(Duration::from_millis(30));
        let second = exec.emit("metric.point", None, serde_json::json!({"v": 2}));
        match &second[0].1 {
            EventOutcome::Fire(batch) => assert_eq!(batch.len(), 2),
            other => panic!("expected Fire, got {other:?}"),
        }
    }
}
