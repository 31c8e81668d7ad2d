//! Scheduled trigger executor (C9): cron-driven firing with a missed-run
//! policy and a per-trigger in-flight instance cap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

use ra_domain::trigger::MissedPolicy;

use crate::cron::{cron_next_tz, parse_tz};

/// Count how many cron windows were missed between `last_run_at` and `now`,
/// capped at `max_catchup + 1` checks to bound the search.
pub fn missed_window_count(
    cron: &str,
    tz: chrono_tz::Tz,
    last_run_at: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> usize {
    let anchor = match last_run_at {
        Some(t) => t,
        None => return 1,
    };
    let mut count = 0usize;
    let mut cursor = anchor;
    loop {
        match cron_next_tz(cron, &cursor, tz) {
            Some(next) if next <= *now => {
                count += 1;
                cursor = next;
                if count > max_catchup {
                    break;
                }
            }
            _ => break,
        }
    }
    count
}

/// Determine how many runs to fire given the missed-run policy.
pub fn runs_to_fire(
    policy: MissedPolicy,
    cron: &str,
    tz: chrono_tz::Tz,
    last_run_at: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> usize {
    let missed = missed_window_count(cron, tz, last_run_at, now, max_catchup);
    match policy {
        MissedPolicy::Skip => {
            if missed > 1 {
                0
            } else {
                missed
            }
        }
        MissedPolicy::RunOnce => missed.min(1),
        MissedPolicy::CatchUp => missed.min(max_catchup),
    }
}

/// Tracks in-flight execution counts per trigger for `max_instances` caps.
#[derive(Default)]
pub struct ConcurrencyGuard {
    counts: RwLock<HashMap<String, Arc<AtomicU32>>>,
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, trigger_id: &str, max: u32) -> bool {
        let counter = self
            .counts
            .write()
            .entry(trigger_id.to_owned())
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone();
        let current = counter.load(Ordering::SeqCst);
        if max != 0 && current >= max {
            return false;
        }
        counter.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn release(&self, trigger_id: &str) {
        if let Some(counter) = self.counts.read().get(trigger_id) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Registered state for one scheduled trigger.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub trigger_id: String,
    pub cron_expr: String,
    pub timezone: String,
    pub catch_up: MissedPolicy,
    pub max_instances: u32,
    pub max_catchup_runs: usize,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_time: Option<DateTime<Utc>>,
}

impl ScheduledEntry {
    pub fn recompute_next_run(&mut self, after: &DateTime<Utc>) {
        let tz = parse_tz(&self.timezone);
        self.next_run_time = cron_next_tz(&self.cron_expr, after, tz);
    }
}

/// Drives cron-scheduled triggers: computes fire times, applies the missed
/// policy, and bounds concurrent executions per trigger. The caller ticks
/// this on an interval (sleeping cooperatively between ticks is the
/// caller's responsibility so cancellation can interrupt it).
#[derive(Default)]
pub struct ScheduledExecutor {
    entries: RwLock<HashMap<String, ScheduledEntry>>,
    concurrency: ConcurrencyGuard,
}

impl ScheduledExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, mut entry: ScheduledEntry, now: DateTime<Utc>) {
        if entry.next_run_time.is_none() {
            entry.recompute_next_run(&now);
        }
        self.entries.write().insert(entry.trigger_id.clone(), entry);
    }

    pub fn unregister(&self, trigger_id: &str) {
        self.entries.write().remove(trigger_id);
    }

    /// Evaluate all registered triggers against `now`, returning
    /// `(trigger_id, fire_count)` for every trigger with at least one run
    /// to fire, and advancing `next_run_time`/`last_run_at` bookkeeping.
    /// Fires are throttled by each trigger's `max_instances` guard; the
    /// caller is expected to call [`Self::release`] once a fired run
    /// completes.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<(String, usize)> {
        let mut results = Vec::new();
        let mut entries = self.entries.write();
        for entry in entries.values_mut() {
            let Some(next) = entry.next_run_time else { continue };
            if next > now {
                continue;
            }
            let tz = parse_tz(&entry.timezone);
            let n = runs_to_fire(entry.catch_up, &entry.cron_expr, tz, entry.last_run_at, &now, entry.max_catchup_runs);
            entry.recompute_next_run(&now);
            entry.last_run_at = Some(now);
            if n == 0 {
                continue;
            }
            let mut acquired = 0usize;
            for _ in 0..n {
                if self.concurrency.try_acquire(&entry.trigger_id, entry.max_instances) {
                    acquired += 1;
                } else {
                    break;
                }
            }
            if acquired > 0 {
                results.push((entry.trigger_id.clone(), acquired));
            }
        }
        results
    }

    pub fn release(&self, trigger_id: &str) {
        self.concurrency.release(trigger_id);
    }

    /// Sleep until the earliest registered `next_run_time`, or until
    /// `shutdown` fires, whichever comes first. Returns `false` on
    /// shutdown, `true` if it's time to re-evaluate [`Self::due`].
    pub async fn sleep_until_next(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let soonest = {
            let entries = self.entries.read();
            entries.values().filter_map(|e| e.next_run_time).min()
        };
        let sleep_for = match soonest {
            Some(next) => {
                let delta = next - Utc::now();
                delta.to_std().unwrap_or(StdDuration::from_secs(0))
            }
            None => StdDuration::from_secs(30),
        };
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => true,
            _ = shutdown.changed() => false,
        }
    }
}
