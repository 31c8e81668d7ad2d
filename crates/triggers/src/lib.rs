//! Trigger manager (C9): fires agent runs from cron schedules, inbound
//! webhooks, or emitted events, independent of interactive sessions.
//!
//! `cron` is the timezone-aware 5-field evaluator, `scheduled` layers the
//! missed-run policy and concurrency caps on top of it, `webhook` and
//! `event` are the other two trigger kinds, `rate_limit` is the sliding
//! window the webhook executor consults, and `manager` ties the three
//! executors together with lifecycle and persistence.

pub mod cron;
pub mod event;
pub mod manager;
pub mod rate_limit;
pub mod scheduled;
pub mod webhook;

pub use cron::{cron_matches, cron_next, cron_next_tz, parse_tz};
pub use event::{EventExecutor, EventOutcome};
pub use manager::TriggerManager;
pub use rate_limit::RateLimiter;
pub use scheduled::{missed_window_count, runs_to_fire, ConcurrencyGuard, ScheduledEntry, ScheduledExecutor};
pub use webhook::{WebhookExecutor, WebhookOutcome, WebhookRequest};
