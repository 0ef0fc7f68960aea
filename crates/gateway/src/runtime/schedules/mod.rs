//! Schedule store and Scheduler actor (spec §4.H): cron-triggered Brain runs.
//!
//! Schedules are persisted to `schedules.json`, scheduled-run outcomes to
//! `scheduled_runs.json`. Split into submodules:
//! - [`model`] — `Schedule` / `ScheduledRun` data types
//! - [`cron`] — timezone-aware cron evaluation
//! - [`validation`] — cron/timezone input validation
//! - [`store`] — persistent `ScheduleStore` with event broadcasting

pub mod cron;
pub mod model;
pub mod store;
pub mod validation;

pub use cron::{cron_matches, cron_next, cron_next_n, cron_next_n_tz, cron_next_tz, parse_tz};
pub use model::{
    MissedPolicy, Schedule, ScheduleEvent, ScheduleStatus, ScheduleView, ScheduledRun,
    ScheduledRunStatus,
};
pub use store::ScheduleStore;
pub use validation::{validate_cron, validate_timezone};
