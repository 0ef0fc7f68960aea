//! The Brain execution engine's runtime (spec §4): the Event Log &
//! Monitor (D), Signal Queue (E), the Durable Runner and its Agent
//! sub-loop (F, under [`brain`]), the Webhook Router (G), and the
//! Scheduler (H, under [`schedules`] + [`schedule_runner`]).

pub mod brain;
pub mod monitor;
pub mod run_lock;
pub mod schedule_runner;
pub mod schedules;
pub mod signals;
pub mod webhooks;
