//! Pulseboard service - periodic reachability checks for a list of HTTP(S) targets
//!
//! This crate holds the probe scheduler and everything it needs:
//! - `monitoring`: prober, concurrency limiter, cycle runner and scheduler
//! - `events`: the event bus that streams live status to subscribers
//! - `database`: the libsql-backed target store
//! - `config`: TOML configuration

pub mod config;
pub mod database;
pub mod events;
pub mod monitoring;
pub mod pool;
pub mod validation;

pub use config::Config;
pub use database::{LibsqlTargetStore, TargetStore};
pub use events::{EventBus, ServerEvent};
pub use monitoring::{CycleRunner, CycleState, HttpProber, ProbeLimiter, Scheduler};
