//! Build scheduling for Drydock.
//!
//! Turns an ordered stream of source changes into build sets: classifies
//! each change per scheduler, debounces bursts behind a tree-stable timer
//! or waits for a cron-style instant, then transactionally creates build
//! requests and retires the consumed changes.

pub mod basic;
pub mod buildset;
pub mod classify;
pub mod config;
pub mod error;
pub mod hub;
pub mod priority;
pub mod timed;

pub use basic::BasicScheduler;
pub use buildset::create_buildset;
pub use classify::{ChangeFilter, CustomPredicate, ImportancePolicy, classify_new_changes};
pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use hub::{Scheduler, SchedulerHub};
pub use priority::{Priority, PriorityContext, PriorityFn};
pub use timed::{Nightly, Schedule, TimeSpec};
