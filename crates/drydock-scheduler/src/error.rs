//! Scheduler error taxonomy.

use drydock_db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid construction-time configuration. Fatal to scheduler
    /// startup, never silently defaulted.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A custom importance predicate failed. The change in question stays
    /// unclassified and is retried on the next classification pass.
    #[error("classification failed: {0}")]
    Classification(String),

    /// A computed priority resolver failed. The whole build-set
    /// transaction is aborted; no partial build requests persist.
    #[error("priority resolution failed: {0}")]
    PriorityResolution(String),

    /// Storage failure. Timer state is not advanced, so the next tick
    /// retries the same work.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
