//! Build request priority.

use crate::error::{Result, SchedulerError};
use drydock_core::{Properties, SourceStampId};
use std::sync::Arc;

/// Everything a computed resolver may look at. The resolver runs once per
/// builder per triggered build, so builders in the same trigger can get
/// different priorities.
#[derive(Debug)]
pub struct PriorityContext<'a> {
    pub sourcestamp: SourceStampId,
    pub reason: &'a str,
    pub properties: &'a Properties,
    pub builder_name: &'a str,
}

/// A computed priority resolver. Must be a pure function of its context.
pub type PriorityFn =
    Arc<dyn Fn(&PriorityContext<'_>) -> std::result::Result<i32, String> + Send + Sync>;

/// Priority policy for a scheduler: a fixed integer or a computed resolver.
#[derive(Clone)]
pub enum Priority {
    Constant(i32),
    Computed(PriorityFn),
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Constant(0)
    }
}

impl Priority {
    /// Resolve the priority for one builder. A resolver failure aborts the
    /// enclosing build-set transaction (fail-closed).
    pub fn resolve(&self, ctx: &PriorityContext<'_>) -> Result<i32> {
        match self {
            Priority::Constant(p) => Ok(*p),
            Priority::Computed(f) => f(ctx).map_err(SchedulerError::PriorityResolution),
        }
    }
}

impl std::fmt::Debug for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Constant(p) => f.debug_tuple("Constant").field(p).finish(),
            Priority::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}
