//! Change classification.
//!
//! Every scheduler classifies every new change exactly once, durably,
//! whether or not the change is important to it: eviction and auditing
//! depend on the bookkeeping being complete.

use crate::error::{Result, SchedulerError};
use drydock_core::Change;
use drydock_db::StateStore;
use std::sync::Arc;
use tracing::debug;

/// A caller-supplied importance predicate.
pub type CustomPredicate =
    Arc<dyn Fn(&Change) -> std::result::Result<bool, String> + Send + Sync>;

/// The default importance policy: branch equality and category membership.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    /// `None` accepts every branch.
    pub branch: Option<String>,
    /// Empty accepts every category.
    pub categories: Vec<String>,
}

impl ChangeFilter {
    pub fn matches(&self, change: &Change) -> bool {
        if let Some(branch) = &self.branch {
            if change.branch.as_deref() != Some(branch.as_str()) {
                return false;
            }
        }
        if !self.categories.is_empty() {
            match &change.category {
                Some(cat) => {
                    if !self.categories.iter().any(|c| c == cat) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// How a scheduler decides importance: the default filter or a custom
/// predicate with the same signature.
#[derive(Clone)]
pub enum ImportancePolicy {
    Filter(ChangeFilter),
    Custom(CustomPredicate),
}

impl ImportancePolicy {
    pub fn is_important(&self, change: &Change) -> Result<bool> {
        match self {
            ImportancePolicy::Filter(filter) => Ok(filter.matches(change)),
            ImportancePolicy::Custom(predicate) => {
                predicate(change).map_err(SchedulerError::Classification)
            }
        }
    }
}

impl std::fmt::Debug for ImportancePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportancePolicy::Filter(filter) => f.debug_tuple("Filter").field(filter).finish(),
            ImportancePolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Classify all changes past the scheduler's watermark, in increasing
/// identity order, advancing the watermark per change.
///
/// A predicate failure stops the walk before the failing change: the
/// successfully classified prefix and its watermark commit, the failing
/// change stays unclassified and is picked up again on the next pass.
pub async fn classify_new_changes(
    store: &dyn StateStore,
    scheduler: &str,
    policy: &ImportancePolicy,
) -> Result<usize> {
    let mut tx = store.begin().await?;
    let mut state = tx.get_state(scheduler).await?;
    let changes = tx.changes_since(state.last_processed).await?;

    let mut classified = 0;
    let mut failure = None;
    for change in &changes {
        match policy.is_important(change) {
            Ok(important) => {
                tx.classify(scheduler, change.id, important).await?;
                state.last_processed = change.id;
                classified += 1;
                debug!(scheduler, change = %change.id, important, "classified change");
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }
    tx.set_state(scheduler, state).await?;
    tx.commit().await?;

    match failure {
        Some(err) => Err(err),
        None => Ok(classified),
    }
}
