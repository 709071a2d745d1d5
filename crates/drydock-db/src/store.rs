//! State store traits.
//!
//! The store is the only shared mutable resource in the scheduler. Every
//! trigger sequence (read classified set, create a build set, retire the
//! consumed changes, advance the watermark) runs on one [`StoreTx`] so a
//! crash between steps can neither duplicate a trigger nor drop changes.

use crate::error::StoreResult;
use async_trait::async_trait;
use drydock_core::{
    BuildRequest, BuildRequestId, BuildSetId, Change, ChangeId, NewChange, NewSourceStamp,
    SchedulerState, SourceStamp, SourceStampId,
};

/// The per-scheduler partition of changes awaiting a trigger decision,
/// each sequence ordered by change identity. A change identity appears in
/// at most one of the two partitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedChanges {
    pub important: Vec<Change>,
    pub unimportant: Vec<Change>,
}

impl ClassifiedChanges {
    pub fn len(&self) -> usize {
        self.important.len() + self.unimportant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.important.is_empty() && self.unimportant.is_empty()
    }

    /// Identities in both partitions.
    pub fn all_ids(&self) -> Vec<ChangeId> {
        self.important
            .iter()
            .chain(self.unimportant.iter())
            .map(|c| c.id)
            .collect()
    }
}

/// Durable, transactional storage for scheduler state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert a change, assigning the next identity. Future timestamps are
    /// clamped to now.
    async fn add_change(&self, new: NewChange) -> StoreResult<Change>;

    async fn get_change(&self, id: ChangeId) -> StoreResult<Option<Change>>;

    /// Highest assigned change identity, if any change exists.
    async fn latest_change_id(&self) -> StoreResult<Option<ChangeId>>;

    /// All changes with identity greater than `last`, in increasing
    /// identity order. Each call re-queries current state.
    async fn changes_since(&self, last: ChangeId) -> StoreResult<Vec<Change>>;

    async fn get_state(&self, scheduler: &str) -> StoreResult<SchedulerState>;

    async fn get_classified(&self, scheduler: &str) -> StoreResult<ClassifiedChanges>;

    /// Pending build requests in insertion order, as the executor sees them.
    async fn buildrequests(&self) -> StoreResult<Vec<BuildRequest>>;

    async fn get_sourcestamp(&self, id: SourceStampId) -> StoreResult<Option<SourceStamp>>;

    /// Open a transaction. Dropping the returned handle without calling
    /// [`StoreTx::commit`] rolls everything back.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One open transaction against the state store.
#[async_trait]
pub trait StoreTx: Send {
    async fn get_state(&mut self, scheduler: &str) -> StoreResult<SchedulerState>;

    async fn set_state(&mut self, scheduler: &str, state: SchedulerState) -> StoreResult<()>;

    async fn changes_since(&mut self, last: ChangeId) -> StoreResult<Vec<Change>>;

    async fn get_classified(&mut self, scheduler: &str) -> StoreResult<ClassifiedChanges>;

    /// Record one change's importance for one scheduler.
    async fn classify(
        &mut self,
        scheduler: &str,
        change: ChangeId,
        important: bool,
    ) -> StoreResult<()>;

    /// Remove the given identities from both partitions.
    async fn retire(&mut self, scheduler: &str, ids: &[ChangeId]) -> StoreResult<()>;

    async fn insert_sourcestamp(&mut self, new: NewSourceStamp) -> StoreResult<SourceStampId>;

    async fn insert_buildset(
        &mut self,
        sourcestamp: SourceStampId,
        reason: &str,
    ) -> StoreResult<BuildSetId>;

    async fn insert_buildrequest(
        &mut self,
        buildset: BuildSetId,
        builder_name: &str,
        priority: i32,
    ) -> StoreResult<BuildRequestId>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
