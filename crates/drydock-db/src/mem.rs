//! In-memory state store.
//!
//! Backs unit tests and single-process embedding. Transactions stage a
//! copy of the whole store and swap it in on commit, so rollback-on-drop
//! and all-or-nothing visibility hold exactly as they do for SQLite.

use crate::error::{StoreError, StoreResult};
use crate::store::{ClassifiedChanges, StateStore, StoreTx};
use async_trait::async_trait;
use chrono::Utc;
use drydock_core::{
    BuildRequest, BuildRequestId, BuildSet, BuildSetId, Change, ChangeId, NewChange,
    NewSourceStamp, SchedulerState, SourceStamp, SourceStampId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct MemData {
    changes: Vec<Change>,
    next_change_id: i64,
    states: HashMap<String, SchedulerState>,
    /// Per scheduler: (change id, important) in classification order.
    classified: HashMap<String, Vec<(ChangeId, bool)>>,
    sourcestamps: Vec<SourceStamp>,
    buildsets: Vec<BuildSet>,
    buildrequests: Vec<BuildRequest>,
}

impl MemData {
    fn change(&self, id: ChangeId) -> Option<&Change> {
        self.changes.iter().find(|c| c.id == id)
    }

    fn classified_for(&self, scheduler: &str) -> ClassifiedChanges {
        let mut out = ClassifiedChanges::default();
        for (id, important) in self.classified.get(scheduler).into_iter().flatten() {
            if let Some(change) = self.change(*id) {
                if *important {
                    out.important.push(change.clone());
                } else {
                    out.unimportant.push(change.clone());
                }
            }
        }
        out
    }
}

/// In-memory [`StateStore`]. Cloning shares the underlying data, the way
/// cloning a connection pool does.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    data: Arc<Mutex<MemData>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored source stamps, for assertions.
    pub async fn sourcestamps(&self) -> Vec<SourceStamp> {
        self.data.lock().await.sourcestamps.clone()
    }

    /// Stored build sets, for assertions.
    pub async fn buildsets(&self) -> Vec<BuildSet> {
        self.data.lock().await.buildsets.clone()
    }
}

#[async_trait]
impl StateStore for MemStore {
    async fn add_change(&self, new: NewChange) -> StoreResult<Change> {
        let mut data = self.data.lock().await;
        data.next_change_id += 1;
        let change = new.into_change(ChangeId::new(data.next_change_id), Utc::now());
        data.changes.push(change.clone());
        Ok(change)
    }

    async fn get_change(&self, id: ChangeId) -> StoreResult<Option<Change>> {
        Ok(self.data.lock().await.change(id).cloned())
    }

    async fn latest_change_id(&self) -> StoreResult<Option<ChangeId>> {
        Ok(self.data.lock().await.changes.last().map(|c| c.id))
    }

    async fn changes_since(&self, last: ChangeId) -> StoreResult<Vec<Change>> {
        let data = self.data.lock().await;
        Ok(data
            .changes
            .iter()
            .filter(|c| c.id > last)
            .cloned()
            .collect())
    }

    async fn get_state(&self, scheduler: &str) -> StoreResult<SchedulerState> {
        let data = self.data.lock().await;
        Ok(data
            .states
            .get(scheduler)
            .copied()
            .unwrap_or_else(SchedulerState::absent))
    }

    async fn get_classified(&self, scheduler: &str) -> StoreResult<ClassifiedChanges> {
        Ok(self.data.lock().await.classified_for(scheduler))
    }

    async fn buildrequests(&self) -> StoreResult<Vec<BuildRequest>> {
        Ok(self.data.lock().await.buildrequests.clone())
    }

    async fn get_sourcestamp(&self, id: SourceStampId) -> StoreResult<Option<SourceStamp>> {
        let data = self.data.lock().await;
        Ok(data.sourcestamps.iter().find(|s| s.id == id).cloned())
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.data.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemTx { guard, staged }))
    }
}

/// A staged copy of the store; swapped in atomically on commit, discarded
/// on drop. The owned guard serializes transactions.
struct MemTx {
    guard: OwnedMutexGuard<MemData>,
    staged: MemData,
}

#[async_trait]
impl StoreTx for MemTx {
    async fn get_state(&mut self, scheduler: &str) -> StoreResult<SchedulerState> {
        Ok(self
            .staged
            .states
            .get(scheduler)
            .copied()
            .unwrap_or_else(SchedulerState::absent))
    }

    async fn set_state(&mut self, scheduler: &str, state: SchedulerState) -> StoreResult<()> {
        self.staged.states.insert(scheduler.to_string(), state);
        Ok(())
    }

    async fn changes_since(&mut self, last: ChangeId) -> StoreResult<Vec<Change>> {
        Ok(self
            .staged
            .changes
            .iter()
            .filter(|c| c.id > last)
            .cloned()
            .collect())
    }

    async fn get_classified(&mut self, scheduler: &str) -> StoreResult<ClassifiedChanges> {
        Ok(self.staged.classified_for(scheduler))
    }

    async fn classify(
        &mut self,
        scheduler: &str,
        change: ChangeId,
        important: bool,
    ) -> StoreResult<()> {
        if self.staged.change(change).is_none() {
            return Err(StoreError::NotFound(format!("change {change}")));
        }
        let entries = self.staged.classified.entry(scheduler.to_string()).or_default();
        entries.retain(|(id, _)| *id != change);
        entries.push((change, important));
        Ok(())
    }

    async fn retire(&mut self, scheduler: &str, ids: &[ChangeId]) -> StoreResult<()> {
        if let Some(entries) = self.staged.classified.get_mut(scheduler) {
            entries.retain(|(id, _)| !ids.contains(id));
        }
        Ok(())
    }

    async fn insert_sourcestamp(&mut self, new: NewSourceStamp) -> StoreResult<SourceStampId> {
        let id = SourceStampId::new(self.staged.sourcestamps.len() as i64 + 1);
        self.staged.sourcestamps.push(SourceStamp {
            id,
            branch: new.branch,
            revision: new.revision,
            change_ids: new.change_ids,
        });
        Ok(id)
    }

    async fn insert_buildset(
        &mut self,
        sourcestamp: SourceStampId,
        reason: &str,
    ) -> StoreResult<BuildSetId> {
        let id = BuildSetId::new(self.staged.buildsets.len() as i64 + 1);
        self.staged.buildsets.push(BuildSet {
            id,
            sourcestamp_id: sourcestamp,
            reason: reason.to_string(),
            submitted_at: Utc::now(),
        });
        Ok(id)
    }

    async fn insert_buildrequest(
        &mut self,
        buildset: BuildSetId,
        builder_name: &str,
        priority: i32,
    ) -> StoreResult<BuildRequestId> {
        let id = BuildRequestId::new(self.staged.buildrequests.len() as i64 + 1);
        self.staged.buildrequests.push(BuildRequest {
            id,
            buildset_id: buildset,
            builder_name: builder_name.to_string(),
            priority,
            submitted_at: Utc::now(),
        });
        Ok(id)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_change_ids_are_sequential() {
        let store = MemStore::new();
        let a = store
            .add_change(NewChange::new("a", vec![], ""))
            .await
            .unwrap();
        let b = store
            .add_change(NewChange::new("b", vec![], ""))
            .await
            .unwrap();
        assert_eq!(a.id, ChangeId::new(1));
        assert_eq!(b.id, ChangeId::new(2));
        assert_eq!(store.latest_change_id().await.unwrap(), Some(b.id));
    }

    #[tokio::test]
    async fn test_changes_since_requeries() {
        let store = MemStore::new();
        store
            .add_change(NewChange::new("a", vec![], ""))
            .await
            .unwrap();
        assert_eq!(store.changes_since(ChangeId::new(0)).await.unwrap().len(), 1);
        store
            .add_change(NewChange::new("b", vec![], ""))
            .await
            .unwrap();
        let since = store.changes_since(ChangeId::new(1)).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, ChangeId::new(2));
    }

    #[tokio::test]
    async fn test_absent_state_is_defaulted() {
        let store = MemStore::new();
        let state = store.get_state("nobody").await.unwrap();
        assert_eq!(state.last_processed, ChangeId::new(0));
        assert!(!state.has_built());
    }

    #[tokio::test]
    async fn test_uncommitted_tx_rolls_back() {
        let store = MemStore::new();
        let change = store
            .add_change(NewChange::new("a", vec![], ""))
            .await
            .unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.classify("sched", change.id, true).await.unwrap();
            // dropped without commit
        }
        assert!(store.get_classified("sched").await.unwrap().is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.classify("sched", change.id, true).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.get_classified("sched").await.unwrap().important.len(), 1);
    }

    #[tokio::test]
    async fn test_retire_clears_both_partitions() {
        let store = MemStore::new();
        let a = store
            .add_change(NewChange::new("a", vec![], ""))
            .await
            .unwrap();
        let b = store
            .add_change(NewChange::new("b", vec![], ""))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.classify("sched", a.id, true).await.unwrap();
        tx.classify("sched", b.id, false).await.unwrap();
        tx.retire("sched", &[a.id, b.id]).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.get_classified("sched").await.unwrap().is_empty());
    }
}
