//! Scheduler hub: change fan-out and per-scheduler worker loops.
//!
//! Each registered scheduler gets its own task and its own logical timer;
//! there is no lock shared across schedulers, only the state store.

use crate::basic::BasicScheduler;
use crate::error::Result;
use crate::timed::Nightly;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drydock_core::{Change, NewChange};
use drydock_db::StateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Delay before retrying a tick that failed on storage. The failed tick's
/// timer state was never advanced, so the retry repeats the same work.
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Anything the hub can drive: one tick of scheduler logic returning the
/// next wall-clock wakeup, or `None` to sleep until the next change.
#[async_trait]
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>>;
}

#[async_trait]
impl Scheduler for BasicScheduler {
    fn name(&self) -> &str {
        BasicScheduler::name(self)
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        BasicScheduler::run(self, now).await
    }
}

#[async_trait]
impl Scheduler for Nightly {
    fn name(&self) -> &str {
        Nightly::name(self)
    }

    async fn run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        Nightly::run(self, now).await
    }
}

struct Registration {
    scheduler: Arc<dyn Scheduler>,
    notify: Arc<Notify>,
}

/// Owns the registered schedulers and fans incoming changes out to them.
pub struct SchedulerHub {
    store: Arc<dyn StateStore>,
    registrations: Vec<Registration>,
}

impl SchedulerHub {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            registrations: Vec::new(),
        }
    }

    pub fn register(&mut self, scheduler: Arc<dyn Scheduler>) {
        info!(scheduler = scheduler.name(), "registered scheduler");
        self.registrations.push(Registration {
            scheduler,
            notify: Arc::new(Notify::new()),
        });
    }

    /// Durably record a pushed change and wake every scheduler to classify
    /// it.
    pub async fn add_change(&self, new: NewChange) -> Result<Change> {
        let change = self.store.add_change(new).await?;
        info!(change = %change.id, who = %change.who, "recorded change");
        for registration in &self.registrations {
            registration.notify.notify_one();
        }
        Ok(change)
    }

    /// Spawn one worker task per registered scheduler.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        self.registrations
            .iter()
            .map(|registration| {
                let scheduler = registration.scheduler.clone();
                let notify = registration.notify.clone();
                tokio::spawn(worker_loop(scheduler, notify))
            })
            .collect()
    }
}

/// Drive one scheduler: tick, then sleep until its next fire time or the
/// next change notification, whichever comes first.
async fn worker_loop(scheduler: Arc<dyn Scheduler>, notify: Arc<Notify>) {
    info!(scheduler = scheduler.name(), "starting scheduler worker");
    loop {
        match scheduler.run(Utc::now()).await {
            Ok(Some(next)) => {
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = notify.notified() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Ok(None) => notify.notified().await,
            Err(err) => {
                warn!(
                    scheduler = scheduler.name(),
                    error = %err,
                    "scheduler tick failed; retrying"
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use drydock_db::MemStore;

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("drydock_scheduler=debug")
            .try_init();
    }

    #[tokio::test]
    async fn test_pushed_change_reaches_a_running_scheduler() {
        init_logging();
        let store = MemStore::new();
        let shared: Arc<dyn StateStore> = Arc::new(store.clone());

        let mut hub = SchedulerHub::new(shared.clone());
        // immediate mode: no debounce window to wait out
        let scheduler =
            BasicScheduler::new(SchedulerConfig::new("push", ["tbuild"]), None, shared).unwrap();
        hub.register(Arc::new(scheduler));
        let workers = hub.spawn();

        hub.add_change(NewChange::new("alice", vec![], "push me"))
            .await
            .unwrap();

        // the worker owns the trigger; poll briefly for its result
        let mut triggered = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.buildrequests().await.unwrap().len() == 1 {
                triggered = true;
                break;
            }
        }
        assert!(triggered, "change never turned into a build request");

        for worker in workers {
            worker.abort();
        }
    }

    #[tokio::test]
    async fn test_independent_schedulers_classify_independently() {
        let store = MemStore::new();
        let shared: Arc<dyn StateStore> = Arc::new(store.clone());

        let main_only = BasicScheduler::new(
            SchedulerConfig::new("main-only", ["tbuild"]).branch("main"),
            None,
            shared.clone(),
        )
        .unwrap();
        let dev_only = BasicScheduler::new(
            SchedulerConfig::new("dev-only", ["tbuild"]).branch("dev"),
            None,
            shared.clone(),
        )
        .unwrap();

        let mut hub = SchedulerHub::new(shared);
        hub.register(Arc::new(main_only));
        hub.register(Arc::new(dev_only));

        hub.add_change(NewChange::new("alice", vec![], "").branch("main"))
            .await
            .unwrap();

        // drive both schedulers one tick by hand
        for registration in &hub.registrations {
            registration.scheduler.run(Utc::now()).await.unwrap();
        }

        // important for one, unimportant bookkeeping for the other
        assert_eq!(store.get_classified("main-only").await.unwrap().len(), 0); // consumed
        assert_eq!(
            store.get_classified("dev-only").await.unwrap().unimportant.len(),
            1
        );
        assert_eq!(store.buildrequests().await.unwrap().len(), 1);
    }
}
