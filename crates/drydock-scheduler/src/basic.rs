//! Stability-debounce scheduler.
//!
//! Waits for a quiet window after the last important change before
//! triggering, so a burst of rapid pushes produces one build set instead
//! of one per commit.

use crate::buildset::create_buildset;
use crate::classify::classify_new_changes;
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use chrono::{DateTime, Duration, Utc};
use drydock_core::{BuildSetId, NewSourceStamp, Properties, SourceStampId};
use drydock_db::{ClassifiedChanges, StateStore, StoreTx};
use std::sync::Arc;
use tracing::info;

/// A scheduler that triggers `tree_stable_timer` after the newest
/// important change, or immediately per important change when no timer is
/// configured.
pub struct BasicScheduler {
    config: SchedulerConfig,
    /// Quiet window. `None` means immediate mode.
    tree_stable_timer: Option<Duration>,
    store: Arc<dyn StateStore>,
}

impl BasicScheduler {
    pub fn new(
        config: SchedulerConfig,
        tree_stable_timer: Option<Duration>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(window) = tree_stable_timer {
            if window < Duration::zero() {
                return Err(SchedulerError::Configuration(format!(
                    "scheduler '{}' has a negative stable timer",
                    config.name
                )));
            }
        }
        Ok(Self {
            config,
            tree_stable_timer,
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// One tick: classify new changes, then trigger if the tree has been
    /// quiet long enough. Returns the time of the pending trigger when the
    /// window is still open, `None` when there is nothing pending.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        classify_new_changes(self.store.as_ref(), &self.config.name, &self.config.policy())
            .await?;

        let classified = self.store.get_classified(&self.config.name).await?;
        let Some(newest) = classified.important.last() else {
            return Ok(None);
        };

        let fire_at = match self.tree_stable_timer {
            Some(window) => newest.when + window,
            None => now,
        };
        if now < fire_at {
            return Ok(Some(fire_at));
        }

        self.trigger(&classified, now).await?;
        Ok(None)
    }

    /// Create the build set for the accumulated important changes, retire
    /// every classified entry and advance the watermark, as one
    /// transaction.
    async fn trigger(&self, classified: &ClassifiedChanges, now: DateTime<Utc>) -> Result<BuildSetId> {
        let name = &self.config.name;
        let mut tx = self.store.begin().await?;

        let stamp =
            NewSourceStamp::spanning(self.config.branch.clone(), classified.important.iter());
        let ssid = tx.insert_sourcestamp(stamp).await?;

        let reason = format!(
            "scheduler '{}': tree stable after {} change(s)",
            name,
            classified.important.len()
        );
        let mut properties = Properties::new();
        for change in &classified.important {
            properties.update_from(&change.properties);
        }
        let buildset = create_buildset(
            &mut *tx,
            ssid,
            &reason,
            &properties,
            &self.config.builder_names,
            &self.config.priority,
        )
        .await?;

        let consumed = classified.all_ids();
        tx.retire(name, &consumed).await?;

        let mut state = tx.get_state(name).await?;
        if let Some(max) = consumed.iter().max() {
            state.last_processed = state.last_processed.max(*max);
        }
        state.last_build = now;
        tx.set_state(name, state).await?;
        tx.commit().await?;

        info!(
            scheduler = %name,
            buildset = %buildset,
            changes = consumed.len(),
            "triggered build set"
        );
        Ok(buildset)
    }

    /// Create a build set for an existing source stamp on the caller's
    /// transaction, using this scheduler's builders and priority policy.
    pub async fn create_buildset(
        &self,
        tx: &mut dyn StoreTx,
        sourcestamp: SourceStampId,
        reason: &str,
    ) -> Result<BuildSetId> {
        create_buildset(
            tx,
            sourcestamp,
            reason,
            &Properties::new(),
            &self.config.builder_names,
            &self.config.priority,
        )
        .await
    }
}
