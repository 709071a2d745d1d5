//! Timed ("nightly") scheduler.
//!
//! Triggers on a wall-clock schedule independent of change volume,
//! optionally gated on whether anything important accumulated since the
//! last run.

use crate::buildset::create_buildset;
use crate::classify::classify_new_changes;
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use drydock_core::{BuildSetId, NewSourceStamp, Properties};
use drydock_db::StateStore;
use std::sync::Arc;
use tracing::{info, warn};

/// One cron-style field: a wildcard, a fixed value or a set of values.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeSpec {
    Any,
    At(u32),
    AnyOf(Vec<u32>),
}

impl TimeSpec {
    fn matches(&self, value: u32) -> bool {
        match self {
            TimeSpec::Any => true,
            TimeSpec::At(v) => *v == value,
            TimeSpec::AnyOf(vs) => vs.contains(&value),
        }
    }

    fn is_restricted(&self) -> bool {
        !matches!(self, TimeSpec::Any)
    }

    fn validate(&self, min: u32, max: u32, field: &str) -> Result<()> {
        let check = |v: u32| {
            if v < min || v > max {
                Err(SchedulerError::Configuration(format!(
                    "{field} value {v} outside {min}..={max}"
                )))
            } else {
                Ok(())
            }
        };
        match self {
            TimeSpec::Any => Ok(()),
            TimeSpec::At(v) => check(*v),
            TimeSpec::AnyOf(vs) => {
                if vs.is_empty() {
                    return Err(SchedulerError::Configuration(format!(
                        "{field} value set is empty"
                    )));
                }
                vs.iter().try_for_each(|v| check(*v))
            }
        }
    }
}

/// A five-field wall-clock schedule. `day_of_week` counts 0 = Monday.
/// When both day fields are restricted the usual cron rule applies: a day
/// matching either field fires.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub minute: TimeSpec,
    pub hour: TimeSpec,
    pub day_of_month: TimeSpec,
    pub month: TimeSpec,
    pub day_of_week: TimeSpec,
}

impl Default for Schedule {
    /// On the hour, every hour.
    fn default() -> Self {
        Self {
            minute: TimeSpec::At(0),
            hour: TimeSpec::Any,
            day_of_month: TimeSpec::Any,
            month: TimeSpec::Any,
            day_of_week: TimeSpec::Any,
        }
    }
}

/// Scan bound for [`Schedule::next_after`]: a leap year of minutes.
const SCAN_LIMIT_MINUTES: i64 = 366 * 24 * 60;

impl Schedule {
    pub fn validate(&self) -> Result<()> {
        self.minute.validate(0, 59, "minute")?;
        self.hour.validate(0, 23, "hour")?;
        self.day_of_month.validate(1, 31, "day-of-month")?;
        self.month.validate(1, 12, "month")?;
        self.day_of_week.validate(0, 6, "day-of-week")?;
        Ok(())
    }

    fn day_matches(&self, t: DateTime<Utc>) -> bool {
        let dom = self.day_of_month.matches(t.day());
        let dow = self.day_of_week.matches(t.weekday().num_days_from_monday());
        if self.day_of_month.is_restricted() && self.day_of_week.is_restricted() {
            dom || dow
        } else {
            dom && dow
        }
    }

    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        self.minute.matches(t.minute())
            && self.hour.matches(t.hour())
            && self.month.matches(t.month())
            && self.day_matches(t)
    }

    /// First matching instant strictly after `t`, or `None` when the
    /// fields never line up (February 31st and the like).
    pub fn next_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = (t + Duration::minutes(1))
            .with_second(0)?
            .with_nanosecond(0)?;
        for _ in 0..SCAN_LIMIT_MINUTES {
            if self.matches(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

/// Wall-clock scheduler. Fires at each scheduled instant; with
/// `only_if_changed` it additionally tracks change classification and
/// skips instants where nothing important accumulated.
pub struct Nightly {
    config: SchedulerConfig,
    schedule: Schedule,
    only_if_changed: bool,
    /// Maximum classified changes to keep queued; beyond it the queue is
    /// considered stale and discarded without building.
    retention: Option<usize>,
    store: Arc<dyn StateStore>,
    next_fire: tokio::sync::Mutex<Option<DateTime<Utc>>>,
}

impl Nightly {
    pub fn new(
        config: SchedulerConfig,
        schedule: Schedule,
        store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        config.validate()?;
        schedule.validate()?;
        if schedule.next_after(Utc::now()).is_none() {
            return Err(SchedulerError::Configuration(format!(
                "scheduler '{}' has a schedule that can never fire",
                config.name
            )));
        }
        Ok(Self {
            config,
            schedule,
            only_if_changed: false,
            retention: None,
            store,
            next_fire: tokio::sync::Mutex::new(None),
        })
    }

    /// Skip scheduled instants with no accumulated important changes.
    pub fn only_if_changed(mut self, yes: bool) -> Self {
        self.only_if_changed = yes;
        self
    }

    /// Bound the classified-change queue; see [`Nightly::discard_classified`].
    pub fn retention(mut self, bound: usize) -> Self {
        self.retention = Some(bound);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// One tick: bookkeeping, then fire when a scheduled instant has been
    /// reached. Returns the next scheduled instant. The first tick only
    /// computes the instant, so a freshly started scheduler waits for its
    /// first scheduled time instead of firing at boot.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        if self.only_if_changed {
            classify_new_changes(self.store.as_ref(), &self.config.name, &self.config.policy())
                .await?;
        }
        if let Some(bound) = self.retention {
            let queued = self.store.get_classified(&self.config.name).await?.len();
            if queued > bound {
                warn!(
                    scheduler = %self.config.name,
                    queued,
                    bound,
                    "classified-change queue over retention bound; discarding"
                );
                self.discard_classified().await?;
            }
        }

        let mut next = self.next_fire.lock().await;
        if next.is_none() {
            *next = self.schedule.next_after(now);
        }
        if let Some(due) = *next {
            if now >= due {
                self.fire(now).await?;
                *next = self.schedule.next_after(now);
            }
        }
        Ok(*next)
    }

    /// The trigger step, run when a scheduled instant is due. One
    /// transaction: gate (or not), create the build set, retire consumed
    /// and stale entries, advance `last_build`.
    pub async fn fire(&self, now: DateTime<Utc>) -> Result<Option<BuildSetId>> {
        let name = &self.config.name;
        let mut tx = self.store.begin().await?;
        let classified = tx.get_classified(name).await?;
        let mut state = tx.get_state(name).await?;

        let buildset = if self.only_if_changed {
            if classified.important.is_empty() {
                info!(scheduler = %name, "nothing important changed; skipping scheduled build");
                None
            } else {
                let stamp = NewSourceStamp::spanning(
                    self.config.branch.clone(),
                    classified.important.iter(),
                );
                let ssid = tx.insert_sourcestamp(stamp).await?;
                let reason = format!(
                    "scheduler '{}': scheduled build of {} change(s)",
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
                if let Some(max) = consumed.iter().max() {
                    state.last_processed = state.last_processed.max(*max);
                }
                Some(buildset)
            }
        } else {
            let stamp = NewSourceStamp {
                branch: self.config.branch.clone(),
                revision: None,
                change_ids: vec![],
            };
            let ssid = tx.insert_sourcestamp(stamp).await?;
            let reason = format!("periodic build scheduled by '{name}'");
            let buildset = create_buildset(
                &mut *tx,
                ssid,
                &reason,
                &Properties::new(),
                &self.config.builder_names,
                &self.config.priority,
            )
            .await?;

            // anything classified here is stale bookkeeping, wiped rather
            // than built from ancient changes
            if !classified.is_empty() {
                tx.retire(name, &classified.all_ids()).await?;
                info!(
                    scheduler = %name,
                    expired = classified.len(),
                    "expired stale classified changes"
                );
            }
            Some(buildset)
        };

        state.last_build = now;
        tx.set_state(name, state).await?;
        tx.commit().await?;

        if let Some(buildset) = buildset {
            info!(scheduler = %name, buildset = %buildset, "triggered scheduled build");
        }
        Ok(buildset)
    }

    /// Discard every classified entry without creating a build set.
    pub async fn discard_classified(&self) -> Result<usize> {
        let name = &self.config.name;
        let mut tx = self.store.begin().await?;
        let classified = tx.get_classified(name).await?;
        let ids = classified.all_ids();
        tx.retire(name, &ids).await?;
        tx.commit().await?;
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use drydock_core::NewChange;
    use drydock_db::MemStore;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_default_schedule_is_hourly() {
        let schedule = Schedule::default();
        assert_eq!(
            schedule.next_after(at(2026, 1, 5, 10, 17)),
            Some(at(2026, 1, 5, 11, 0))
        );
        // strictly after: an exact match advances a full hour
        assert_eq!(
            schedule.next_after(at(2026, 1, 5, 11, 0)),
            Some(at(2026, 1, 5, 12, 0))
        );
    }

    #[test]
    fn test_fixed_hour_and_minute() {
        let schedule = Schedule {
            minute: TimeSpec::At(30),
            hour: TimeSpec::At(3),
            ..Schedule::default()
        };
        assert_eq!(
            schedule.next_after(at(2026, 1, 5, 10, 0)),
            Some(at(2026, 1, 6, 3, 30))
        );
    }

    #[test]
    fn test_value_sets() {
        let schedule = Schedule {
            minute: TimeSpec::AnyOf(vec![0, 30]),
            hour: TimeSpec::Any,
            ..Schedule::default()
        };
        assert_eq!(
            schedule.next_after(at(2026, 1, 5, 10, 10)),
            Some(at(2026, 1, 5, 10, 30))
        );
    }

    #[test]
    fn test_day_of_week() {
        // 2026-01-05 is a Monday; 0 = Monday
        let schedule = Schedule {
            minute: TimeSpec::At(0),
            hour: TimeSpec::At(6),
            day_of_week: TimeSpec::At(4),
            ..Schedule::default()
        };
        assert_eq!(
            schedule.next_after(at(2026, 1, 5, 0, 0)),
            Some(at(2026, 1, 9, 6, 0)) // Friday
        );
    }

    #[test]
    fn test_both_day_fields_use_or_rule() {
        let schedule = Schedule {
            minute: TimeSpec::At(0),
            hour: TimeSpec::At(0),
            day_of_month: TimeSpec::At(20),
            day_of_week: TimeSpec::At(0), // Monday
            ..Schedule::default()
        };
        // the next Monday (Jan 12) comes before the 20th
        assert_eq!(
            schedule.next_after(at(2026, 1, 5, 1, 0)),
            Some(at(2026, 1, 12, 0, 0))
        );
    }

    #[test]
    fn test_invalid_fields_are_rejected() {
        let schedule = Schedule {
            minute: TimeSpec::At(60),
            ..Schedule::default()
        };
        assert!(matches!(
            schedule.validate(),
            Err(SchedulerError::Configuration(_))
        ));

        let schedule = Schedule {
            month: TimeSpec::AnyOf(vec![]),
            ..Schedule::default()
        };
        assert!(matches!(
            schedule.validate(),
            Err(SchedulerError::Configuration(_))
        ));
    }

    fn nightly(store: &MemStore) -> Nightly {
        Nightly::new(
            SchedulerConfig::new("tsched", ["tbuild"]),
            Schedule::default(),
            Arc::new(store.clone()),
        )
        .unwrap()
    }

    async fn add_changes(store: &MemStore, n: usize) {
        for i in 0..n {
            store
                .add_change(NewChange::new("just a guy", vec![], format!("c{i}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_without_gate_changes_stay_unclassified() {
        let store = MemStore::new();
        let s = nightly(&store);
        add_changes(&store, 10).await;

        let next = s.run(Utc::now()).await.unwrap();
        assert!(next.unwrap() > Utc::now() - Duration::minutes(1));

        // no gate: the scheduler does not track classification at all,
        // and the first tick never fires
        assert_eq!(store.get_classified("tsched").await.unwrap().len(), 0);
        assert!(store.buildrequests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_with_gate_all_changes_are_classified() {
        let store = MemStore::new();
        let s = nightly(&store).only_if_changed(true);
        add_changes(&store, 10).await;

        s.run(Utc::now()).await.unwrap();

        let classified = store.get_classified("tsched").await.unwrap();
        assert_eq!(classified.len(), 10);
        assert!(store.buildrequests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gate_skips_but_advances_last_build() {
        let store = MemStore::new();
        let s = nightly(&store).only_if_changed(true);

        let now = Utc::now();
        let buildset = s.fire(now).await.unwrap();
        assert_eq!(buildset, None);
        assert!(store.buildrequests().await.unwrap().is_empty());
        assert_eq!(store.get_state("tsched").await.unwrap().last_build, now);
    }

    #[tokio::test]
    async fn test_gate_builds_and_retires_accumulated_changes() {
        let store = MemStore::new();
        let s = Nightly::new(
            SchedulerConfig::new("tsched", ["tbuild", "tbuild2"]),
            Schedule::default(),
            Arc::new(store.clone()),
        )
        .unwrap()
        .only_if_changed(true);

        add_changes(&store, 3).await;
        s.run(Utc::now()).await.unwrap(); // classification only

        let now = Utc::now();
        let buildset = s.fire(now).await.unwrap();
        assert!(buildset.is_some());

        let requests = store.buildrequests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(store.get_classified("tsched").await.unwrap().len(), 0);

        let stamps = store.sourcestamps().await;
        assert_eq!(stamps.len(), 1);
        assert_eq!(stamps[0].change_ids.len(), 3);
        assert_eq!(store.get_state("tsched").await.unwrap().last_build, now);
    }

    #[tokio::test]
    async fn test_forced_fire_expires_stale_classified_entries() {
        let store = MemStore::new();
        let s = nightly(&store);

        // stale bookkeeping from an earlier configuration
        add_changes(&store, 100).await;
        let mut tx = store.begin().await.unwrap();
        for change in tx.changes_since(drydock_core::ChangeId::new(0)).await.unwrap() {
            tx.classify("tsched", change.id, true).await.unwrap();
        }
        tx.commit().await.unwrap();
        assert_eq!(store.get_classified("tsched").await.unwrap().len(), 100);

        s.fire(Utc::now()).await.unwrap();

        // one periodic build, nothing left dangling
        assert_eq!(store.buildrequests().await.unwrap().len(), 1);
        assert_eq!(store.get_classified("tsched").await.unwrap().len(), 0);
        assert!(store.sourcestamps().await[0].change_ids.is_empty());
    }

    #[tokio::test]
    async fn test_retention_bound_discards_without_building() {
        let store = MemStore::new();
        let s = nightly(&store).only_if_changed(true).retention(10);

        add_changes(&store, 20).await;
        s.run(Utc::now()).await.unwrap();

        assert_eq!(store.get_classified("tsched").await.unwrap().len(), 0);
        assert!(store.buildrequests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_impossible_schedule_is_rejected_at_construction() {
        let store = MemStore::new();
        let result = Nightly::new(
            SchedulerConfig::new("tsched", ["tbuild"]),
            Schedule {
                minute: TimeSpec::At(0),
                hour: TimeSpec::At(0),
                day_of_month: TimeSpec::At(31),
                month: TimeSpec::At(2),
                day_of_week: TimeSpec::Any,
            },
            Arc::new(store),
        );
        assert!(matches!(result, Err(SchedulerError::Configuration(_))));
    }
}
