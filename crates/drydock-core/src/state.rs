//! Durable per-scheduler state.

use crate::id::ChangeId;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Current persisted record version. Bump when the shape changes and add a
/// branch to [`SchedulerState::from_record`].
const STATE_VERSION: u32 = 1;

/// Durable state owned by a single scheduler: the classification watermark
/// and the timestamp of the most recent triggered build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub last_processed: ChangeId,
    pub last_build: DateTime<Utc>,
}

impl SchedulerState {
    /// The state handed to a scheduler that has never run: a zero watermark
    /// and a far-future `last_build` sentinel meaning "no build recorded".
    /// A scheduler never fails merely because it is new.
    pub fn absent() -> Self {
        Self {
            last_processed: ChangeId::new(0),
            last_build: DateTime::<Utc>::MAX_UTC,
        }
    }

    /// True when `last_build` still holds the never-built sentinel.
    pub fn has_built(&self) -> bool {
        self.last_build < DateTime::<Utc>::MAX_UTC
    }

    /// Serialize to the current persisted record shape.
    pub fn to_record(&self) -> Value {
        serde_json::json!({
            "version": STATE_VERSION,
            "last_processed": self.last_processed,
            "last_build": self.last_build,
        })
    }

    /// Load from a persisted record, migrating older shapes to the current
    /// version in one step. Version-0 records (no `version` key) stored
    /// `last_build` as unix epoch seconds and could omit either field;
    /// anything missing gets the documented default rather than leaving
    /// optional-field checks scattered through scheduler logic.
    pub fn from_record(record: &Value) -> Self {
        let version = record.get("version").and_then(Value::as_u64).unwrap_or(0);
        let mut state = Self::absent();

        match version {
            0 => {
                if let Some(n) = record.get("last_processed").and_then(Value::as_i64) {
                    state.last_processed = ChangeId::new(n);
                }
                if let Some(secs) = record.get("last_build").and_then(Value::as_f64) {
                    if let Some(when) = Utc.timestamp_opt(secs as i64, 0).single() {
                        state.last_build = when;
                    }
                }
                info!(?state, "migrated version-0 scheduler state record");
            }
            _ => {
                if let Some(n) = record
                    .get("last_processed")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                {
                    state.last_processed = n;
                }
                if let Some(when) = record
                    .get("last_build")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                {
                    state.last_build = when;
                }
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_round_trip_current_version() {
        let state = SchedulerState {
            last_processed: ChangeId::new(42),
            last_build: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        let back = SchedulerState::from_record(&state.to_record());
        assert_eq!(back, state);
    }

    #[test]
    fn test_legacy_record_migrates() {
        let record = json!({"last_processed": 7, "last_build": 1_600_000_000.0});
        let state = SchedulerState::from_record(&record);
        assert_eq!(state.last_processed, ChangeId::new(7));
        assert_eq!(state.last_build, Utc.timestamp_opt(1_600_000_000, 0).unwrap());
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let state = SchedulerState::from_record(&json!({}));
        assert_eq!(state, SchedulerState::absent());
        assert!(!state.has_built());
    }
}
