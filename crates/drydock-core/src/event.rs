//! Status event capability.
//!
//! Anything a status view can render implements [`StatusEvent`]: a start
//! and optional finish time, a few lines of display text and zero or more
//! log references. Changes implement it directly; one-off annotations use
//! the generic [`Event`] record.

use crate::change::Change;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named pointer to a log kept elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRef {
    pub name: String,
    pub url: String,
}

pub trait StatusEvent {
    /// Start time and, if the event has ended, finish time.
    fn times(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>);
    fn text(&self) -> Vec<String>;
    fn logs(&self) -> Vec<LogRef>;
}

/// A free-standing status event not tied to a change record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub who: String,
    pub files: Vec<String>,
    pub comments: String,
    pub when: DateTime<Utc>,
    pub text: Vec<String>,
    pub logs: Vec<LogRef>,
}

impl StatusEvent for Event {
    fn times(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        (self.when, None)
    }

    fn text(&self) -> Vec<String> {
        self.text.clone()
    }

    fn logs(&self) -> Vec<LogRef> {
        self.logs.clone()
    }
}

impl StatusEvent for Change {
    fn times(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        // A change is instantaneous.
        (self.when, Some(self.when))
    }

    fn text(&self) -> Vec<String> {
        vec![self.who.clone(), self.comments.clone()]
    }

    fn logs(&self) -> Vec<LogRef> {
        self.links
            .iter()
            .map(|l| LogRef {
                name: l.substring.clone(),
                url: l.url.clone(),
            })
            .collect()
    }
}
