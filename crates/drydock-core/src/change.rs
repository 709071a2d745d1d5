//! Change records.
//!
//! A `Change` is the immutable record of one source modification. It is
//! created once by the change-ingestion side, assigned its identity at
//! durable insertion, and never mutated afterwards.

use crate::id::ChangeId;
use crate::properties::Properties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A link attached to a change: a substring of the comment text mapped to
/// a URL (bug tracker references and the like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub substring: String,
    pub url: String,
}

/// An immutable source-control change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub who: String,
    pub files: Vec<String>,
    pub comments: String,
    pub is_dir: bool,
    pub links: Vec<Link>,
    /// VCS-defined revision identifier, opaque to the scheduler.
    pub revision: Option<String>,
    /// URL pointing at this revision in a web view, if the source knows one.
    pub revlink: Option<String>,
    pub when: DateTime<Utc>,
    /// Absent means the default branch.
    pub branch: Option<String>,
    pub category: Option<String>,
    pub properties: Properties,
    pub repository: String,
    pub project: String,
}

/// A change as reported by an ingestion source, before it has an identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewChange {
    pub who: String,
    pub files: Vec<String>,
    pub comments: String,
    pub is_dir: bool,
    pub links: Vec<Link>,
    pub revision: Option<String>,
    pub revlink: Option<String>,
    /// Reported timestamp; `None` means "now at insertion".
    pub when: Option<DateTime<Utc>>,
    pub branch: Option<String>,
    pub category: Option<String>,
    pub properties: Properties,
    pub repository: String,
    pub project: String,
}

impl NewChange {
    pub fn new(who: impl Into<String>, files: Vec<String>, comments: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            files,
            comments: comments.into(),
            ..Self::default()
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn when(mut self, when: DateTime<Utc>) -> Self {
        self.when = Some(when);
        self
    }

    /// The timestamp this change will carry once inserted at `now`.
    ///
    /// A reported timestamp in the future is clamped to `now`: sources with
    /// skewed clocks must not be able to push a change "ahead" of the
    /// scheduler's own clock.
    pub fn clamped_when(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.when {
            Some(reported) if reported > now => {
                warn!(
                    who = %self.who,
                    reported = %reported,
                    clamped = %now,
                    "change reported a future timestamp; clamping"
                );
                now
            }
            Some(reported) => reported,
            None => now,
        }
    }

    /// Freeze into a full `Change` at insertion time.
    pub fn into_change(self, id: ChangeId, now: DateTime<Utc>) -> Change {
        let when = self.clamped_when(now);
        Change {
            id,
            who: self.who,
            files: self.files,
            comments: self.comments,
            is_dir: self.is_dir,
            links: self.links,
            revision: self.revision,
            revlink: self.revlink,
            when,
            branch: self.branch,
            category: self.category,
            properties: self.properties,
            repository: self.repository,
            project: self.project,
        }
    }
}
