//! Source stamps.

use crate::id::{ChangeId, SourceStampId};
use serde::{Deserialize, Serialize};

/// A frozen description of "the code state to build": a branch, a revision
/// and the set of changes it subsumes. Created at build-request time and
/// never mutated; build requests reference it, they do not own it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub id: SourceStampId,
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub change_ids: Vec<ChangeId>,
}

/// A source stamp before durable insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSourceStamp {
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub change_ids: Vec<ChangeId>,
}

impl NewSourceStamp {
    /// Build a stamp spanning a set of changes. The branch falls back to
    /// the branch of the last change when no explicit branch is given, and
    /// the revision is taken from the newest change.
    pub fn spanning<'a>(
        branch: Option<String>,
        changes: impl IntoIterator<Item = &'a crate::Change>,
    ) -> Self {
        let mut change_ids = Vec::new();
        let mut last_branch = None;
        let mut revision = None;
        for change in changes {
            change_ids.push(change.id);
            last_branch = change.branch.clone();
            revision = change.revision.clone();
        }
        Self {
            branch: branch.or(last_branch),
            revision,
            change_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::NewChange;
    use crate::id::ChangeId;
    use chrono::Utc;

    #[test]
    fn test_spanning_takes_branch_and_revision_from_newest() {
        let now = Utc::now();
        let a = NewChange::new("a", vec![], "")
            .branch("dev")
            .revision("r1")
            .into_change(ChangeId::new(1), now);
        let b = NewChange::new("b", vec![], "")
            .branch("dev")
            .revision("r2")
            .into_change(ChangeId::new(2), now);

        let ss = NewSourceStamp::spanning(None, [&a, &b]);
        assert_eq!(ss.branch.as_deref(), Some("dev"));
        assert_eq!(ss.revision.as_deref(), Some("r2"));
        assert_eq!(ss.change_ids, vec![ChangeId::new(1), ChangeId::new(2)]);
    }

    #[test]
    fn test_explicit_branch_wins() {
        let now = Utc::now();
        let a = NewChange::new("a", vec![], "")
            .branch("dev")
            .into_change(ChangeId::new(1), now);
        let ss = NewSourceStamp::spanning(Some("release".into()), [&a]);
        assert_eq!(ss.branch.as_deref(), Some("release"));
    }
}
