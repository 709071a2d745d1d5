//! Build sets and build requests.

use crate::id::{BuildRequestId, BuildSetId, SourceStampId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The atomic unit of triggered work: one source stamp plus one build
/// request per target builder, inserted in a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSet {
    pub id: BuildSetId,
    pub sourcestamp_id: SourceStampId,
    pub reason: String,
    pub submitted_at: DateTime<Utc>,
}

/// One unit of requested work, consumed and deleted by the build executor.
///
/// `priority` is an opaque totally-ordered tie-break for the executor; the
/// scheduler stores it verbatim and assumes nothing about its direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub id: BuildRequestId,
    pub buildset_id: BuildSetId,
    pub builder_name: String,
    pub priority: i32,
    pub submitted_at: DateTime<Utc>,
}
