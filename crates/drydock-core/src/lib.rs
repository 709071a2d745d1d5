//! Core domain types for the Drydock build scheduler.
//!
//! This crate contains:
//! - Record identifiers and common types
//! - Change records and their property bags
//! - Source stamps, build sets and build requests
//! - Durable scheduler state (watermark + last build)
//! - Status event capability trait

pub mod buildset;
pub mod change;
pub mod event;
pub mod id;
pub mod properties;
pub mod sourcestamp;
pub mod state;

pub use buildset::{BuildRequest, BuildSet};
pub use change::{Change, Link, NewChange};
pub use event::{Event, LogRef, StatusEvent};
pub use id::{BuildRequestId, BuildSetId, ChangeId, SourceStampId};
pub use properties::Properties;
pub use sourcestamp::{NewSourceStamp, SourceStamp};
pub use state::SchedulerState;
