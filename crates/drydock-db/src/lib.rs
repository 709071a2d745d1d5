//! State store for the Drydock build scheduler.
//!
//! Provides the [`StateStore`]/[`StoreTx`] traits, a SQLite implementation
//! and an in-memory implementation with the same transactional semantics.

pub mod error;
pub mod mem;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use mem::MemStore;
pub use sqlite::SqliteStore;
pub use store::{ClassifiedChanges, StateStore, StoreTx};
