//! State store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("storage failure: {0}")]
    Failed(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
