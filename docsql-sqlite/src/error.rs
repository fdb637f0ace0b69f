//! Errors raised inside the SQLite executor before they reach callers.

use docsql_core::error::DocumentStoreError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum SqliteError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// The blocking task running a command panicked or was shut down.
    #[error("SQLite worker failed: {0}")]
    Worker(#[from] JoinError),
}

impl From<SqliteError> for DocumentStoreError {
    fn from(err: SqliteError) -> Self {
        DocumentStoreError::Backend(err.to_string())
    }
}
