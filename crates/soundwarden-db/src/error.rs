//! Database error types.

use thiserror::Error;

/// Database error type.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

impl From<DbError> for soundwarden_core::Error {
    fn from(e: DbError) -> Self {
        Self::Store(e.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
