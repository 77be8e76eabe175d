//! Error types for quarry-store

use quarry_core::ItemId;
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the data provider.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database failure that will not succeed on retry
    #[error("database error: {0}")]
    Database(String),

    /// Contention failure (SQLite busy/locked); a retry may succeed
    #[error("database busy: {0}")]
    Busy(String),

    /// An item row with this id already exists
    #[error("item already exists: {0}")]
    ItemExists(ItemId),
}

impl StoreError {
    /// Whether the retry policy should replay the unit of work.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi, _) = &err {
            if matches!(
                ffi.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return StoreError::Busy(err.to_string());
            }
        }
        StoreError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_transient() {
        let err = StoreError::Busy("database is locked".into());
        assert!(err.is_transient());
    }

    #[test]
    fn database_and_conflict_errors_are_fatal() {
        assert!(!StoreError::Database("no such table".into()).is_transient());
        assert!(!StoreError::ItemExists(uuid::Uuid::nil()).is_transient());
    }

    #[test]
    fn sqlite_busy_maps_to_busy() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert!(StoreError::from(err).is_transient());
    }
}
