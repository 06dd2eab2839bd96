//! Storage error types

use thiserror::Error;

/// Errors raised by a `SettlementStore` / `StoreTx`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Serialization failure or deadlock; the whole unit of work may be retried
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Unique constraint violated (constraint name)
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Stored data could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// SQLSTATE codes we react to
mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const UNIQUE_VIOLATION: &str = "23505";
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            match db_err.code().as_deref() {
                Some(sqlstate::SERIALIZATION_FAILURE) | Some(sqlstate::DEADLOCK_DETECTED) => {
                    return StoreError::Conflict(db_err.message().to_string());
                }
                Some(sqlstate::UNIQUE_VIOLATION) => {
                    let constraint = db_err.constraint().unwrap_or("unknown");
                    return StoreError::DuplicateKey(constraint.to_string());
                }
                _ => {}
            }
        }
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_backend() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Backend(_)));

        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_json_errors_are_corrupt() {
        let err: StoreError = serde_json::from_str::<u32>("x").unwrap_err().into();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
