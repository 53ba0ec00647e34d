//! Error types for the idempotent sink library

use thiserror::Error;

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur while writing or reading people
#[derive(Error, Debug)]
pub enum SinkError {
    /// Database operation failed; the transaction was rolled back
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Entry rejected before touching the store (empty or oversized fields)
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

impl SinkError {
    /// Check if error is transient (caller may retry)
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Persistence(sqlx_err) => {
                // Connection errors, pool timeout, etc. are transient
                matches!(
                    sqlx_err,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            SinkError::InvalidEntry(_) => false,
        }
    }

    /// Check if error is a constraint violation reported by PostgreSQL
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            SinkError::Persistence(sqlx_err) => sqlx_err
                .as_database_error()
                .and_then(|db_err| db_err.code())
                // class 23: integrity constraint violation
                .map(|code| code.starts_with("23"))
                .unwrap_or(false),
            SinkError::InvalidEntry(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SinkError::Persistence(sqlx::Error::PoolTimedOut).is_transient());
        assert!(SinkError::Persistence(sqlx::Error::PoolClosed).is_transient());
        assert!(!SinkError::Persistence(sqlx::Error::RowNotFound).is_transient());
        assert!(!SinkError::InvalidEntry("empty name".into()).is_transient());
    }

    #[test]
    fn test_constraint_violation_requires_database_error() {
        assert!(!SinkError::Persistence(sqlx::Error::RowNotFound).is_constraint_violation());
        assert!(!SinkError::InvalidEntry("x".into()).is_constraint_violation());
    }
}
