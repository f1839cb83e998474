//! Storage layer errors

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document not found
    #[error("Document not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of document (cursor, pending cursor, event)
        entity_type: String,
        /// Document ID
        id: String,
    },

    /// Document already exists where a create was requested
    #[error("Conflict: {entity_type} with id {id} already exists")]
    Conflict {
        /// Type of document
        entity_type: String,
        /// Document ID
        id: String,
    },

    /// Throttling or other fault expected to clear on retry
    #[error("Transient store fault: {0}")]
    Transient(String),

    /// Request timed out; outcome unknown
    #[error("Store request timed out: {0}")]
    Timeout(String),

    /// Stored document could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Domain error passthrough
    #[error("Domain error: {0}")]
    Domain(#[from] brook_domain::DomainError),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Conflict {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Whether the retry policy may re-issue the failed request
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Timeout(_) | StoreError::Connection(_))
    }

    /// Whether the failed request may still have been applied
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Connection(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::not_found("unknown", "unknown"),
            sqlx::Error::PoolTimedOut => StoreError::Timeout("connection pool timed out".to_string()),
            sqlx::Error::Io(io_err) => StoreError::Connection(io_err.to_string()),
            sqlx::Error::Database(db_err) => {
                match db_err.code().as_deref() {
                    // unique_violation
                    Some("23505") => StoreError::conflict("unknown", "unknown"),
                    // serialization_failure, deadlock_detected, lock_not_available
                    Some("40001") | Some("40P01") | Some("55P03") => {
                        StoreError::Transient(db_err.to_string())
                    },
                    _ => StoreError::Database(db_err.to_string()),
                }
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Transient("429".to_string()).is_transient());
        assert!(StoreError::Timeout("slow".to_string()).is_transient());
        assert!(StoreError::Connection("reset".to_string()).is_transient());
        assert!(!StoreError::Database("syntax".to_string()).is_transient());
        assert!(!StoreError::conflict("event", "1").is_transient());
    }

    #[test]
    fn test_outcome_unknown_classification() {
        assert!(StoreError::Timeout("slow".to_string()).is_outcome_unknown());
        assert!(StoreError::Connection("reset".to_string()).is_outcome_unknown());
        assert!(!StoreError::Transient("429".to_string()).is_outcome_unknown());
        assert!(!StoreError::Database("constraint".to_string()).is_outcome_unknown());
    }

    #[test]
    fn test_display() {
        let err = StoreError::not_found("pending_cursor", "order|42");
        assert_eq!(err.to_string(), "Document not found: pending_cursor with id order|42");
    }
}
