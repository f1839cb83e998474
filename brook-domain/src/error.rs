//! Domain validation errors.

/// Errors raised when constructing brook value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Brook key component is empty or contains the separator
    #[error("Invalid brook key: {0}")]
    InvalidKey(String),

    /// Position is below the unset sentinel
    #[error("Invalid brook position: {0}")]
    InvalidPosition(i64),

    /// Range bounds are inverted or start before the first event
    #[error("Invalid brook range: {0}")]
    InvalidRange(String),
}
