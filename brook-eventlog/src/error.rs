//! Event log errors.

use brook_domain::{BrookKey, DomainError};
use brook_store::{LockError, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by append, read and recovery.
///
/// Callers of `append` see exactly one of these per call. Everything except
/// `AggregatedRollback` means the brook is in a clean state; that variant
/// means a write failed and cleanup was incomplete.
#[derive(Debug, Error)]
pub enum BrookError {
    /// Request shape rejected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Optimistic concurrency check failed; nothing was written
    #[error("Version conflict: expected position {expected}, current position is {actual}")]
    VersionConflict {
        /// Position the caller expected
        expected: i64,
        /// Position the brook is actually at
        actual: i64,
    },

    /// Appending would wrap the position counter; nothing was written
    #[error("Position overflow: cannot advance {current} by {count} events")]
    Overflow {
        /// Current committed position
        current: i64,
        /// Number of events requested
        count: usize,
    },

    /// Lock acquire, renewal or release failed
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Another party held the recovery lock and never resolved the cursor
    #[error("Recovery of {key} did not resolve within {waited:?}")]
    RecoveryTimeout {
        /// Brook being recovered
        key: BrookKey,
        /// How long the caller waited
        waited: Duration,
    },

    /// A write failed and rollback also failed; all causes preserved
    #[error("Rollback incomplete after append failure ({source}); {} cleanup step(s) failed", .cleanup.len())]
    AggregatedRollback {
        /// The failure that triggered rollback
        source: Box<BrookError>,
        /// Every error raised while cleaning up
        cleanup: Vec<StoreError>,
    },

    /// Backing store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Domain validation failure
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,
}

impl BrookError {
    /// True if no state was changed by the failed call
    pub fn is_clean(&self) -> bool {
        !matches!(self, BrookError::AggregatedRollback { .. })
    }
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, BrookError>;
