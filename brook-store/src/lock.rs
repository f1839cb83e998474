//! Distributed lock port.
//!
//! A lock is an advisory, lease-bound claim on a named resource. Holders must
//! renew before the lease expires; after expiry another caller may take it.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Errors raised by lock managers
#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder owns an unexpired lease on the resource
    #[error("Lock contention on {resource}")]
    Contention {
        /// Resource name
        resource: String,
    },

    /// Timed out waiting for a contended lock
    #[error("Timed out after {waited:?} acquiring lock on {resource}")]
    AcquireTimeout {
        /// Resource name
        resource: String,
        /// How long the caller waited
        waited: Duration,
    },

    /// The lease expired or was taken over before renewal or release
    #[error("Lock lost on {resource} (lock id {lock_id})")]
    Lost {
        /// Resource name
        resource: String,
        /// Id of the lease that was lost
        lock_id: Uuid,
    },

    /// Backend failure while talking to the lock store
    #[error("Lock backend error: {0}")]
    Backend(String),
}

impl LockError {
    /// True if the failure was caused by another holder
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::Contention { .. })
    }
}

/// A held lease on a resource
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Resource this lock covers
    fn resource(&self) -> &str;

    /// Identifier of this particular lease
    fn lock_id(&self) -> Uuid;

    /// Extend the lease by its original duration.
    ///
    /// Fails with `LockError::Lost` if the lease already expired or was taken.
    async fn renew(&mut self) -> Result<(), LockError>;

    /// Give up the lease. Releasing twice is a no-op.
    async fn release(&mut self) -> Result<(), LockError>;
}

/// Issues leases on named resources
#[async_trait]
pub trait DistributedLockManager: Send + Sync {
    /// Try once to take the lock.
    ///
    /// Fails fast with `LockError::Contention` if someone else holds it.
    async fn try_acquire(
        &self,
        resource: &str,
        lease: Duration,
    ) -> Result<Box<dyn DistributedLock>, LockError>;

    /// Take the lock, retrying contention every `poll_interval` until `timeout`
    async fn acquire(
        &self,
        resource: &str,
        lease: Duration,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Box<dyn DistributedLock>, LockError> {
        let started = tokio::time::Instant::now();

        loop {
            match self.try_acquire(resource, lease).await {
                Err(LockError::Contention { .. }) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(LockError::AcquireTimeout {
                            resource: resource.to_string(),
                            waited,
                        });
                    }
                    debug!(resource, ?waited, "Lock contended, retrying");
                    tokio::time::sleep(poll_interval.min(timeout - waited)).await;
                },
                other => return other,
            }
        }
    }
}
