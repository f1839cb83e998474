//! In-process lock manager with leases.
//!
//! Models the same contract as a distributed lock service: leases expire on
//! their own, and an expired lease can be taken over by another caller.
//! Uses tokio's clock so paused-time tests can drive expiry.

use crate::lock::{DistributedLock, DistributedLockManager, LockError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Lease {
    lock_id: Uuid,
    expires_at: Instant,
}

type LeaseTable = Arc<Mutex<HashMap<String, Lease>>>;

fn table(leases: &LeaseTable) -> Result<MutexGuard<'_, HashMap<String, Lease>>, LockError> {
    leases
        .lock()
        .map_err(|e| LockError::Backend(format!("Failed to acquire lease table: {}", e)))
}

/// Lock manager backed by an in-process lease table
#[derive(Clone, Default)]
pub struct MemoryLockManager {
    leases: LeaseTable,
}

impl MemoryLockManager {
    /// Create a lock manager with no leases
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `resource` currently has an unexpired lease
    pub fn is_held(&self, resource: &str) -> bool {
        table(&self.leases)
            .map(|leases| {
                leases
                    .get(resource)
                    .map(|lease| lease.expires_at > Instant::now())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl DistributedLockManager for MemoryLockManager {
    async fn try_acquire(
        &self,
        resource: &str,
        lease: Duration,
    ) -> Result<Box<dyn DistributedLock>, LockError> {
        let now = Instant::now();
        let mut leases = table(&self.leases)?;

        if let Some(existing) = leases.get(resource) {
            if existing.expires_at > now {
                return Err(LockError::Contention {
                    resource: resource.to_string(),
                });
            }
            debug!(resource, lock_id = %existing.lock_id, "Taking over expired lease");
        }

        let lock_id = Uuid::new_v4();
        leases.insert(
            resource.to_string(),
            Lease {
                lock_id,
                expires_at: now + lease,
            },
        );

        Ok(Box::new(MemoryLock {
            leases: Arc::clone(&self.leases),
            resource: resource.to_string(),
            lock_id,
            lease,
            released: false,
        }))
    }
}

/// Lease handed out by [`MemoryLockManager`]
pub struct MemoryLock {
    leases: LeaseTable,
    resource: String,
    lock_id: Uuid,
    lease: Duration,
    released: bool,
}

impl MemoryLock {
    fn lost(&self) -> LockError {
        LockError::Lost {
            resource: self.resource.clone(),
            lock_id: self.lock_id,
        }
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn lock_id(&self) -> Uuid {
        self.lock_id
    }

    async fn renew(&mut self) -> Result<(), LockError> {
        if self.released {
            return Err(self.lost());
        }

        let now = Instant::now();
        let mut leases = table(&self.leases)?;
        match leases.get_mut(&self.resource) {
            Some(lease) if lease.lock_id == self.lock_id && lease.expires_at > now => {
                lease.expires_at = now + self.lease;
                Ok(())
            },
            _ => Err(self.lost()),
        }
    }

    async fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }

        let mut leases = table(&self.leases)?;
        if leases.get(&self.resource).map(|lease| lease.lock_id) == Some(self.lock_id) {
            leases.remove(&self.resource);
        }
        self.released = true;
        Ok(())
    }
}
