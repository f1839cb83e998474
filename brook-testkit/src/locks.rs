//! Lock manager wrapper that counts lock traffic and can break renewals.

use async_trait::async_trait;
use brook_store::{DistributedLock, DistributedLockManager, LockError, MemoryLockManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Default)]
struct LockStats {
    acquires: AtomicUsize,
    contentions: AtomicUsize,
    renewals: AtomicUsize,
    releases: AtomicUsize,
    /// Renewal number (1-based, across all locks) from which renewals fail; 0 = never
    fail_renewals_from: AtomicUsize,
    fail_releases: AtomicUsize,
}

/// [`MemoryLockManager`] wrapper that counts acquires, renewals and releases.
#[derive(Clone, Default)]
pub struct CountingLockManager {
    inner: MemoryLockManager,
    stats: Arc<LockStats>,
}

impl CountingLockManager {
    /// Create a manager with an empty lease table
    pub fn new() -> Self {
        Self::default()
    }

    /// Underlying manager
    pub fn inner(&self) -> &MemoryLockManager {
        &self.inner
    }

    /// Successful acquisitions so far
    pub fn acquires(&self) -> usize {
        self.stats.acquires.load(Ordering::SeqCst)
    }

    /// Acquisition attempts rejected with contention
    pub fn contentions(&self) -> usize {
        self.stats.contentions.load(Ordering::SeqCst)
    }

    /// Renewal attempts so far, successful or not
    pub fn renewals(&self) -> usize {
        self.stats.renewals.load(Ordering::SeqCst)
    }

    /// Release calls so far
    pub fn releases(&self) -> usize {
        self.stats.releases.load(Ordering::SeqCst)
    }

    /// Make the `nth` renewal (1-based) and every later one fail with `Lost`
    pub fn fail_renewals_from(&self, nth: usize) {
        self.stats.fail_renewals_from.store(nth, Ordering::SeqCst);
    }

    /// Make every release fail with a backend error
    pub fn fail_releases(&self) {
        self.stats.fail_releases.store(1, Ordering::SeqCst);
    }

    /// True if someone holds an unexpired lease on `resource`
    pub fn is_held(&self, resource: &str) -> bool {
        self.inner.is_held(resource)
    }
}

#[async_trait]
impl DistributedLockManager for CountingLockManager {
    async fn try_acquire(
        &self,
        resource: &str,
        lease: Duration,
    ) -> Result<Box<dyn DistributedLock>, LockError> {
        match self.inner.try_acquire(resource, lease).await {
            Ok(inner) => {
                self.stats.acquires.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(CountingLock {
                    inner,
                    stats: Arc::clone(&self.stats),
                }))
            },
            Err(e) => {
                if e.is_contention() {
                    self.stats.contentions.fetch_add(1, Ordering::SeqCst);
                }
                Err(e)
            },
        }
    }
}

/// Lock handed out by [`CountingLockManager`]
pub struct CountingLock {
    inner: Box<dyn DistributedLock>,
    stats: Arc<LockStats>,
}

#[async_trait]
impl DistributedLock for CountingLock {
    fn resource(&self) -> &str {
        self.inner.resource()
    }

    fn lock_id(&self) -> Uuid {
        self.inner.lock_id()
    }

    async fn renew(&mut self) -> Result<(), LockError> {
        let attempt = self.stats.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_from = self.stats.fail_renewals_from.load(Ordering::SeqCst);
        if fail_from != 0 && attempt >= fail_from {
            return Err(LockError::Lost {
                resource: self.inner.resource().to_string(),
                lock_id: self.inner.lock_id(),
            });
        }
        self.inner.renew().await
    }

    async fn release(&mut self) -> Result<(), LockError> {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        if self.stats.fail_releases.load(Ordering::SeqCst) != 0 {
            // Free the lease anyway so later tests are not blocked.
            let _ = self.inner.release().await;
            return Err(LockError::Backend("injected release failure".to_string()));
        }
        self.inner.release().await
    }
}
