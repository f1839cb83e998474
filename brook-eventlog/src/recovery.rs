//! Brook recovery.
//!
//! Resolves the true committed position of a brook, repairing the remains of
//! a writer that crashed between writing its pending cursor and committing.
//!
//! # Flow
//!
//! ```text
//! committed cursor? ──yes──► return it
//!        │no
//! pending cursor? ──no──► NOT_SET
//!        │yes
//! try brook lock ──contended──► poll until committed / pending gone / timeout
//!        │acquired
//! every pending event present? ──yes──► commit pending.position (roll forward)
//!        │no
//! delete pending range + pending cursor (roll back) ──► NOT_SET
//! ```
//!
//! Recovery runs under the brook's own lock, the one writers hold for the
//! whole append. A pending cursor seen while that lock is taken belongs to a
//! live writer or to another recoverer, never to a crash. Writers call
//! [`RecoveryService::resolve_position_locked`] since they already hold it.

use crate::config::BrookOptions;
use crate::error::{BrookError, Result};
use brook_domain::{BrookKey, BrookPosition};
use brook_store::{BrookStorage, DistributedLockManager, LockError, PendingCursor, StoreError};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Reconciles committed and pending cursors for a brook.
pub struct RecoveryService<S: BrookStorage, L: DistributedLockManager> {
    storage: Arc<S>,
    locks: Arc<L>,
    options: BrookOptions,
}

impl<S: BrookStorage, L: DistributedLockManager> RecoveryService<S, L> {
    /// Create a new recovery service.
    pub fn new(storage: Arc<S>, locks: Arc<L>, options: BrookOptions) -> Self {
        Self { storage, locks, options }
    }

    /// Return the position of the last committed event, `NOT_SET` for a brook
    /// that was never written.
    ///
    /// Safe to call concurrently with writers and other resolvers: only the
    /// holder of the brook lock deletes events or advances the cursor.
    pub async fn resolve_position(&self, key: &BrookKey) -> Result<BrookPosition> {
        let cursors = self.storage.cursors();

        if let Some(committed) = cursors.get_committed_cursor(key).await? {
            return Ok(committed.position);
        }

        if cursors.get_pending_cursor(key).await?.is_none() {
            return Ok(BrookPosition::NOT_SET);
        }

        let resource = key.lock_resource();
        match self.locks.try_acquire(&resource, self.options.recovery_lock_lease).await {
            Ok(mut lock) => {
                let result = self.resolve_position_locked(key).await;
                if let Err(e) = lock.release().await {
                    warn!(%key, error = %e, "Failed to release recovery lock");
                }
                result
            },
            Err(LockError::Contention { .. }) => {
                debug!(%key, "Brook busy with a writer or recoverer, waiting");
                self.wait_for_recovery(key).await
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve the position of a brook whose lock the caller already holds.
    ///
    /// Any pending cursor found here was left by a crashed writer.
    pub async fn resolve_position_locked(&self, key: &BrookKey) -> Result<BrookPosition> {
        let cursors = self.storage.cursors();

        // Another party may have finished while we were taking the lock.
        if let Some(committed) = cursors.get_committed_cursor(key).await? {
            return Ok(committed.position);
        }
        let Some(pending) = cursors.get_pending_cursor(key).await? else {
            return Ok(BrookPosition::NOT_SET);
        };

        if self.all_events_present(key, &pending).await? {
            cursors.commit_cursor(key, pending.position).await?;
            // The committed cursor now wins over the pending one.
            if let Err(e) = cursors.delete_pending_cursor(key).await {
                warn!(%key, error = %e, "Failed to delete pending cursor after roll-forward");
            }

            let confirmed = cursors
                .get_committed_cursor(key)
                .await?
                .ok_or_else(|| StoreError::not_found("committed_cursor", key.to_string()))?;

            info!(
                %key,
                original = %pending.original_position,
                position = %confirmed.position,
                "Recovered interrupted append (rolled forward)"
            );
            return Ok(confirmed.position);
        }

        let mut failed_deletes = 0usize;
        for position in pending.pending_positions() {
            if let Err(e) = self.storage.events().delete_event(key, position).await {
                failed_deletes += 1;
                warn!(%key, %position, error = %e, "Failed to delete orphaned event during recovery");
            }
        }
        cursors.delete_pending_cursor(key).await?;

        info!(
            %key,
            original = %pending.original_position,
            abandoned = %pending.position,
            failed_deletes,
            "Recovered interrupted append (rolled back)"
        );
        Ok(BrookPosition::NOT_SET)
    }

    async fn all_events_present(&self, key: &BrookKey, pending: &PendingCursor) -> Result<bool> {
        for position in pending.pending_positions() {
            if !self.storage.events().event_exists(key, position).await? {
                debug!(%key, %position, "Pending event missing");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Poll until the party holding the recovery lock resolves the brook.
    async fn wait_for_recovery(&self, key: &BrookKey) -> Result<BrookPosition> {
        let cursors = self.storage.cursors();
        let timeout = self.options.recovery_wait_timeout;
        let started = Instant::now();

        loop {
            if let Some(committed) = cursors.get_committed_cursor(key).await? {
                return Ok(committed.position);
            }
            if cursors.get_pending_cursor(key).await?.is_none() {
                return Ok(BrookPosition::NOT_SET);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                warn!(%key, ?waited, "Gave up waiting for concurrent recovery");
                return Err(BrookError::RecoveryTimeout {
                    key: key.clone(),
                    waited,
                });
            }
            tokio::time::sleep(self.options.recovery_poll_interval.min(timeout - waited)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_store::{
        BrookEventToStoredEvent, CursorRepository, MemoryLockManager, MemoryStore, StoredEvent,
    };
    use brook_domain::{BrookEvent, Mapper};
    use std::time::Duration;

    fn key() -> BrookKey {
        BrookKey::new("order", "42").unwrap()
    }

    fn pos(value: i64) -> BrookPosition {
        BrookPosition::new(value).unwrap()
    }

    fn stored(n: usize) -> StoredEvent {
        BrookEventToStoredEvent.map(BrookEvent::new("order.placed", format!("{{\"n\":{n}}}").into_bytes()))
    }

    fn service(store: &Arc<MemoryStore>, locks: &Arc<MemoryLockManager>) -> RecoveryService<MemoryStore, MemoryLockManager> {
        RecoveryService::new(Arc::clone(store), Arc::clone(locks), BrookOptions::test())
    }

    #[tokio::test]
    async fn test_never_written_brook_is_not_set() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLockManager::new());

        let position = service(&store, &locks).resolve_position(&key()).await.unwrap();

        assert_eq!(position, BrookPosition::NOT_SET);
    }

    #[tokio::test]
    async fn test_committed_cursor_wins_over_stale_pending() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLockManager::new());
        store.create_pending_cursor(&key(), pos(4), pos(9)).await.unwrap();
        store.set_committed_cursor(&key(), pos(4)).unwrap();

        let position = service(&store, &locks).resolve_position(&key()).await.unwrap();

        assert_eq!(position, pos(4));
        assert!(!locks.is_held(&key().lock_resource()));
    }

    #[tokio::test]
    async fn test_rolls_forward_complete_write() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLockManager::new());
        store.create_pending_cursor(&key(), BrookPosition::NOT_SET, pos(1)).await.unwrap();
        store.insert_event(&key(), pos(0), stored(0)).unwrap();
        store.insert_event(&key(), pos(1), stored(1)).unwrap();

        let position = service(&store, &locks).resolve_position(&key()).await.unwrap();

        assert_eq!(position, pos(1));
        assert!(store.get_pending_cursor(&key()).await.unwrap().is_none());
        assert!(!locks.is_held(&key().lock_resource()));
    }

    #[tokio::test]
    async fn test_rolls_back_incomplete_write() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLockManager::new());
        store.create_pending_cursor(&key(), BrookPosition::NOT_SET, pos(2)).await.unwrap();
        store.insert_event(&key(), pos(0), stored(0)).unwrap();
        store.insert_event(&key(), pos(2), stored(2)).unwrap();

        let position = service(&store, &locks).resolve_position(&key()).await.unwrap();

        assert_eq!(position, BrookPosition::NOT_SET);
        assert!(store.event_positions(&key()).is_empty());
        assert!(store.get_pending_cursor(&key()).await.unwrap().is_none());
        assert!(store.get_committed_cursor(&key()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_recovery_times_out() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLockManager::new());
        store.create_pending_cursor(&key(), BrookPosition::NOT_SET, pos(0)).await.unwrap();
        let _held = locks
            .try_acquire(&key().lock_resource(), Duration::from_secs(60))
            .await
            .unwrap();

        let err = service(&store, &locks).resolve_position(&key()).await.unwrap_err();

        assert!(matches!(err, BrookError::RecoveryTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_recovery_observes_other_party_commit() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLockManager::new());
        store.create_pending_cursor(&key(), BrookPosition::NOT_SET, pos(0)).await.unwrap();
        let _held = locks
            .try_acquire(&key().lock_resource(), Duration::from_secs(60))
            .await
            .unwrap();

        let other = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            other.commit_cursor(&key(), pos(0)).await.unwrap();
        });

        let position = service(&store, &locks).resolve_position(&key()).await.unwrap();

        assert_eq!(position, pos(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_contended_recovery_observes_other_party_rollback() {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLockManager::new());
        store.create_pending_cursor(&key(), BrookPosition::NOT_SET, pos(0)).await.unwrap();
        let _held = locks
            .try_acquire(&key().lock_resource(), Duration::from_secs(60))
            .await
            .unwrap();

        let other = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            other.delete_pending_cursor(&key()).await.unwrap();
        });

        let position = service(&store, &locks).resolve_position(&key()).await.unwrap();

        assert_eq!(position, BrookPosition::NOT_SET);
    }
}
