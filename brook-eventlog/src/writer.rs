//! Brook Writer
//!
//! Appends events to a brook under its distributed lock using a write-ahead
//! pending cursor:
//!
//! 1. Resolve the current position (recovering a crashed writer if needed)
//! 2. Check the caller's expected version
//! 3. Write the pending cursor `{current, final}`
//! 4. Write the events, split into sub-batches when too large
//! 5. Commit `final`
//!
//! Any failure in step 4 rolls back the events this call wrote and the
//! pending cursor before the error surfaces.

use crate::batching::{estimate_size, split_by_size_and_count};
use crate::config::{BrookOptions, MAX_EVENTS_PER_APPEND_CEILING};
use crate::error::{BrookError, Result};
use crate::recovery::RecoveryService;
use crate::retry::RetryPolicy;
use brook_domain::{BrookEvent, BrookKey, BrookPosition, Mapper};
use brook_store::{
    BrookEventToStoredEvent, BrookStorage, DistributedLock, DistributedLockManager, StoredEvent,
};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sub-batch interval at which the writer lock is renewed unconditionally.
pub const RENEW_EVERY_N_BATCHES: usize = 5;

/// Appends events to brooks.
pub struct BrookWriter<S: BrookStorage, L: DistributedLockManager> {
    storage: Arc<S>,
    locks: Arc<L>,
    recovery: Arc<RecoveryService<S, L>>,
    mapper: Arc<dyn Mapper<BrookEvent, StoredEvent>>,
    retry: RetryPolicy,
    options: BrookOptions,
}

impl<S: BrookStorage, L: DistributedLockManager> BrookWriter<S, L> {
    /// Create a writer with its own recovery service.
    pub fn new(storage: Arc<S>, locks: Arc<L>, options: BrookOptions) -> Self {
        let recovery = Arc::new(RecoveryService::new(
            Arc::clone(&storage),
            Arc::clone(&locks),
            options.clone(),
        ));
        Self::with_recovery(storage, locks, recovery, options)
    }

    /// Create a writer sharing an existing recovery service.
    pub fn with_recovery(
        storage: Arc<S>,
        locks: Arc<L>,
        recovery: Arc<RecoveryService<S, L>>,
        options: BrookOptions,
    ) -> Self {
        Self {
            storage,
            locks,
            recovery,
            mapper: Arc::new(BrookEventToStoredEvent),
            retry: RetryPolicy::new(options.retry.clone()),
            options,
        }
    }

    /// Replace the envelope-to-storage mapper.
    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<BrookEvent, StoredEvent>>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Append `events` and return the brook's new position.
    ///
    /// With `expected_version`, fails with `VersionConflict` unless the brook
    /// is currently at exactly that position.
    pub async fn append(
        &self,
        key: &BrookKey,
        events: Vec<BrookEvent>,
        expected_version: Option<BrookPosition>,
    ) -> Result<BrookPosition> {
        self.append_with_cancellation(key, events, expected_version, &CancellationToken::new())
            .await
    }

    /// Append, stopping before the next sub-batch once `cancel` fires.
    ///
    /// A cancelled append is rolled back and fails with `Cancelled`.
    pub async fn append_with_cancellation(
        &self,
        key: &BrookKey,
        events: Vec<BrookEvent>,
        expected_version: Option<BrookPosition>,
        cancel: &CancellationToken,
    ) -> Result<BrookPosition> {
        self.validate(&events)?;

        let mut lock = self
            .locks
            .acquire(
                &key.lock_resource(),
                self.options.lease_duration,
                self.options.lock_acquire_timeout,
                self.options.lock_acquire_poll_interval,
            )
            .await?;

        let result = self
            .append_locked(key, events, expected_version, lock.as_mut(), cancel)
            .await;

        if let Err(e) = lock.release().await {
            warn!(%key, lock_id = %lock.lock_id(), error = %e, "Failed to release brook lock");
        }

        result
    }

    fn validate(&self, events: &[BrookEvent]) -> Result<()> {
        if events.is_empty() {
            return Err(BrookError::InvalidArgument("events must not be empty".to_string()));
        }

        let limit = self.options.max_events_per_append.min(MAX_EVENTS_PER_APPEND_CEILING);
        if events.len() > limit {
            return Err(BrookError::InvalidArgument(format!(
                "cannot append {} events in one call (limit {})",
                events.len(),
                limit
            )));
        }

        Ok(())
    }

    async fn append_locked(
        &self,
        key: &BrookKey,
        events: Vec<BrookEvent>,
        expected_version: Option<BrookPosition>,
        lock: &mut dyn DistributedLock,
        cancel: &CancellationToken,
    ) -> Result<BrookPosition> {
        let current = self.recovery.resolve_position_locked(key).await?;

        if let Some(expected) = expected_version {
            if expected != current {
                debug!(%key, %expected, %current, "Version conflict");
                return Err(BrookError::VersionConflict {
                    expected: expected.value(),
                    actual: current.value(),
                });
            }
        }

        let count = events.len();
        let final_position = current
            .checked_advance(count as u64)
            .ok_or(BrookError::Overflow {
                current: current.value(),
                count,
            })?;

        // Write-ahead: intent is durable before any payload.
        if let Err(e) = self
            .storage
            .cursors()
            .create_pending_cursor(key, current, final_position)
            .await
        {
            return Err(self.rollback(key, current, None, e.into()).await);
        }

        let stored: Vec<StoredEvent> = events.into_iter().map(|event| self.mapper.map(event)).collect();

        let mut reached = None;
        if let Err(cause) = self
            .write_events(key, stored, current, lock, cancel, &mut reached)
            .await
        {
            return Err(self.rollback(key, current, reached, cause).await);
        }

        // Events are durable; a failed commit leaves the pending cursor in place.
        self.retry
            .execute("commit_cursor", || {
                self.storage.cursors().commit_cursor(key, final_position)
            })
            .await
            .map_err(|e| {
                error!(
                    %key,
                    position = %final_position,
                    error = %e,
                    "Commit failed after events were written; pending cursor left for recovery"
                );
                BrookError::Store(e)
            })?;

        // The append is committed; a stale pending cursor is ignored by recovery
        // and overwritten by the next append.
        if let Err(e) = self.storage.cursors().delete_pending_cursor(key).await {
            warn!(%key, error = %e, "Failed to delete pending cursor after commit");
        }

        info!(%key, from = %current, to = %final_position, events = count, "Events appended");
        Ok(final_position)
    }

    /// Write events starting right after `current`.
    ///
    /// `reached` tracks the highest position that may hold an event written by
    /// this call: batches the store confirmed, plus a failed batch whose
    /// outcome is unknown. Rollback never touches positions beyond it.
    async fn write_events(
        &self,
        key: &BrookKey,
        stored: Vec<StoredEvent>,
        current: BrookPosition,
        lock: &mut dyn DistributedLock,
        cancel: &CancellationToken,
        reached: &mut Option<BrookPosition>,
    ) -> Result<()> {
        let total = stored.len();
        let overflow = || BrookError::Overflow {
            current: current.value(),
            count: total,
        };

        if total <= self.options.max_events_per_batch
            && estimate_size(&stored) <= self.options.max_request_bytes
        {
            if cancel.is_cancelled() {
                return Err(BrookError::Cancelled);
            }

            let first = current.next().ok_or_else(overflow)?;
            let last = current.checked_advance(total as u64).ok_or_else(overflow)?;
            // Once dispatched, any attempt may have landed; deleting an absent
            // event is a no-op.
            *reached = Some(last);
            self.retry
                .execute("append_batch", || {
                    self.storage.events().append_batch(key, &stored, first)
                })
                .await?;
            return Ok(());
        }

        let batches = split_by_size_and_count(
            stored,
            self.options.max_events_per_batch,
            self.options.max_request_bytes,
        );
        debug!(%key, events = total, sub_batches = batches.len(), "Splitting append");

        let mut written = 0u64;
        let mut last_renewal = Instant::now();

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(%key, index, "Append cancelled before sub-batch");
                return Err(BrookError::Cancelled);
            }

            if index % RENEW_EVERY_N_BATCHES == 0
                || last_renewal.elapsed() >= self.options.lease_renewal_threshold
            {
                lock.renew().await?;
                last_renewal = Instant::now();
                debug!(%key, index, "Brook lock renewed");
            }

            let start = current.checked_advance(written + 1).ok_or_else(overflow)?;
            written += batch.len() as u64;
            let last = current.checked_advance(written).ok_or_else(overflow)?;

            if let Err(e) = self.storage.events().append_batch(key, batch, start).await {
                if e.is_outcome_unknown() {
                    *reached = Some(last);
                }
                return Err(e.into());
            }
            *reached = Some(last);
            debug!(%key, index, from = %start, to = %last, "Sub-batch written");
        }

        Ok(())
    }

    /// Undo a failed append: delete events up to `reached`, then the pending cursor.
    ///
    /// Returns the error to surface: `cause` itself if cleanup succeeded,
    /// otherwise an aggregate carrying every cleanup failure.
    async fn rollback(
        &self,
        key: &BrookKey,
        current: BrookPosition,
        reached: Option<BrookPosition>,
        cause: BrookError,
    ) -> BrookError {
        warn!(%key, error = %cause, "Append failed, rolling back");

        let mut cleanup = Vec::new();

        if let Some(last) = reached {
            let positions = (current.value() + 1..=last.value()).filter_map(|v| BrookPosition::new(v).ok());
            for position in positions {
                if let Err(e) = self.storage.events().delete_event(key, position).await {
                    error!(%key, %position, error = %e, "Failed to delete event during rollback");
                    cleanup.push(e);
                }
            }
        }

        if let Err(e) = self.storage.cursors().delete_pending_cursor(key).await {
            error!(%key, error = %e, "Failed to delete pending cursor during rollback");
            cleanup.push(e);
        }

        if cleanup.is_empty() {
            info!(%key, "Append rolled back");
            cause
        } else {
            BrookError::AggregatedRollback {
                source: Box::new(cause),
                cleanup,
            }
        }
    }
}
