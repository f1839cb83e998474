//! Repository trait definitions (Ports)
//!
//! These traits define the document-store interface the brook core needs.
//! The store is only assumed to make a single call atomic; no operation here
//! spans more than one document except `append_batch`, which implementations
//! must apply all-or-nothing.

use crate::documents::{CommittedCursor, PendingCursor, StoredEvent};
use crate::error::StoreError;
use async_trait::async_trait;
use brook_domain::{BrookKey, BrookPosition, BrookRangeKey};
use futures::stream::BoxStream;

/// Stream of stored events produced by a ranged query
pub type StoredEventStream<'a> = BoxStream<'a, Result<StoredEvent, StoreError>>;

/// Repository for the cursor documents of each brook
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Read the committed cursor, `None` if the brook was never committed
    async fn get_committed_cursor(&self, key: &BrookKey) -> Result<Option<CommittedCursor>, StoreError>;

    /// Read the pending cursor, `None` if no append is in flight
    async fn get_pending_cursor(&self, key: &BrookKey) -> Result<Option<PendingCursor>, StoreError>;

    /// Durably record write-ahead intent for an append.
    ///
    /// Replaces any stale pending cursor left by a crashed writer.
    async fn create_pending_cursor(
        &self,
        key: &BrookKey,
        original: BrookPosition,
        target: BrookPosition,
    ) -> Result<(), StoreError>;

    /// Write the committed cursor document; the pending cursor is left as is
    async fn commit_cursor(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError>;

    /// Remove the pending cursor (no-op if absent)
    async fn delete_pending_cursor(&self, key: &BrookKey) -> Result<(), StoreError>;
}

/// Repository for event documents (append-only, except for rollback)
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Check whether an event exists at `position`
    async fn event_exists(&self, key: &BrookKey, position: BrookPosition) -> Result<bool, StoreError>;

    /// Delete the event at `position` (no-op if absent)
    async fn delete_event(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError>;

    /// Write `events` at consecutive positions starting at `starting_position`.
    ///
    /// Must be atomic: on error, none of the events were written.
    async fn append_batch(
        &self,
        key: &BrookKey,
        events: &[StoredEvent],
        starting_position: BrookPosition,
    ) -> Result<(), StoreError>;

    /// Stream the events in `range` in ascending position order, fetching
    /// `page_size` documents per round trip.
    fn query_events(&self, range: &BrookRangeKey, page_size: usize) -> StoredEventStream<'_>;
}

/// Combined store interface
pub trait BrookStorage: Send + Sync {
    /// Get cursor repository
    fn cursors(&self) -> &dyn CursorRepository;

    /// Get event repository
    fn events(&self) -> &dyn EventRepository;
}
