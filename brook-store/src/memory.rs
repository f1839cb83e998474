//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access.

use crate::documents::{CommittedCursor, PendingCursor, StoredEvent};
use crate::error::StoreError;
use crate::repository::{BrookStorage, CursorRepository, EventRepository, StoredEventStream};
use async_trait::async_trait;
use brook_domain::{BrookKey, BrookPosition, BrookRangeKey};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Documents belonging to one brook
#[derive(Debug, Default, Clone)]
struct BrookDocuments {
    committed: Option<CommittedCursor>,
    pending: Option<PendingCursor>,
    events: BTreeMap<i64, StoredEvent>,
}

/// In-memory store for testing
#[derive(Debug)]
pub struct MemoryStore {
    brooks: RwLock<HashMap<BrookKey, BrookDocuments>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            brooks: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<BrookKey, BrookDocuments>>, StoreError> {
        self.brooks
            .read()
            .map_err(|e| StoreError::Database(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<BrookKey, BrookDocuments>>, StoreError> {
        self.brooks
            .write()
            .map_err(|e| StoreError::Database(format!("Failed to acquire write lock: {}", e)))
    }

    /// Get the number of events stored for a brook
    pub fn event_count(&self, key: &BrookKey) -> usize {
        self.read()
            .map(|brooks| brooks.get(key).map(|docs| docs.events.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Positions that currently hold an event, ascending
    pub fn event_positions(&self, key: &BrookKey) -> Vec<i64> {
        self.read()
            .map(|brooks| {
                brooks
                    .get(key)
                    .map(|docs| docs.events.keys().copied().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Place an event at an arbitrary position, bypassing the cursor protocol.
    ///
    /// Lets tests stage the aftermath of a crashed writer.
    pub fn insert_event(
        &self,
        key: &BrookKey,
        position: BrookPosition,
        event: StoredEvent,
    ) -> Result<(), StoreError> {
        let mut brooks = self.write()?;
        brooks.entry(key.clone()).or_default().events.insert(position.value(), event);
        Ok(())
    }

    /// Set the committed cursor without touching the pending cursor.
    pub fn set_committed_cursor(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError> {
        let mut brooks = self.write()?;
        brooks.entry(key.clone()).or_default().committed = Some(CommittedCursor { position });
        Ok(())
    }

    /// Up to `page_size` events in `from..=to`, cloned out so no guard
    /// outlives the call.
    fn page(
        &self,
        key: &BrookKey,
        from: i64,
        to: i64,
        page_size: usize,
    ) -> Result<Vec<(i64, StoredEvent)>, StoreError> {
        let brooks = self.read()?;
        Ok(match brooks.get(key) {
            Some(docs) => docs
                .events
                .range(from..=to)
                .take(page_size)
                .map(|(position, event)| (*position, event.clone()))
                .collect(),
            None => Vec::new(),
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Cursor Repository Implementation
// =============================================================================

#[async_trait]
impl CursorRepository for MemoryStore {
    async fn get_committed_cursor(&self, key: &BrookKey) -> Result<Option<CommittedCursor>, StoreError> {
        Ok(self.read()?.get(key).and_then(|docs| docs.committed))
    }

    async fn get_pending_cursor(&self, key: &BrookKey) -> Result<Option<PendingCursor>, StoreError> {
        Ok(self.read()?.get(key).and_then(|docs| docs.pending))
    }

    async fn create_pending_cursor(
        &self,
        key: &BrookKey,
        original: BrookPosition,
        target: BrookPosition,
    ) -> Result<(), StoreError> {
        let mut brooks = self.write()?;
        brooks.entry(key.clone()).or_default().pending = Some(PendingCursor {
            original_position: original,
            position: target,
        });
        Ok(())
    }

    async fn commit_cursor(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError> {
        let mut brooks = self.write()?;
        let docs = brooks.entry(key.clone()).or_default();
        docs.committed = Some(CommittedCursor { position });
        Ok(())
    }

    async fn delete_pending_cursor(&self, key: &BrookKey) -> Result<(), StoreError> {
        let mut brooks = self.write()?;
        if let Some(docs) = brooks.get_mut(key) {
            docs.pending = None;
        }
        Ok(())
    }
}

// =============================================================================
// Event Repository Implementation
// =============================================================================

#[async_trait]
impl EventRepository for MemoryStore {
    async fn event_exists(&self, key: &BrookKey, position: BrookPosition) -> Result<bool, StoreError> {
        Ok(self
            .read()?
            .get(key)
            .map(|docs| docs.events.contains_key(&position.value()))
            .unwrap_or(false))
    }

    async fn delete_event(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError> {
        let mut brooks = self.write()?;
        if let Some(docs) = brooks.get_mut(key) {
            docs.events.remove(&position.value());
        }
        Ok(())
    }

    async fn append_batch(
        &self,
        key: &BrookKey,
        events: &[StoredEvent],
        starting_position: BrookPosition,
    ) -> Result<(), StoreError> {
        if !starting_position.is_set() {
            return Err(StoreError::Database(format!(
                "batch for {} must start at a non-negative position, got {}",
                key, starting_position
            )));
        }

        // Single write guard for the whole batch keeps it all-or-nothing.
        let mut brooks = self.write()?;
        let docs = brooks.entry(key.clone()).or_default();
        for (offset, event) in events.iter().enumerate() {
            docs.events.insert(starting_position.value() + offset as i64, event.clone());
        }
        Ok(())
    }

    fn query_events(&self, range: &BrookRangeKey, page_size: usize) -> StoredEventStream<'_> {
        let key = range.key().clone();
        let from = range.from().value();
        let to = range.to().value();
        let page_size = page_size.max(1);

        Box::pin(async_stream::try_stream! {
            let mut next = from;
            while next <= to {
                let page = self.page(&key, next, to, page_size)?;

                let Some((last, _)) = page.last() else { break };
                next = last + 1;

                for (_, event) in page {
                    yield event;
                }
            }
        })
    }
}

impl BrookStorage for MemoryStore {
    fn cursors(&self) -> &dyn CursorRepository {
        self
    }

    fn events(&self) -> &dyn EventRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
