//! Brook Reader
//!
//! Streams committed events for a position range. Reads take no lock.

use crate::error::{BrookError, Result};
use brook_domain::{BrookEvent, BrookRangeKey, Mapper};
use brook_store::{BrookStorage, StoredEvent, StoredEventToBrookEvent};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Stream of events produced by [`BrookReader::read_range`]
pub type BrookEventStream = BoxStream<'static, Result<BrookEvent>>;

/// Reads events from brooks.
pub struct BrookReader<S: BrookStorage> {
    storage: Arc<S>,
    mapper: Arc<dyn Mapper<StoredEvent, BrookEvent>>,
    page_size: usize,
}

impl<S: BrookStorage + 'static> BrookReader<S> {
    /// Create a reader fetching `page_size` events per round trip.
    pub fn new(storage: Arc<S>, page_size: usize) -> Self {
        Self {
            storage,
            mapper: Arc::new(StoredEventToBrookEvent),
            page_size,
        }
    }

    /// Replace the storage-to-envelope mapper.
    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper<StoredEvent, BrookEvent>>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Stream events in `range` in ascending position order.
    ///
    /// Positions without an event are skipped. Once `cancel` fires the stream
    /// yields a single `Cancelled` error and ends.
    pub fn read_range(&self, range: BrookRangeKey, cancel: CancellationToken) -> BrookEventStream {
        Box::pin(range_stream(
            Arc::clone(&self.storage),
            Arc::clone(&self.mapper),
            range,
            self.page_size,
            cancel,
        ))
    }
}

fn range_stream<S: BrookStorage + 'static>(
    storage: Arc<S>,
    mapper: Arc<dyn Mapper<StoredEvent, BrookEvent>>,
    range: BrookRangeKey,
    page_size: usize,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<BrookEvent>> + Send + 'static {
    async_stream::try_stream! {
        debug!(%range, page_size, "Reading brook range");

        let mut events = storage.events().query_events(&range, page_size);
        loop {
            if cancel.is_cancelled() {
                debug!(%range, "Read cancelled");
                Err::<(), _>(BrookError::Cancelled)?;
            }

            match events.next().await {
                Some(stored) => yield mapper.map(stored?),
                None => break,
            }
        }
    }
}
