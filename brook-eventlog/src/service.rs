//! Brook service facade wiring writer, reader and recovery to one store.

use crate::config::{BrookOptions, ConfigError};
use crate::error::Result;
use crate::reader::{BrookEventStream, BrookReader};
use crate::recovery::RecoveryService;
use crate::writer::BrookWriter;
use brook_domain::{BrookEvent, BrookKey, BrookPosition, BrookRangeKey};
use brook_store::{BrookStorage, DistributedLockManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Entry point for appending to, reading from and resolving brooks.
pub struct BrookService<S: BrookStorage + 'static, L: DistributedLockManager + 'static> {
    writer: BrookWriter<S, L>,
    reader: BrookReader<S>,
    recovery: Arc<RecoveryService<S, L>>,
    options: BrookOptions,
}

impl<S: BrookStorage + 'static, L: DistributedLockManager + 'static> BrookService<S, L> {
    /// Create a service over `storage`, serialising writers through `locks`.
    ///
    /// # Errors
    /// Returns `ConfigError` if `options` fail validation.
    pub fn new(
        storage: Arc<S>,
        locks: Arc<L>,
        options: BrookOptions,
    ) -> std::result::Result<Self, ConfigError> {
        options.validate()?;

        let recovery = Arc::new(RecoveryService::new(
            Arc::clone(&storage),
            Arc::clone(&locks),
            options.clone(),
        ));
        let writer = BrookWriter::with_recovery(
            Arc::clone(&storage),
            locks,
            Arc::clone(&recovery),
            options.clone(),
        );
        let reader = BrookReader::new(storage, options.query_page_size);

        Ok(Self {
            writer,
            reader,
            recovery,
            options,
        })
    }

    /// Append events, optionally checking the brook is at `expected_version`.
    pub async fn append(
        &self,
        key: &BrookKey,
        events: Vec<BrookEvent>,
        expected_version: Option<BrookPosition>,
    ) -> Result<BrookPosition> {
        self.writer.append(key, events, expected_version).await
    }

    /// Append, giving up before the next sub-batch once `cancel` fires.
    pub async fn append_with_cancellation(
        &self,
        key: &BrookKey,
        events: Vec<BrookEvent>,
        expected_version: Option<BrookPosition>,
        cancel: &CancellationToken,
    ) -> Result<BrookPosition> {
        self.writer
            .append_with_cancellation(key, events, expected_version, cancel)
            .await
    }

    /// Stream the events in `range`.
    pub fn read_range(&self, range: BrookRangeKey, cancel: CancellationToken) -> BrookEventStream {
        self.reader.read_range(range, cancel)
    }

    /// Stream every committed event of `key`.
    ///
    /// Resolves the brook first so a crashed writer's events are never read.
    /// An empty brook yields an empty stream.
    pub async fn read_all(&self, key: &BrookKey, cancel: CancellationToken) -> Result<BrookEventStream> {
        let head = self.resolve_position(key).await?;
        if !head.is_set() {
            return Ok(Box::pin(futures::stream::empty()));
        }

        let range = BrookRangeKey::new(key.clone(), BrookPosition::new(0)?, head)?;
        Ok(self.reader.read_range(range, cancel))
    }

    /// Resolve the brook's committed position, recovering it if needed.
    pub async fn resolve_position(&self, key: &BrookKey) -> Result<BrookPosition> {
        self.recovery.resolve_position(key).await
    }

    /// Active configuration
    pub fn options(&self) -> &BrookOptions {
        &self.options
    }
}
