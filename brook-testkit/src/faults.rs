//! Call-recording storage wrapper with scripted failures.

use async_trait::async_trait;
use brook_domain::{BrookKey, BrookPosition, BrookRangeKey};
use brook_store::{
    BrookStorage, CommittedCursor, CursorRepository, EventRepository, MemoryStore, PendingCursor,
    StoreError, StoredEvent, StoredEventStream,
};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One call made against [`FaultyStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `get_committed_cursor`
    GetCommittedCursor,
    /// `get_pending_cursor`
    GetPendingCursor,
    /// `create_pending_cursor`
    CreatePendingCursor {
        /// Position before the append
        original: i64,
        /// Position the append targets
        target: i64,
    },
    /// `commit_cursor`
    CommitCursor {
        /// Committed position
        position: i64,
    },
    /// `delete_pending_cursor`
    DeletePendingCursor,
    /// `event_exists`
    EventExists {
        /// Probed position
        position: i64,
    },
    /// `delete_event`
    DeleteEvent {
        /// Deleted position
        position: i64,
    },
    /// `append_batch`
    AppendBatch {
        /// First position of the batch
        start: i64,
        /// Events in the batch
        count: usize,
    },
    /// `query_events`
    QueryEvents {
        /// Range start
        from: i64,
        /// Range end
        to: i64,
    },
}

/// Kind of error an injected fault raises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Permanent failure, never retried
    Permanent,
    /// Transient failure, eligible for retry
    Transient,
    /// The write lands but the caller sees a timeout
    TimeoutAfterWrite,
}

impl Fault {
    fn error(self, operation: &str) -> StoreError {
        match self {
            Fault::Permanent => StoreError::Database(format!("injected failure in {operation}")),
            Fault::Transient => StoreError::Transient(format!("injected throttle in {operation}")),
            Fault::TimeoutAfterWrite => StoreError::Timeout(format!("injected timeout in {operation}")),
        }
    }
}

/// Work run inside an `append_batch` call, before the batch is written
type BatchHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct FaultPlan {
    /// 1-based `append_batch` call numbers that fail
    append_batch: Vec<(usize, Fault)>,
    /// 1-based `append_batch` call numbers that run a hook first
    append_batch_hooks: Vec<(usize, BatchHook)>,
    append_batch_calls: usize,
    create_pending: Option<Fault>,
    commit_failures_left: usize,
    delete_event: Option<Fault>,
    delete_pending: Option<Fault>,
}

/// Storage wrapper around [`MemoryStore`] that records every call and fails
/// the ones it is told to.
#[derive(Clone)]
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    plan: Arc<Mutex<FaultPlan>>,
}

impl FaultyStore {
    /// Wrap a fresh in-memory store
    pub fn new() -> Self {
        Self::wrap(Arc::new(MemoryStore::new()))
    }

    /// Wrap an existing in-memory store
    pub fn wrap(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
            plan: Arc::new(Mutex::new(FaultPlan::default())),
        }
    }

    /// Underlying store, for staging state and inspecting results
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fail the `nth` (1-based) `append_batch` call
    pub fn fail_append_batch(&self, nth: usize, fault: Fault) -> &Self {
        self.plan().append_batch.push((nth, fault));
        self
    }

    /// Run `hook` to completion inside the `nth` (1-based) `append_batch`
    /// call, before that batch is written.
    ///
    /// Lets a test interleave other work with an append in flight.
    pub fn before_append_batch<F, Fut>(&self, nth: usize, hook: F) -> &Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: BatchHook = Arc::new(move || hook().boxed());
        self.plan().append_batch_hooks.push((nth, hook));
        self
    }

    /// Fail every `create_pending_cursor` call
    pub fn fail_create_pending(&self, fault: Fault) -> &Self {
        self.plan().create_pending = Some(fault);
        self
    }

    /// Fail the next `times` `commit_cursor` calls permanently
    pub fn fail_commits(&self, times: usize) -> &Self {
        self.plan().commit_failures_left = times;
        self
    }

    /// Fail every `delete_event` call
    pub fn fail_event_deletes(&self, fault: Fault) -> &Self {
        self.plan().delete_event = Some(fault);
        self
    }

    /// Fail every `delete_pending_cursor` call
    pub fn fail_pending_deletes(&self, fault: Fault) -> &Self {
        self.plan().delete_pending = Some(fault);
        self
    }

    /// Stop failing anything
    pub fn heal(&self) {
        let mut plan = self.plan();
        let calls = plan.append_batch_calls;
        *plan = FaultPlan {
            append_batch_calls: calls,
            ..FaultPlan::default()
        };
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    /// `(start, count)` of every `append_batch` call
    pub fn append_batches(&self) -> Vec<(i64, usize)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::AppendBatch { start, count } => Some((start, count)),
                _ => None,
            })
            .collect()
    }

    /// Number of `create_pending_cursor` calls
    pub fn pending_creations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::CreatePendingCursor { .. }))
            .count()
    }

    /// Positions passed to `delete_event`, in call order
    pub fn deleted_positions(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::DeleteEvent { position } => Some(position),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        debug!(?call, "Store call");
        lock(&self.calls).push(call);
    }

    fn plan(&self) -> MutexGuard<'_, FaultPlan> {
        lock(&self.plan)
    }
}

impl Default for FaultyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CursorRepository for FaultyStore {
    async fn get_committed_cursor(&self, key: &BrookKey) -> Result<Option<CommittedCursor>, StoreError> {
        self.record(StoreCall::GetCommittedCursor);
        self.inner.get_committed_cursor(key).await
    }

    async fn get_pending_cursor(&self, key: &BrookKey) -> Result<Option<PendingCursor>, StoreError> {
        self.record(StoreCall::GetPendingCursor);
        self.inner.get_pending_cursor(key).await
    }

    async fn create_pending_cursor(
        &self,
        key: &BrookKey,
        original: BrookPosition,
        target: BrookPosition,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::CreatePendingCursor {
            original: original.value(),
            target: target.value(),
        });
        let fault = self.plan().create_pending;
        if let Some(fault) = fault {
            return Err(fault.error("create_pending_cursor"));
        }
        self.inner.create_pending_cursor(key, original, target).await
    }

    async fn commit_cursor(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError> {
        self.record(StoreCall::CommitCursor {
            position: position.value(),
        });
        {
            let mut plan = self.plan();
            if plan.commit_failures_left > 0 {
                plan.commit_failures_left -= 1;
                return Err(Fault::Permanent.error("commit_cursor"));
            }
        }
        self.inner.commit_cursor(key, position).await
    }

    async fn delete_pending_cursor(&self, key: &BrookKey) -> Result<(), StoreError> {
        self.record(StoreCall::DeletePendingCursor);
        let fault = self.plan().delete_pending;
        if let Some(fault) = fault {
            return Err(fault.error("delete_pending_cursor"));
        }
        self.inner.delete_pending_cursor(key).await
    }
}

#[async_trait]
impl EventRepository for FaultyStore {
    async fn event_exists(&self, key: &BrookKey, position: BrookPosition) -> Result<bool, StoreError> {
        self.record(StoreCall::EventExists {
            position: position.value(),
        });
        self.inner.event_exists(key, position).await
    }

    async fn delete_event(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError> {
        self.record(StoreCall::DeleteEvent {
            position: position.value(),
        });
        let fault = self.plan().delete_event;
        if let Some(fault) = fault {
            return Err(fault.error("delete_event"));
        }
        self.inner.delete_event(key, position).await
    }

    async fn append_batch(
        &self,
        key: &BrookKey,
        events: &[StoredEvent],
        starting_position: BrookPosition,
    ) -> Result<(), StoreError> {
        self.record(StoreCall::AppendBatch {
            start: starting_position.value(),
            count: events.len(),
        });

        let (fault, hook) = {
            let mut plan = self.plan();
            plan.append_batch_calls += 1;
            let call = plan.append_batch_calls;
            let fault = plan
                .append_batch
                .iter()
                .find(|(nth, _)| *nth == call)
                .map(|(_, fault)| *fault);
            let hook = plan
                .append_batch_hooks
                .iter()
                .find(|(nth, _)| *nth == call)
                .map(|(_, hook)| Arc::clone(hook));
            (fault, hook)
        };
        if let Some(hook) = hook {
            hook().await;
        }
        if let Some(fault) = fault {
            if fault == Fault::TimeoutAfterWrite {
                self.inner.append_batch(key, events, starting_position).await?;
            }
            return Err(fault.error("append_batch"));
        }

        self.inner.append_batch(key, events, starting_position).await
    }

    fn query_events(&self, range: &BrookRangeKey, page_size: usize) -> StoredEventStream<'_> {
        self.record(StoreCall::QueryEvents {
            from: range.from().value(),
            to: range.to().value(),
        });
        self.inner.query_events(range, page_size)
    }
}

impl BrookStorage for FaultyStore {
    fn cursors(&self) -> &dyn CursorRepository {
        self
    }

    fn events(&self) -> &dyn EventRepository {
        self
    }
}
