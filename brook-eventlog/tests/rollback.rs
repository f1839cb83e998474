//! Integration tests for failed appends: validation, conflicts and rollback.
//!
//! Every failure is driven through `FaultyStore` / `CountingLockManager` so the
//! exact store calls made by the writer can be asserted.
//!
//! Run with: `cargo test -p brook-eventlog --test rollback`

use brook_domain::BrookPosition;
use brook_eventlog::{BrookError, BrookOptions, BrookService};
use brook_store::{CursorRepository, LockError, StoreError};
use brook_testkit::{
    brook_key, init_tracing, sample_events, sample_events_from, CountingLockManager, Fault,
    FaultyStore, StoreCall,
};
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Service = BrookService<FaultyStore, CountingLockManager>;

fn setup(options: BrookOptions) -> (Arc<FaultyStore>, Arc<CountingLockManager>, Service) {
    init_tracing();
    let store = Arc::new(FaultyStore::new());
    let locks = Arc::new(CountingLockManager::new());
    let service = BrookService::new(Arc::clone(&store), Arc::clone(&locks), options)
        .expect("Failed to build service");
    (store, locks, service)
}

fn pos(value: i64) -> BrookPosition {
    BrookPosition::new(value).expect("valid position")
}

#[tokio::test]
async fn test_invalid_arguments_perform_no_io() {
    let options = BrookOptions {
        max_events_per_append: 4,
        ..BrookOptions::test()
    };
    let (store, locks, service) = setup(options);
    let key = brook_key("invalid");

    let empty = service.append(&key, Vec::new(), None).await.unwrap_err();
    let too_many = service.append(&key, sample_events(5), None).await.unwrap_err();

    assert!(matches!(empty, BrookError::InvalidArgument(_)));
    assert!(matches!(too_many, BrookError::InvalidArgument(_)));
    assert!(store.calls().is_empty());
    assert_eq!(locks.acquires(), 0);
}

#[tokio::test]
async fn test_version_conflict_creates_nothing() {
    let (store, locks, service) = setup(BrookOptions::test());
    let key = brook_key("conflict");
    store.inner().set_committed_cursor(&key, pos(5)).unwrap();

    let err = service
        .append(&key, sample_events(2), Some(pos(3)))
        .await
        .expect_err("Expected version conflict");

    assert!(matches!(err, BrookError::VersionConflict { expected: 3, actual: 5 }));
    assert_eq!(store.pending_creations(), 0);
    assert!(store.append_batches().is_empty());
    assert!(!locks.is_held(&key.lock_resource()));
}

#[tokio::test]
async fn test_overflow_creates_nothing() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("overflow");
    store.inner().set_committed_cursor(&key, pos(i64::MAX - 2)).unwrap();

    let err = service.append(&key, sample_events(3), None).await.unwrap_err();

    assert!(matches!(err, BrookError::Overflow { count: 3, .. }));
    assert_eq!(store.pending_creations(), 0);
    assert!(store.append_batches().is_empty());
}

#[tokio::test]
async fn test_partial_failure_deletes_only_acknowledged_positions() {
    let (store, locks, service) = setup(BrookOptions::test());
    let key = brook_key("partial");
    store.fail_append_batch(2, Fault::Permanent);

    // 1. Three sub-batches (0-1, 2-3, 4-5); the 2nd fails
    let err = service
        .append(&key, sample_events(6), None)
        .await
        .expect_err("Expected sub-batch failure");
    assert!(matches!(err, BrookError::Store(StoreError::Database(_))));

    // 2. The 3rd sub-batch was never dispatched
    assert_eq!(store.append_batches(), vec![(0, 2), (2, 2)]);

    // 3. Only the 1st sub-batch's positions were deleted, then the pending cursor
    assert_eq!(store.deleted_positions(), vec![0, 1]);
    assert_eq!(store.calls().last(), Some(&StoreCall::DeletePendingCursor));

    // 4. The brook is back where it started
    assert!(store.inner().event_positions(&key).is_empty());
    assert!(store.inner().get_pending_cursor(&key).await.unwrap().is_none());
    assert_eq!(service.resolve_position(&key).await.unwrap(), BrookPosition::NOT_SET);
    assert!(!locks.is_held(&key.lock_resource()));
}

#[tokio::test]
async fn test_failed_cleanup_is_aggregated() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("aggregated");
    store
        .fail_append_batch(2, Fault::Permanent)
        .fail_event_deletes(Fault::Permanent)
        .fail_pending_deletes(Fault::Permanent);

    let err = service
        .append(&key, sample_events(6), None)
        .await
        .expect_err("Expected aggregated rollback");

    assert!(!err.is_clean());
    match err {
        BrookError::AggregatedRollback { source, cleanup } => {
            assert!(matches!(*source, BrookError::Store(StoreError::Database(_))));
            // delete 0, delete 1, delete pending cursor
            assert_eq!(cleanup.len(), 3);
        },
        other => panic!("Expected AggregatedRollback, got {other:?}"),
    }

    // Once the store heals, recovery finds the half-written append and rolls it back.
    store.heal();
    assert_eq!(service.resolve_position(&key).await.unwrap(), BrookPosition::NOT_SET);
    assert!(store.inner().event_positions(&key).is_empty());
}

#[tokio::test]
async fn test_orphaned_events_are_overwritten_by_next_append() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("orphans");
    store
        .fail_append_batch(2, Fault::Permanent)
        .fail_event_deletes(Fault::Permanent);

    let err = service.append(&key, sample_events(6), None).await.unwrap_err();
    assert!(matches!(err, BrookError::AggregatedRollback { ref cleanup, .. } if cleanup.len() == 2));

    // Pending cursor is gone; positions 0 and 1 hold orphans.
    store.heal();
    assert_eq!(store.inner().event_positions(&key), vec![0, 1]);
    assert_eq!(service.resolve_position(&key).await.unwrap(), BrookPosition::NOT_SET);

    let replacement = sample_events_from(100, 2);
    let position = service.append(&key, replacement.clone(), None).await.unwrap();
    assert_eq!(position, pos(1));

    let read: Vec<_> = service
        .read_all(&key, CancellationToken::new())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(read, replacement);
}

#[tokio::test]
async fn test_renewal_failure_rolls_back() {
    let options = BrookOptions {
        lease_renewal_threshold: Duration::ZERO,
        ..BrookOptions::test()
    };
    let (store, locks, service) = setup(options);
    let key = brook_key("renewal");
    locks.fail_renewals_from(2);

    let err = service.append(&key, sample_events(6), None).await.unwrap_err();

    assert!(matches!(err, BrookError::Lock(LockError::Lost { .. })));
    assert_eq!(store.append_batches(), vec![(0, 2)]);
    assert_eq!(store.deleted_positions(), vec![0, 1]);
    assert!(store.inner().get_pending_cursor(&key).await.unwrap().is_none());
    assert!(!locks.is_held(&key.lock_resource()));
}

#[tokio::test]
async fn test_pending_cursor_failure_is_cleaned_up() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("pending-fails");
    store.fail_create_pending(Fault::Permanent);

    let err = service.append(&key, sample_events(2), None).await.unwrap_err();

    assert!(matches!(err, BrookError::Store(StoreError::Database(_))));
    assert!(store.append_batches().is_empty());
    assert!(store.calls().contains(&StoreCall::DeletePendingCursor));
}

#[tokio::test]
async fn test_transient_single_batch_is_retried() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("transient");
    store.fail_append_batch(1, Fault::Transient);

    let position = service.append(&key, sample_events(2), None).await.unwrap();

    assert_eq!(position, pos(1));
    assert_eq!(store.append_batches(), vec![(0, 2), (0, 2)]);
    assert!(store.deleted_positions().is_empty());
}

#[tokio::test]
async fn test_commit_failure_leaves_pending_for_recovery() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("commit-fails");
    store.fail_commits(1);

    // 1. Events are durable but the commit failed: no rollback
    let err = service.append(&key, sample_events(3), None).await.unwrap_err();
    assert!(matches!(err, BrookError::Store(_)));
    assert!(store.deleted_positions().is_empty());
    assert_eq!(store.inner().event_positions(&key), vec![0, 1, 2]);
    assert!(store.inner().get_pending_cursor(&key).await.unwrap().is_some());

    // 2. Recovery rolls the write forward
    assert_eq!(service.resolve_position(&key).await.unwrap(), pos(2));
    assert!(store.inner().get_pending_cursor(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_append_is_rolled_back() {
    let (store, locks, service) = setup(BrookOptions::test());
    let key = brook_key("cancelled");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = service
        .append_with_cancellation(&key, sample_events(6), None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, BrookError::Cancelled));
    assert!(store.append_batches().is_empty());
    assert!(store.calls().contains(&StoreCall::DeletePendingCursor));
    assert_eq!(service.resolve_position(&key).await.unwrap(), BrookPosition::NOT_SET);
    assert!(!locks.is_held(&key.lock_resource()));
}

#[tokio::test]
async fn test_release_failure_does_not_mask_result() {
    let (_store, locks, service) = setup(BrookOptions::test());
    let key = brook_key("release-fails");
    locks.fail_releases();

    let position = service.append(&key, sample_events(1), None).await.unwrap();

    assert_eq!(position, pos(0));
    assert_eq!(locks.releases(), 1);
}

#[tokio::test]
async fn test_pending_cleanup_failure_after_commit_keeps_append() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("stale-pending");
    store.fail_pending_deletes(Fault::Permanent);

    // 1. The commit landed; only removing the pending cursor failed
    let position = service
        .append(&key, sample_events(2), None)
        .await
        .expect("Committed append must succeed");
    assert_eq!(position, pos(1));
    assert!(store.inner().get_pending_cursor(&key).await.unwrap().is_some());

    // 2. The committed cursor wins over the stale pending cursor
    assert_eq!(service.resolve_position(&key).await.unwrap(), pos(1));

    // 3. The next append continues from the committed head
    let next = service
        .append(&key, sample_events_from(2, 2), Some(pos(1)))
        .await
        .expect("Failed to append after stale pending cursor");
    assert_eq!(next, pos(3));
    assert_eq!(store.inner().event_positions(&key), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_timed_out_single_batch_is_deleted() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("timeout-single");
    // Every attempt lands but reports a timeout
    for nth in 1..=3 {
        store.fail_append_batch(nth, Fault::TimeoutAfterWrite);
    }

    let err = service.append(&key, sample_events(2), None).await.unwrap_err();

    assert!(matches!(err, BrookError::Store(StoreError::Timeout(_))));
    assert_eq!(store.append_batches().len(), 3);
    assert_eq!(store.deleted_positions(), vec![0, 1]);
    assert!(store.inner().event_positions(&key).is_empty());
    assert!(store.inner().get_pending_cursor(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_timed_out_sub_batch_is_deleted() {
    let (store, _locks, service) = setup(BrookOptions::test());
    let key = brook_key("timeout-sub-batch");
    store.fail_append_batch(2, Fault::TimeoutAfterWrite);

    let err = service.append(&key, sample_events(6), None).await.unwrap_err();

    assert!(matches!(err, BrookError::Store(StoreError::Timeout(_))));
    assert_eq!(store.append_batches(), vec![(0, 2), (2, 2)]);
    // The 2nd sub-batch may have landed, so its positions are cleaned up too
    assert_eq!(store.deleted_positions(), vec![0, 1, 2, 3]);
    assert!(store.inner().event_positions(&key).is_empty());
}
