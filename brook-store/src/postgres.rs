//! PostgreSQL document store and lease lock manager.
//!
//! This module provides:
//! - `PgBrookStore`: cursor and event documents, one row per document
//! - `PgLockManager`: leases kept in the `brook_locks` table
//! - `migrate`: runs the embedded schema migrations
//!
//! Rows are written one statement at a time so the backend offers the same
//! per-document atomicity as any document database. `append_batch` is a
//! single multi-row statement and therefore all-or-nothing.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::documents::{CommittedCursor, PendingCursor, StoredEvent};
use crate::error::StoreError;
use crate::lock::{DistributedLock, DistributedLockManager, LockError};
use crate::repository::{BrookStorage, CursorRepository, EventRepository, StoredEventStream};
use async_trait::async_trait;
use brook_domain::{BrookKey, BrookPosition, BrookRangeKey};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const COMMITTED: &str = "committed";
const PENDING: &str = "pending";

/// Run all pending migrations.
///
/// Idempotent: safe to run multiple times.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    info!("Running brook migrations...");

    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {}", e)))?;

    info!("Brook migrations completed");
    Ok(())
}

// =============================================================================
// Document Store
// =============================================================================

/// PostgreSQL adapter for brook cursor and event documents.
pub struct PgBrookStore {
    /// PostgreSQL connection pool
    pool: Arc<PgPool>,
}

impl PgBrookStore {
    /// Create a new PostgreSQL brook store.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn position_from_db(value: i64) -> Result<BrookPosition, StoreError> {
    Ok(BrookPosition::new(value)?)
}

fn parse_event_row(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        data_content_type: row.try_get("data_content_type")?,
        data: row.try_get("data")?,
        source: row.try_get("source")?,
        time: row.try_get::<DateTime<Utc>, _>("event_time")?,
    })
}

#[async_trait]
impl CursorRepository for PgBrookStore {
    async fn get_committed_cursor(&self, key: &BrookKey) -> Result<Option<CommittedCursor>, StoreError> {
        let position: Option<i64> = sqlx::query_scalar(
            "SELECT position FROM brook_cursors WHERE brook_key = $1 AND kind = $2",
        )
        .bind(key.to_string())
        .bind(COMMITTED)
        .fetch_optional(&*self.pool)
        .await?;

        position
            .map(|value| Ok(CommittedCursor { position: position_from_db(value)? }))
            .transpose()
    }

    async fn get_pending_cursor(&self, key: &BrookKey) -> Result<Option<PendingCursor>, StoreError> {
        let row = sqlx::query(
            "SELECT position, original_position FROM brook_cursors WHERE brook_key = $1 AND kind = $2",
        )
        .bind(key.to_string())
        .bind(PENDING)
        .fetch_optional(&*self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let position: i64 = row.try_get("position")?;
        let original: Option<i64> = row.try_get("original_position")?;
        let original = original.ok_or_else(|| {
            StoreError::Deserialization(format!("pending cursor for {} has no original position", key))
        })?;

        Ok(Some(PendingCursor {
            original_position: position_from_db(original)?,
            position: position_from_db(position)?,
        }))
    }

    async fn create_pending_cursor(
        &self,
        key: &BrookKey,
        original: BrookPosition,
        target: BrookPosition,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO brook_cursors (brook_key, kind, position, original_position, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (brook_key, kind) DO UPDATE
                SET position = EXCLUDED.position,
                    original_position = EXCLUDED.original_position,
                    updated_at = NOW()
            "#,
        )
        .bind(key.to_string())
        .bind(PENDING)
        .bind(target.value())
        .bind(original.value())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn commit_cursor(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO brook_cursors (brook_key, kind, position, original_position, updated_at)
            VALUES ($1, $2, $3, NULL, NOW())
            ON CONFLICT (brook_key, kind) DO UPDATE
                SET position = EXCLUDED.position,
                    updated_at = NOW()
            "#,
        )
        .bind(key.to_string())
        .bind(COMMITTED)
        .bind(position.value())
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn delete_pending_cursor(&self, key: &BrookKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM brook_cursors WHERE brook_key = $1 AND kind = $2")
            .bind(key.to_string())
            .bind(PENDING)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl EventRepository for PgBrookStore {
    async fn event_exists(&self, key: &BrookKey, position: BrookPosition) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM brook_events WHERE brook_key = $1 AND position = $2)",
        )
        .bind(key.to_string())
        .bind(position.value())
        .fetch_one(&*self.pool)
        .await?;

        Ok(exists)
    }

    async fn delete_event(&self, key: &BrookKey, position: BrookPosition) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM brook_events WHERE brook_key = $1 AND position = $2")
            .bind(key.to_string())
            .bind(position.value())
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    async fn append_batch(
        &self,
        key: &BrookKey,
        events: &[StoredEvent],
        starting_position: BrookPosition,
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let start = starting_position.value();
        let positions: Vec<i64> = (0..events.len() as i64).map(|offset| start + offset).collect();
        let event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
        let event_types: Vec<String> = events.iter().map(|e| e.event_type.clone()).collect();
        let content_types: Vec<String> = events.iter().map(|e| e.data_content_type.clone()).collect();
        let data: Vec<Vec<u8>> = events.iter().map(|e| e.data.clone()).collect();
        let sources: Vec<Option<String>> = events.iter().map(|e| e.source.clone()).collect();
        let times: Vec<DateTime<Utc>> = events.iter().map(|e| e.time).collect();

        // Overwrites orphans a crashed writer may have left past the cursor.
        let result = sqlx::query(
            r#"
            INSERT INTO brook_events (
                brook_key, position, event_id, event_type, data_content_type,
                data, source, event_time
            )
            SELECT $1::text, * FROM UNNEST($2::bigint[], $3::text[], $4::text[], $5::text[],
                                     $6::bytea[], $7::text[], $8::timestamptz[])
            ON CONFLICT (brook_key, position) DO UPDATE
                SET event_id = EXCLUDED.event_id,
                    event_type = EXCLUDED.event_type,
                    data_content_type = EXCLUDED.data_content_type,
                    data = EXCLUDED.data,
                    source = EXCLUDED.source,
                    event_time = EXCLUDED.event_time,
                    written_at = NOW()
            "#,
        )
        .bind(key.to_string())
        .bind(&positions)
        .bind(&event_ids)
        .bind(&event_types)
        .bind(&content_types)
        .bind(&data)
        .bind(&sources)
        .bind(&times)
        .execute(&*self.pool)
        .await?;

        debug!(
            brook = %key,
            start = start,
            rows = result.rows_affected(),
            "Batch written"
        );

        Ok(())
    }

    fn query_events(&self, range: &BrookRangeKey, page_size: usize) -> StoredEventStream<'_> {
        let brook_key = range.key().to_string();
        let from = range.from().value();
        let to = range.to().value();
        let page_size = page_size.max(1) as i64;

        Box::pin(async_stream::try_stream! {
            let mut next = from;
            while next <= to {
                let rows = sqlx::query(
                    r#"
                    SELECT position, event_id, event_type, data_content_type, data, source, event_time
                    FROM brook_events
                    WHERE brook_key = $1 AND position >= $2 AND position <= $3
                    ORDER BY position ASC
                    LIMIT $4
                    "#,
                )
                .bind(&brook_key)
                .bind(next)
                .bind(to)
                .bind(page_size)
                .fetch_all(&*self.pool)
                .await?;

                let Some(last) = rows.last() else { break };
                let last_position: i64 = last.try_get("position")?;
                next = last_position + 1;

                for row in &rows {
                    yield parse_event_row(row)?;
                }
            }
        })
    }
}

impl BrookStorage for PgBrookStore {
    fn cursors(&self) -> &dyn CursorRepository {
        self
    }

    fn events(&self) -> &dyn EventRepository {
        self
    }
}

// =============================================================================
// Lease Lock Manager
// =============================================================================

fn lock_backend(err: sqlx::Error) -> LockError {
    LockError::Backend(err.to_string())
}

/// Lock manager keeping leases in the `brook_locks` table.
///
/// Acquisition is a conditional upsert that only succeeds if the row is
/// missing or its lease has expired, so exactly one caller wins.
#[derive(Clone)]
pub struct PgLockManager {
    pool: Arc<PgPool>,
}

impl PgLockManager {
    /// Create a new lock manager over `pool`.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributedLockManager for PgLockManager {
    async fn try_acquire(
        &self,
        resource: &str,
        lease: Duration,
    ) -> Result<Box<dyn DistributedLock>, LockError> {
        let lock_id = Uuid::new_v4();

        let granted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO brook_locks (resource, lock_id, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3::float8))
            ON CONFLICT (resource) DO UPDATE
                SET lock_id = EXCLUDED.lock_id,
                    expires_at = EXCLUDED.expires_at
                WHERE brook_locks.expires_at <= NOW()
            RETURNING lock_id
            "#,
        )
        .bind(resource)
        .bind(lock_id)
        .bind(lease.as_secs_f64())
        .fetch_optional(&*self.pool)
        .await
        .map_err(lock_backend)?;

        match granted {
            Some(id) if id == lock_id => Ok(Box::new(PgLock {
                pool: Arc::clone(&self.pool),
                resource: resource.to_string(),
                lock_id,
                lease,
                released: false,
            })),
            _ => Err(LockError::Contention {
                resource: resource.to_string(),
            }),
        }
    }
}

/// Lease handed out by [`PgLockManager`]
pub struct PgLock {
    pool: Arc<PgPool>,
    resource: String,
    lock_id: Uuid,
    lease: Duration,
    released: bool,
}

#[async_trait]
impl DistributedLock for PgLock {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn lock_id(&self) -> Uuid {
        self.lock_id
    }

    async fn renew(&mut self) -> Result<(), LockError> {
        let lost = || LockError::Lost {
            resource: self.resource.clone(),
            lock_id: self.lock_id,
        };
        if self.released {
            return Err(lost());
        }

        let result = sqlx::query(
            r#"
            UPDATE brook_locks
            SET expires_at = NOW() + make_interval(secs => $3::float8)
            WHERE resource = $1 AND lock_id = $2 AND expires_at > NOW()
            "#,
        )
        .bind(&self.resource)
        .bind(self.lock_id)
        .bind(self.lease.as_secs_f64())
        .execute(&*self.pool)
        .await
        .map_err(lock_backend)?;

        if result.rows_affected() == 0 {
            return Err(lost());
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }

        sqlx::query("DELETE FROM brook_locks WHERE resource = $1 AND lock_id = $2")
            .bind(&self.resource)
            .bind(self.lock_id)
            .execute(&*self.pool)
            .await
            .map_err(lock_backend)?;

        self.released = true;
        Ok(())
    }
}
