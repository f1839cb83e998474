//! Test helpers for brook storage and event log tests.
//!
//! Provides a fault-injecting store, a counting lock manager, event fixtures
//! and tracing setup.

mod faults;
mod fixtures;
mod locks;

pub use faults::{Fault, FaultyStore, StoreCall};
pub use fixtures::{
    brook_key, init_tracing, large_event, sample_events, sample_events_from, sample_stored_events,
};
pub use locks::{CountingLock, CountingLockManager};

pub use anyhow::Result;

/// Setup a clean test database by running migrations.
///
/// Convenience function for tests that need a fresh schema.
#[cfg(feature = "postgres")]
pub async fn setup_test_db(pool: &sqlx::PgPool) -> Result<()> {
    brook_store::migrate(pool).await?;
    Ok(())
}
