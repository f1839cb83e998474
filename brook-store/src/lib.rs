//! Brook Storage Layer
//!
//! Document-store ports and adapters for brook event logs.
//!
//! # Architecture
//!
//! - **Repository traits**: cursor and event document operations (ports)
//! - **Lock traits**: lease-based distributed lock manager (port)
//! - **In-memory adapters**: fast implementations for testing
//! - **PostgreSQL adapters**: production implementations (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use brook_domain::{BrookKey, BrookPosition};
//! use brook_store::{BrookStorage, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let key = BrookKey::new("order", "42").unwrap();
//!
//!     let target = BrookPosition::new(2).unwrap();
//!     store.cursors().create_pending_cursor(&key, BrookPosition::NOT_SET, target).await.unwrap();
//!     store.cursors().commit_cursor(&key, target).await.unwrap();
//!
//!     let cursor = store.cursors().get_committed_cursor(&key).await.unwrap();
//!     assert_eq!(cursor.map(|c| c.position), Some(target));
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod documents;
mod error;
mod lock;
mod mapping;
mod memory;
mod memory_lock;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use documents::{CommittedCursor, PendingCursor, StoredEvent};
pub use error::StoreError;
pub use lock::{DistributedLock, DistributedLockManager, LockError};
pub use mapping::{BrookEventToStoredEvent, StoredEventToBrookEvent};
pub use memory::MemoryStore;
pub use memory_lock::{MemoryLock, MemoryLockManager};
#[cfg(feature = "postgres")]
pub use postgres::{migrate, PgBrookStore, PgLock, PgLockManager};
pub use repository::{BrookStorage, CursorRepository, EventRepository, StoredEventStream};
