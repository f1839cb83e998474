//! Brook Event Log
//!
//! Append-only event brooks on top of a document store without transactions:
//! - Write-ahead pending cursor, committed only after every event is durable
//! - Size- and count-bounded sub-batches with lease renewal
//! - Rollback of partial writes, with every cleanup failure surfaced
//! - Crash recovery that rolls interrupted appends forward or back
//! - Cancelable, paged range reads
//!
//! # Usage
//!
//! ```rust
//! use brook_domain::{BrookEvent, BrookKey, BrookPosition};
//! use brook_eventlog::{BrookOptions, BrookService};
//! use brook_store::{MemoryLockManager, MemoryStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = BrookService::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryLockManager::new()),
//!     BrookOptions::default(),
//! )?;
//!
//! let key = BrookKey::new("order", "42")?;
//! let event = BrookEvent::json("order.placed", &serde_json::json!({ "total": 125 }))?;
//!
//! let position = service.append(&key, vec![event], Some(BrookPosition::NOT_SET)).await?;
//! assert_eq!(position.value(), 0);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod batching;
pub mod config;
pub mod error;
pub mod reader;
pub mod recovery;
pub mod retry;
pub mod service;
pub mod writer;

pub use batching::{estimate_size, split_by_size_and_count};
pub use config::{BrookOptions, ConfigError, RetryConfig, MAX_EVENTS_PER_APPEND_CEILING};
pub use error::{BrookError, Result};
pub use reader::{BrookEventStream, BrookReader};
pub use recovery::RecoveryService;
pub use retry::RetryPolicy;
pub use service::BrookService;
pub use writer::{BrookWriter, RENEW_EVERY_N_BATCHES};
