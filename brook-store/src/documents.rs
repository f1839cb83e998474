//! Persisted document shapes.
//!
//! The backing store only guarantees atomicity per document, so the brook
//! keeps its head in two separate documents: the committed cursor and the
//! pending (write-ahead) cursor.

use brook_domain::BrookPosition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted form of a brook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event identifier
    pub event_id: String,
    /// Event type name
    pub event_type: String,
    /// MIME type of `data`
    pub data_content_type: String,
    /// Raw payload bytes
    pub data: Vec<u8>,
    /// Component that emitted the event
    pub source: Option<String>,
    /// When the event occurred
    pub time: DateTime<Utc>,
}

/// Last position reached by a fully completed append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedCursor {
    /// Position of the last committed event
    pub position: BrookPosition,
}

/// Write-ahead intent: an append is moving the cursor from
/// `original_position` to `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCursor {
    /// Committed position before the append started
    pub original_position: BrookPosition,
    /// Position the append will commit on success
    pub position: BrookPosition,
}

impl PendingCursor {
    /// Positions the in-flight append writes, in order.
    pub fn pending_positions(&self) -> impl Iterator<Item = BrookPosition> {
        // Values in the range are all > original >= -1, so construction cannot fail.
        (self.original_position.value() + 1..=self.position.value())
            .filter_map(|value| BrookPosition::new(value).ok())
    }
}
