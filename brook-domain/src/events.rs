//! Brook event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default content type for event payloads.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Event envelope passed by callers to append and returned by reads.
///
/// The payload is opaque bytes; `content_type` says how to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrookEvent {
    /// Unique event identifier
    pub id: String,
    /// Event type name (e.g., "ORDER_PLACED")
    pub event_type: String,
    /// MIME type of `data`
    pub content_type: String,
    /// Raw payload bytes
    pub data: Vec<u8>,
    /// Component that emitted the event
    pub source: Option<String>,
    /// When the event occurred
    pub time: DateTime<Utc>,
}

impl BrookEvent {
    /// Create a new event with a time-ordered id and the current timestamp
    pub fn new(event_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type: event_type.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            data: data.into(),
            source: None,
            time: Utc::now(),
        }
    }

    /// Create an event whose payload is the JSON encoding of `payload`
    pub fn json<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_vec(payload)?))
    }

    /// Set event ID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set occurrence time
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }
}
