//! Mappers between [`BrookEvent`] and [`StoredEvent`].

use brook_domain::{BrookEvent, Mapper};

use crate::documents::StoredEvent;

/// Maps caller envelopes to their persisted form.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrookEventToStoredEvent;

impl Mapper<BrookEvent, StoredEvent> for BrookEventToStoredEvent {
    fn map(&self, input: BrookEvent) -> StoredEvent {
        StoredEvent {
            event_id: input.id,
            event_type: input.event_type,
            data_content_type: input.content_type,
            data: input.data,
            source: input.source,
            time: input.time,
        }
    }
}

/// Maps persisted events back to caller envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredEventToBrookEvent;

impl Mapper<StoredEvent, BrookEvent> for StoredEventToBrookEvent {
    fn map(&self, input: StoredEvent) -> BrookEvent {
        BrookEvent {
            id: input.event_id,
            event_type: input.event_type,
            content_type: input.data_content_type,
            data: input.data,
            source: input.source,
            time: input.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_preserves_fields() {
        let event = BrookEvent::new("ORDER_PLACED", b"payload".to_vec())
            .with_source("orders-api")
            .with_content_type("application/octet-stream");

        let stored = BrookEventToStoredEvent.map(event.clone());
        assert_eq!(stored.event_id, event.id);
        assert_eq!(stored.data_content_type, "application/octet-stream");

        let back = StoredEventToBrookEvent.map(stored);
        assert_eq!(back, event);
    }
}
