//! Batch size estimation and splitting.
//!
//! Estimates are deliberately pessimistic: strings are counted twice to cover
//! JSON escaping and payloads are counted at their base64 width.

use brook_store::StoredEvent;

/// Fixed bytes charged per event document (keys, ids, metadata fields)
pub const EVENT_DOCUMENT_OVERHEAD: usize = 512;

/// Fixed bytes charged once per batch request
pub const REQUEST_ENVELOPE_OVERHEAD: usize = 1024;

/// Estimated serialized size of a single event document.
pub fn estimate_event_size(event: &StoredEvent) -> usize {
    let strings = event.event_id.len()
        + event.event_type.len()
        + event.data_content_type.len()
        + event.source.as_deref().map_or(0, str::len);

    EVENT_DOCUMENT_OVERHEAD + strings * 2 + base64_len(event.data.len())
}

/// Estimated serialized size of one batch request carrying `events`.
pub fn estimate_size(events: &[StoredEvent]) -> usize {
    events
        .iter()
        .map(estimate_event_size)
        .fold(REQUEST_ENVELOPE_OVERHEAD, usize::saturating_add)
}

/// Split `events` into ordered sub-batches within `max_count` events and
/// `max_bytes` estimated bytes each.
///
/// An event that alone exceeds `max_bytes` is emitted as a batch of one.
pub fn split_by_size_and_count(
    events: Vec<StoredEvent>,
    max_count: usize,
    max_bytes: usize,
) -> Vec<Vec<StoredEvent>> {
    let max_count = max_count.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<StoredEvent> = Vec::new();
    let mut current_bytes = REQUEST_ENVELOPE_OVERHEAD;

    for event in events {
        let size = estimate_event_size(&event);
        let over_count = current.len() >= max_count;
        let over_bytes = current_bytes.saturating_add(size) > max_bytes;

        if !current.is_empty() && (over_count || over_bytes) {
            batches.push(std::mem::take(&mut current));
            current_bytes = REQUEST_ENVELOPE_OVERHEAD;
        }

        current_bytes = current_bytes.saturating_add(size);
        current.push(event);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

fn base64_len(n: usize) -> usize {
    n.div_ceil(3).saturating_mul(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str, payload: usize) -> StoredEvent {
        StoredEvent {
            event_id: id.to_string(),
            event_type: "order.placed".to_string(),
            data_content_type: "application/json".to_string(),
            data: vec![b'x'; payload],
            source: None,
            time: Utc::now(),
        }
    }

    fn ids(batches: &[Vec<StoredEvent>]) -> Vec<Vec<String>> {
        batches
            .iter()
            .map(|batch| batch.iter().map(|e| e.event_id.clone()).collect())
            .collect()
    }

    #[test]
    fn test_base64_width() {
        assert_eq!(base64_len(0), 0);
        assert_eq!(base64_len(1), 4);
        assert_eq!(base64_len(3), 4);
        assert_eq!(base64_len(4), 8);
    }

    #[test]
    fn test_estimate_never_below_payload() {
        let events = vec![event("a", 1000), event("b", 10)];
        let estimate = estimate_size(&events);

        let raw: usize = events.iter().map(|e| e.data.len() + e.event_id.len() + e.event_type.len()).sum();
        assert!(estimate > raw);
        assert_eq!(
            estimate,
            REQUEST_ENVELOPE_OVERHEAD + estimate_event_size(&events[0]) + estimate_event_size(&events[1])
        );
    }

    #[test]
    fn test_estimate_counts_strings_twice() {
        let plain = event("a", 0);
        let with_source = StoredEvent {
            source: Some("billing".to_string()),
            ..plain.clone()
        };

        assert_eq!(estimate_event_size(&with_source) - estimate_event_size(&plain), 14);
    }

    #[test]
    fn test_split_by_count() {
        let events: Vec<_> = (0..5).map(|i| event(&i.to_string(), 1)).collect();

        let batches = split_by_size_and_count(events, 2, usize::MAX);

        assert_eq!(
            ids(&batches),
            vec![vec!["0", "1"], vec!["2", "3"], vec!["4"]]
        );
    }

    #[test]
    fn test_split_by_size() {
        let events: Vec<_> = (0..4).map(|i| event(&i.to_string(), 300)).collect();
        let one = estimate_event_size(&events[0]);

        // Room for exactly two events plus the envelope.
        let max_bytes = REQUEST_ENVELOPE_OVERHEAD + one * 2;
        let batches = split_by_size_and_count(events, 100, max_bytes);

        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert!(estimate_size(batch) <= max_bytes);
        }
    }

    #[test]
    fn test_oversized_event_gets_own_batch() {
        let events = vec![event("small-1", 1), event("huge", 10_000), event("small-2", 1)];

        let batches = split_by_size_and_count(events, 10, 4_000);

        assert_eq!(ids(&batches), vec![vec!["small-1"], vec!["huge"], vec!["small-2"]]);
        assert_eq!(batches[1][0].data.len(), 10_000);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_by_size_and_count(Vec::new(), 10, 10_000).is_empty());
    }
}
