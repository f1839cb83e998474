//! Event fixtures and tracing setup for tests.

use brook_domain::{BrookEvent, BrookKey, Mapper};
use brook_store::{BrookEventToStoredEvent, StoredEvent};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING: Once = Once::new();

/// Install a test subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `brook=debug` style output for the brook crates.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("brook_eventlog=debug,brook_store=debug,brook_testkit=info")
        });

        // Another harness may already own the global subscriber.
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(filter)
            .try_init();
    });
}

/// Key of a brook of type `order` with the given entity id
pub fn brook_key(entity_id: &str) -> BrookKey {
    BrookKey::new("order", entity_id).unwrap_or_else(|e| panic!("invalid fixture key {entity_id}: {e}"))
}

/// `n` JSON events with ids `evt-0 .. evt-{n-1}` and increasing timestamps
pub fn sample_events(n: usize) -> Vec<BrookEvent> {
    sample_events_from(0, n)
}

/// `n` JSON events with ids starting at `evt-{first}`
pub fn sample_events_from(first: usize, n: usize) -> Vec<BrookEvent> {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);

    (first..first + n)
        .map(|i| {
            let payload = json!({ "line": i, "sku": format!("SKU-{i:04}"), "quantity": 1 });
            BrookEvent::new("order.line_added", payload.to_string().into_bytes())
                .with_id(format!("evt-{i}"))
                .with_source("brook-testkit")
                .with_time(base + chrono::Duration::seconds(i as i64))
        })
        .collect()
}

/// One event whose payload alone is `bytes` long
pub fn large_event(id: &str, bytes: usize) -> BrookEvent {
    BrookEvent::new("order.attachment_added", vec![b'a'; bytes])
        .with_id(id)
        .with_content_type("application/octet-stream")
}

/// [`sample_events`] already mapped to their stored form
pub fn sample_stored_events(n: usize) -> Vec<StoredEvent> {
    sample_events(n)
        .into_iter()
        .map(|event| BrookEventToStoredEvent.map(event))
        .collect()
}
