//! Event assertions

use asc_upload::Event;
use tokio::sync::broadcast;

/// Everything currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `(index, total, bytes)` of every ChunkUploaded event
pub fn chunk_events(events: &[Event]) -> Vec<(usize, usize, u64)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ChunkUploaded {
                index,
                total,
                bytes,
            } => Some((*index, *total, *bytes)),
            _ => None,
        })
        .collect()
}

/// Whether any event satisfies `predicate`
pub fn has_event(events: &[Event], predicate: impl Fn(&Event) -> bool) -> bool {
    events.iter().any(predicate)
}
