//! Size-bounded wire batches.
//!
//! A batch accepts encoded events until the next one would push it past the
//! byte ceiling chosen by the producer that created it. Each event is charged
//! its body and id lengths plus a fixed per-entry overhead for the stream
//! entry framing.

/// Bytes charged per entry on top of body and id (field names, entry id, framing).
pub const ENTRY_OVERHEAD_BYTES: usize = 64;

/// One event encoded for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
    /// Source row this event was built from.
    pub record_id: i64,
    /// Idempotency key downstream consumers deduplicate on.
    pub event_id: String,
    /// Serialized event body.
    pub body: Vec<u8>,
}

impl EncodedEvent {
    pub fn new(record_id: i64, event_id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            record_id,
            event_id: event_id.into(),
            body,
        }
    }

    /// Bytes this event costs inside a batch.
    pub fn wire_size(&self) -> usize {
        self.body.len() + self.event_id.len() + ENTRY_OVERHEAD_BYTES
    }
}

/// Ordered, size-bounded batch of encoded events.
#[derive(Debug, Clone)]
pub struct EventBatch {
    events: Vec<EncodedEvent>,
    size_bytes: usize,
    max_bytes: usize,
}

impl EventBatch {
    /// Empty batch with the given byte ceiling.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            events: Vec::new(),
            size_bytes: 0,
            max_bytes,
        }
    }

    /// Append `event` if it fits under the ceiling.
    ///
    /// On rejection the event is handed back unchanged so the caller can flush
    /// and retry it in a fresh batch.
    pub fn try_append(&mut self, event: EncodedEvent) -> Result<(), EncodedEvent> {
        let size = event.wire_size();
        match self.size_bytes.checked_add(size) {
            Some(total) if total <= self.max_bytes => {
                self.size_bytes = total;
                self.events.push(event);
                Ok(())
            }
            _ => Err(event),
        }
    }

    pub fn events(&self) -> &[EncodedEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<EncodedEvent> {
        self.events
    }

    /// Source record ids in append order.
    pub fn record_ids(&self) -> Vec<i64> {
        self.events.iter().map(|e| e.record_id).collect()
    }

    /// Event ids in append order.
    pub fn event_ids(&self) -> Vec<String> {
        self.events.iter().map(|e| e.event_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}
