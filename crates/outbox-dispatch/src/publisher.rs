//! Batch publisher: packs encoded events into size-bounded batches.
//!
//! One batch is open at a time. When an event does not fit, the open batch is
//! flushed and the event retried once in a fresh batch; an event that does not
//! fit an empty batch is skipped as too large. Publishing stops at the first
//! failed flush, and the outcome keeps the ids of every batch accepted before
//! it.

use outbox_stream::{EncodedEvent, EventBatch, EventStreamProducer, StreamError};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What a publish call delivered.
#[derive(Debug, Default)]
pub struct PublishOutcome {
    /// Events accepted by the stream.
    pub sent_count: usize,
    /// Record ids of accepted events, in send order.
    pub published_ids: Vec<i64>,
    /// Event ids dropped because they exceed an empty batch.
    pub skipped_too_large: Vec<String>,
    /// Batches accepted by the stream.
    pub batches_sent: usize,
    /// Set when a flush failed and publishing stopped early.
    pub aborted: Option<StreamError>,
}

impl PublishOutcome {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

pub struct BatchPublisher {
    producer: Arc<dyn EventStreamProducer>,
}

impl BatchPublisher {
    pub fn new(producer: Arc<dyn EventStreamProducer>) -> Self {
        Self { producer }
    }

    /// Publish `events` in order.
    pub async fn publish(&self, events: Vec<EncodedEvent>) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        let mut batch = self.producer.create_batch();

        for event in events {
            let event = match batch.try_append(event) {
                Ok(()) => continue,
                Err(event) => event,
            };

            if !batch.is_empty() {
                let full = std::mem::replace(&mut batch, self.producer.create_batch());
                if let Err(e) = self.flush(full, &mut outcome).await {
                    outcome.aborted = Some(e);
                    return outcome;
                }
            }

            if let Err(event) = batch.try_append(event) {
                warn!(
                    record_id = event.record_id,
                    event_id = %event.event_id,
                    size = event.wire_size(),
                    max_bytes = batch.max_bytes(),
                    "Event exceeds batch ceiling, skipping"
                );
                outcome.skipped_too_large.push(event.event_id);
            }
        }

        if !batch.is_empty() {
            if let Err(e) = self.flush(batch, &mut outcome).await {
                outcome.aborted = Some(e);
            }
        }

        outcome
    }

    async fn flush(&self, batch: EventBatch, outcome: &mut PublishOutcome) -> Result<(), StreamError> {
        let ids = batch.record_ids();
        let bytes = batch.size_bytes();

        match self.producer.send_batch(batch).await {
            Ok(()) => {
                debug!(events = ids.len(), bytes, "Flushed batch");
                outcome.sent_count += ids.len();
                outcome.batches_sent += 1;
                outcome.published_ids.extend(ids);
                Ok(())
            }
            Err(e) => {
                error!(
                    events = ids.len(),
                    already_sent = outcome.sent_count,
                    error = %e,
                    "Batch flush failed"
                );
                Err(e)
            }
        }
    }
}
