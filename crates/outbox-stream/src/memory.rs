//! In-memory producer that records every accepted batch.
//!
//! Used by tests and dry runs. Failures can be injected for a specific send
//! or for every send, so callers can exercise their partial-failure paths.

use crate::batch::{EncodedEvent, EventBatch};
use crate::config::DEFAULT_MAX_BATCH_BYTES;
use crate::error::{StreamError, StreamResult};
use crate::producer::EventStreamProducer;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Producer that keeps accepted batches in memory.
#[derive(Debug)]
pub struct MemoryStreamProducer {
    max_batch_bytes: usize,
    batches: Mutex<Vec<Vec<EncodedEvent>>>,
    send_attempts: AtomicUsize,
    fail_on_attempt: Mutex<Option<usize>>,
    fail_all: AtomicBool,
    closed: AtomicBool,
}

impl Default for MemoryStreamProducer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_BYTES)
    }
}

impl MemoryStreamProducer {
    /// Producer whose batches use the given byte ceiling.
    pub fn new(max_batch_bytes: usize) -> Self {
        Self {
            max_batch_bytes,
            batches: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            fail_on_attempt: Mutex::new(None),
            fail_all: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Fail the `n`th send attempt (1-based, counted from creation).
    pub fn fail_on_send(&self, n: usize) {
        *self.fail_on_attempt.lock() = Some(n);
    }

    /// Fail every send until turned off again.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Batches accepted so far, in send order.
    pub fn batches(&self) -> Vec<Vec<EncodedEvent>> {
        self.batches.lock().clone()
    }

    /// Every accepted event, flattened in send order.
    pub fn events(&self) -> Vec<EncodedEvent> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Record ids of every accepted event, in send order.
    pub fn record_ids(&self) -> Vec<i64> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|e| e.record_id)
            .collect()
    }

    /// Send attempts including failed ones.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStreamProducer for MemoryStreamProducer {
    fn create_batch(&self) -> EventBatch {
        EventBatch::new(self.max_batch_bytes)
    }

    async fn send_batch(&self, batch: EventBatch) -> StreamResult<()> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        let attempt = self.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let injected = *self.fail_on_attempt.lock() == Some(attempt);
        if injected || self.fail_all.load(Ordering::SeqCst) {
            return Err(StreamError::Rejected(format!(
                "injected failure on send {attempt}"
            )));
        }

        debug!(attempt, events = batch.len(), "Memory producer accepted batch");
        self.batches.lock().push(batch.into_events());
        Ok(())
    }

    async fn close(&self) -> StreamResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(producer: &MemoryStreamProducer, ids: &[i64]) -> EventBatch {
        let mut batch = producer.create_batch();
        for id in ids {
            batch
                .try_append(EncodedEvent::new(*id, format!("e{id}"), vec![0; 8]))
                .unwrap();
        }
        batch
    }

    #[tokio::test]
    async fn test_records_accepted_batches() {
        let producer = MemoryStreamProducer::default();
        producer.send_batch(batch(&producer, &[1, 2])).await.unwrap();
        producer.send_batch(batch(&producer, &[3])).await.unwrap();

        assert_eq!(producer.batches().len(), 2);
        assert_eq!(producer.record_ids(), vec![1, 2, 3]);
        assert_eq!(producer.send_attempts(), 2);
    }

    #[tokio::test]
    async fn test_fail_on_nth_send() {
        let producer = MemoryStreamProducer::default();
        producer.fail_on_send(2);

        producer.send_batch(batch(&producer, &[1])).await.unwrap();
        let err = producer.send_batch(batch(&producer, &[2])).await.unwrap_err();
        assert!(matches!(err, StreamError::Rejected(_)));
        producer.send_batch(batch(&producer, &[3])).await.unwrap();

        assert_eq!(producer.record_ids(), vec![1, 3]);
        assert_eq!(producer.send_attempts(), 3);
    }

    #[tokio::test]
    async fn test_fail_all_and_close() {
        let producer = MemoryStreamProducer::default();
        producer.set_fail_all(true);
        assert!(producer.send_batch(batch(&producer, &[1])).await.is_err());
        producer.set_fail_all(false);

        producer.close().await.unwrap();
        assert!(producer.is_closed());
        let err = producer.send_batch(batch(&producer, &[2])).await.unwrap_err();
        assert!(matches!(err, StreamError::Closed));
        assert!(producer.events().is_empty());
    }

    #[test]
    fn test_create_batch_uses_ceiling() {
        let producer = MemoryStreamProducer::new(256);
        assert_eq!(producer.create_batch().max_bytes(), 256);
    }
}
