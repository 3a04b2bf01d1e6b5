//! Producer contract shared by every event stream backend.

use crate::batch::EventBatch;
use crate::error::StreamResult;
use async_trait::async_trait;

/// A long-lived handle that appends batches of events to a stream.
///
/// Batches come from [`create_batch`](Self::create_batch) so the byte ceiling
/// stays a property of the backend. `send_batch` is all-or-nothing: on `Ok`
/// every event of the batch was accepted, on `Err` none may be assumed
/// delivered.
#[async_trait]
pub trait EventStreamProducer: Send + Sync {
    /// Empty batch sized for this backend.
    fn create_batch(&self) -> EventBatch;

    /// Append the batch atomically, waiting for the backend acknowledgment.
    async fn send_batch(&self, batch: EventBatch) -> StreamResult<()>;

    /// Release the connection. Later sends fail with `StreamError::Closed`.
    async fn close(&self) -> StreamResult<()>;
}
