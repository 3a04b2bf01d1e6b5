//! Event stream producers for the telemetry outbox.
//!
//! The dispatcher only talks to [`EventStreamProducer`]. Two backends ship
//! with the crate:
//!
//! - [`RedisStreamProducer`]: appends each batch to a Redis stream in one
//!   `MULTI`/`EXEC` transaction
//! - [`MemoryStreamProducer`]: keeps batches in memory, with failure injection
//!
//! Batches are created by the producer so the byte ceiling stays a backend
//! property:
//!
//! ```ignore
//! let mut batch = producer.create_batch();
//! if let Err(event) = batch.try_append(event) {
//!     producer.send_batch(batch).await?;
//!     // retry `event` in a fresh batch
//! }
//! ```

mod batch;
mod config;
mod error;
mod memory;
mod producer;
mod redis_producer;

pub use batch::{EncodedEvent, EventBatch, ENTRY_OVERHEAD_BYTES};
pub use config::{StreamConfig, DEFAULT_MAX_BATCH_BYTES};
pub use error::{StreamError, StreamResult};
pub use memory::MemoryStreamProducer;
pub use producer::EventStreamProducer;
pub use redis_producer::RedisStreamProducer;
