//! Outbox dispatch pipeline for telemetry records.
//!
//! This crate provides:
//! - BatchReader: pulls the next window of pending records
//! - RecordTransformer: turns records into keyed, normalized events
//! - BatchPublisher: packs events into size-bounded stream batches
//! - CommitMarker: marks delivered records processed in bounded chunks
//! - TickScheduler: fixed-cadence cycles that never overlap
//! - OutboxDispatcher: one read, transform, publish and commit cycle
//!
//! Delivery is at least once. A record is marked processed only after the
//! batch carrying its event was accepted by the stream; everything else stays
//! pending and is read again next tick.

mod commit;
mod dispatcher;
mod error;
mod publisher;
mod reader;
mod scheduler;
mod store;
mod transformer;

#[cfg(test)]
mod tests;

pub use commit::{CommitMarker, DEFAULT_COMMIT_CHUNK_SIZE, MAX_COMMIT_CHUNK_SIZE};
pub use dispatcher::{CycleReport, DispatcherConfig, OutboxDispatcher};
pub use error::{OutboxError, OutboxResult};
pub use publisher::{BatchPublisher, PublishOutcome};
pub use reader::{BatchReader, DEFAULT_READ_LIMIT};
pub use scheduler::{CycleGuard, SchedulerState, TickScheduler, TickStats, DEFAULT_TICK_INTERVAL};
pub use store::OutboxStore;
pub use transformer::{
    event_id, format_timestamp, parse_timestamp, FieldRenames, MissingFieldPolicy,
    RecordTransformer, TransformError, TransformedEvent, EVENT_FIELDS, UNKNOWN_DEVICE,
};
