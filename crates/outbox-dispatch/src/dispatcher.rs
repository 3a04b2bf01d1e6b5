//! Cycle orchestration: read, transform, publish, commit.
//!
//! One cycle runs the four stages strictly in sequence. Shutdown is honored
//! only before the read and before the publish; once a batch is flushed its
//! ids are always committed in the same cycle.

use crate::commit::{CommitMarker, DEFAULT_COMMIT_CHUNK_SIZE};
use crate::error::{OutboxError, OutboxResult};
use crate::publisher::BatchPublisher;
use crate::reader::{BatchReader, DEFAULT_READ_LIMIT};
use crate::scheduler::TickScheduler;
use crate::store::OutboxStore;
use crate::transformer::{FieldRenames, MissingFieldPolicy, RecordTransformer};
use chrono::Utc;
use outbox_stream::EventStreamProducer;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum records read per cycle.
    pub read_limit: usize,
    /// Maximum ids per commit statement.
    pub commit_chunk_size: usize,
    /// Handling of missing `device_id` / `recorded_at`.
    pub missing_field_policy: MissingFieldPolicy,
    /// Output key remapping for encoded events.
    pub field_renames: FieldRenames,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            read_limit: DEFAULT_READ_LIMIT,
            commit_chunk_size: DEFAULT_COMMIT_CHUNK_SIZE,
            missing_field_policy: MissingFieldPolicy::default(),
            field_renames: FieldRenames::default(),
        }
    }
}

/// Counts for one cycle. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub read: usize,
    pub sent: usize,
    pub skipped_malformed: usize,
    pub skipped_too_large: usize,
    pub marked: usize,
    pub elapsed: Duration,
    /// The cycle stopped at a stage boundary because of shutdown.
    pub cancelled: bool,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            read: 0,
            sent: 0,
            skipped_malformed: 0,
            skipped_too_large: 0,
            marked: 0,
            elapsed: Duration::ZERO,
            cancelled: false,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_malformed + self.skipped_too_large
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle {}: read={} sent={} skipped_malformed={} skipped_too_large={} marked={} elapsed_ms={}{}",
            self.cycle_id,
            self.read,
            self.sent,
            self.skipped_malformed,
            self.skipped_too_large,
            self.marked,
            self.elapsed.as_millis(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Runs dispatch cycles against one store and one producer.
pub struct OutboxDispatcher {
    reader: BatchReader,
    transformer: RecordTransformer,
    publisher: BatchPublisher,
    committer: CommitMarker,
    producer: Arc<dyn EventStreamProducer>,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        producer: Arc<dyn EventStreamProducer>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            reader: BatchReader::new(Arc::clone(&store), config.read_limit),
            transformer: RecordTransformer::new(config.missing_field_policy, config.field_renames),
            publisher: BatchPublisher::new(Arc::clone(&producer)),
            committer: CommitMarker::new(store, config.commit_chunk_size),
            producer,
        }
    }

    /// Run one full cycle and log its summary.
    pub async fn run_cycle(&self) -> OutboxResult<CycleReport> {
        self.run_cycle_with(None).await
    }

    /// Like [`run_cycle`](Self::run_cycle), but stop at the next stage
    /// boundary (before read, before publish) once `shutdown` is `true`.
    pub async fn run_cycle_until(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> OutboxResult<CycleReport> {
        self.run_cycle_with(Some(shutdown)).await
    }

    async fn run_cycle_with(
        &self,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> OutboxResult<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::new();

        let result = self.execute(&mut report, shutdown).await;
        report.elapsed = started.elapsed();

        match result {
            Ok(()) => {
                info!(
                    cycle_id = %report.cycle_id,
                    read = report.read,
                    sent = report.sent,
                    skipped_malformed = report.skipped_malformed,
                    skipped_too_large = report.skipped_too_large,
                    marked = report.marked,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    cancelled = report.cancelled,
                    "Dispatch cycle complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    cycle_id = %report.cycle_id,
                    read = report.read,
                    sent = report.sent,
                    skipped_malformed = report.skipped_malformed,
                    skipped_too_large = report.skipped_too_large,
                    marked = report.marked,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    error = %e,
                    "Dispatch cycle failed"
                );
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        report: &mut CycleReport,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> OutboxResult<()> {
        let is_cancelled = || shutdown.is_some_and(|rx| *rx.borrow());

        if is_cancelled() {
            report.cancelled = true;
            return Ok(());
        }

        let records = self.reader.read().await?;
        report.read = records.len();
        if records.is_empty() {
            return Ok(());
        }

        let captured_at = Utc::now();
        let mut events = Vec::with_capacity(records.len());
        for record in &records {
            match self.transformer.prepare(record, captured_at) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(record_id = record.record_id, error = %e, "Skipping malformed record");
                    report.skipped_malformed += 1;
                }
            }
        }

        if is_cancelled() {
            report.cancelled = true;
            return Ok(());
        }

        let outcome = self.publisher.publish(events).await;
        report.sent = outcome.sent_count;
        report.skipped_too_large = outcome.skipped_too_large.len();

        // Batches accepted before a failed flush were delivered; commit them.
        match self.committer.mark_processed(&outcome.published_ids).await {
            Ok(marked) => report.marked = marked,
            Err(e) => {
                if let OutboxError::Commit { committed, .. } = &e {
                    report.marked = *committed;
                }
                if let Some(publish_err) = &outcome.aborted {
                    error!(error = %publish_err, "Publish also failed this cycle");
                }
                return Err(e);
            }
        }

        match outcome.aborted {
            Some(e) => Err(OutboxError::Publish(e)),
            None => Ok(()),
        }
    }

    /// Run cycles on `scheduler` until shutdown, then close the producer.
    pub async fn run_scheduled(
        self: Arc<Self>,
        scheduler: &TickScheduler,
        shutdown: watch::Receiver<bool>,
    ) -> OutboxResult<()> {
        let dispatcher = Arc::clone(&self);
        let cycle_shutdown = shutdown.clone();
        scheduler
            .run(
                move || {
                    let dispatcher = Arc::clone(&dispatcher);
                    let shutdown = cycle_shutdown.clone();
                    async move {
                        // Failures are logged by run_cycle_with and retried next tick.
                        let _ = dispatcher.run_cycle_until(&shutdown).await;
                    }
                },
                shutdown,
            )
            .await;

        self.close().await
    }

    /// Close the stream producer.
    pub async fn close(&self) -> OutboxResult<()> {
        self.producer.close().await?;
        Ok(())
    }
}
