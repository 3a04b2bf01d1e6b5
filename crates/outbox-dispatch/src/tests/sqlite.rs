//! Full cycles against a real SQLite outbox.

use crate::{DispatcherConfig, OutboxDispatcher};
use outbox_database::{NewTelemetryRecord, PoolConfig, TelemetryDatabase};
use outbox_stream::MemoryStreamProducer;
use std::sync::Arc;

async fn open_db(dir: &tempfile::TempDir) -> TelemetryDatabase {
    TelemetryDatabase::open(dir.path().join("outbox.db"), PoolConfig::default())
        .await
        .unwrap()
}

fn new_record(i: usize) -> NewTelemetryRecord {
    NewTelemetryRecord {
        device_id: Some(format!("truck-{}", i % 7)),
        recorded_at: Some(format!("{}", 1_714_566_600 + i as i64)),
        latitude: Some(40.4168),
        longitude: Some(-3.7038),
        speed_kph: Some(80.0),
        ..Default::default()
    }
}

#[tokio::test]
async fn reads_1000_of_1200_in_ascending_order() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    db.insert_records((0..1200).map(new_record).collect())
        .await
        .unwrap();

    let producer = Arc::new(MemoryStreamProducer::default());
    let dispatcher = OutboxDispatcher::new(
        Arc::new(db.clone()),
        producer.clone(),
        DispatcherConfig::default(),
    );

    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.read, 1000);
    assert_eq!(report.marked, 1000);
    assert_eq!(producer.record_ids(), (1..=1000).collect::<Vec<i64>>());

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.pending, 200);
    assert_eq!(stats.processed, 1000);

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.read, 200);
    assert_eq!(db.stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn failed_flush_leaves_rows_pending_in_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    db.insert_records((0..10).map(new_record).collect())
        .await
        .unwrap();

    let producer = Arc::new(MemoryStreamProducer::default());
    producer.set_fail_all(true);
    let dispatcher = OutboxDispatcher::new(
        Arc::new(db.clone()),
        producer.clone(),
        DispatcherConfig::default(),
    );

    assert!(dispatcher.run_cycle().await.is_err());
    assert_eq!(db.stats().await.unwrap().pending, 10);

    producer.set_fail_all(false);
    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.marked, 10);

    let record = db.get_record(1).await.unwrap().unwrap();
    assert!(record.is_processed());
    assert!(record.processed_at.is_some());
}

#[tokio::test]
async fn commit_chunks_against_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    db.insert_records((0..1300).map(new_record).collect())
        .await
        .unwrap();

    let config = DispatcherConfig {
        read_limit: 1300,
        commit_chunk_size: 500,
        ..DispatcherConfig::default()
    };
    let dispatcher = OutboxDispatcher::new(
        Arc::new(db.clone()),
        Arc::new(MemoryStreamProducer::default()),
        config,
    );

    let report = dispatcher.run_cycle().await.unwrap();
    assert_eq!(report.marked, 1300);
    assert_eq!(db.stats().await.unwrap().processed, 1300);
}

#[tokio::test]
async fn mistyped_column_does_not_block_other_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let ids = db
        .insert_records((0..3).map(new_record).collect())
        .await
        .unwrap();
    let odd = ids[1];
    db.call(move |conn| {
        conn.execute(
            "UPDATE telemetry_records SET latitude = 'not-a-number' WHERE record_id = ?1",
            [odd],
        )?;
        Ok(())
    })
    .await
    .unwrap();

    let producer = Arc::new(MemoryStreamProducer::default());
    let dispatcher = OutboxDispatcher::new(
        Arc::new(db.clone()),
        producer.clone(),
        DispatcherConfig::default(),
    );

    let report = dispatcher.run_cycle().await.unwrap();

    assert_eq!(report.read, 3);
    assert_eq!(report.marked, 3);
    assert_eq!(producer.record_ids(), ids);
    assert_eq!(db.stats().await.unwrap().pending, 0);

    let body: serde_json::Value = serde_json::from_slice(&producer.events()[1].body).unwrap();
    assert!(body.get("latitude").is_none());
    assert_eq!(body["longitude"], -3.7038);
}
