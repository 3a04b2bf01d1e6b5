//! Dispatcher startup and shutdown.

use super::signals::spawn_signal_listener;
use crate::liveness::LivenessServer;
use outbox_config::Config;
use outbox_database::TelemetryDatabase;
use outbox_dispatch::{OutboxDispatcher, TickScheduler};
use outbox_stream::RedisStreamProducer;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Open the source store and connect the producer, logging each step.
async fn connect(
    config: &Config,
) -> Result<(TelemetryDatabase, OutboxDispatcher), Box<dyn std::error::Error>> {
    let stream_config = config.stream_config()?;
    info!(
        db_path = %config.db_path()?.display(),
        stream_key = %stream_config.stream_key,
        read_limit = config.read_limit,
        max_batch_bytes = config.max_batch_bytes,
        commit_chunk_size = config.commit_chunk_size,
        tick_interval_secs = config.tick_interval_secs,
        "Configuration loaded"
    );

    let db = TelemetryDatabase::open(config.db_path()?, config.pool_config()).await?;
    db.health_check().await?;
    let stats = db.stats().await?;
    info!(
        pending = stats.pending,
        processed = stats.processed,
        last_record_id = ?stats.last_record_id,
        "Source store opened"
    );

    let producer = RedisStreamProducer::connect(stream_config).await?;
    info!("Event stream connected");

    let dispatcher = OutboxDispatcher::new(
        Arc::new(db.clone()),
        Arc::new(producer),
        config.dispatcher_config()?,
    );
    Ok((db, dispatcher))
}

/// Run the dispatcher until SIGINT/SIGTERM.
pub async fn run_dispatcher(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting telemetry outbox dispatcher");

    let (db, dispatcher) = connect(&config).await?;
    let liveness = LivenessServer::start(config.liveness_port).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = spawn_signal_listener(shutdown_tx);

    let scheduler = TickScheduler::new(config.tick_interval());
    let result = Arc::new(dispatcher)
        .run_scheduled(&scheduler, shutdown_rx)
        .await;
    signals.abort();

    let pool = db.pool_state();
    drop(db);
    info!(
        connections = pool.connections,
        idle_connections = pool.idle_connections,
        "Source pool released"
    );

    liveness.shutdown().await;
    info!("Dispatcher stopped");

    result?;
    Ok(())
}

/// Run a single cycle and print its report.
pub async fn run_once(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (_db, dispatcher) = connect(&config).await?;

    let result = dispatcher.run_cycle().await;
    dispatcher.close().await?;

    let report = result?;
    println!("{}", report);
    Ok(())
}
