//! Redis Streams producer.
//!
//! Each batch becomes one `MULTI`/`EXEC` pipeline of `XADD` commands. Redis
//! still runs the other commands when one `XADD` fails inside `EXEC`, so the
//! send is only reported all-or-nothing: any failure or a short reply fails
//! the whole batch, which is then redelivered. Delivery is at-least-once.
//! Entry fields: `event_id`, `record_id`, `payload`.

use crate::batch::EventBatch;
use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::producer::EventStreamProducer;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Pipeline};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Producer appending to a single Redis stream.
pub struct RedisStreamProducer {
    client: Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    config: StreamConfig,
}

impl RedisStreamProducer {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn connect(config: StreamConfig) -> StreamResult<Self> {
        config.validate()?;

        let client = Client::open(config.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!(
            stream = %config.stream_key,
            max_batch_bytes = config.max_batch_bytes,
            max_len = ?config.max_len,
            "Connected to Redis stream"
        );

        Ok(Self {
            client,
            conn: Mutex::new(Some(conn)),
            config,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Replace a dropped connection so the next send starts clean.
    async fn reconnect(&self) -> StreamResult<()> {
        info!("Reconnecting to Redis...");
        let fresh = self.client.get_multiplexed_async_connection().await?;
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            *guard = Some(fresh);
        }
        Ok(())
    }
}

/// Build the atomic `XADD` pipeline for one batch.
fn build_pipeline(config: &StreamConfig, batch: &EventBatch) -> Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for event in batch.events() {
        let cmd = pipe.cmd("XADD").arg(&config.stream_key);
        if let Some(max_len) = config.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*")
            .arg("event_id")
            .arg(&event.event_id)
            .arg("record_id")
            .arg(event.record_id)
            .arg("payload")
            .arg(event.body.as_slice());
    }
    pipe
}

/// Every `XADD` in the batch must have returned an entry id.
fn check_entry_ids(expected: usize, entry_ids: &[String]) -> StreamResult<()> {
    if entry_ids.len() != expected {
        return Err(StreamError::Rejected(format!(
            "expected {} entry ids, got {}",
            expected,
            entry_ids.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl EventStreamProducer for RedisStreamProducer {
    fn create_batch(&self) -> EventBatch {
        EventBatch::new(self.config.max_batch_bytes)
    }

    async fn send_batch(&self, batch: EventBatch) -> StreamResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self
            .conn
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(StreamError::Closed)?;

        let pipe = build_pipeline(&self.config, &batch);
        let entry_ids: Vec<String> = match pipe.query_async(&mut conn).await {
            Ok(ids) => ids,
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    if let Err(reconnect_err) = self.reconnect().await {
                        warn!(error = %reconnect_err, "Redis reconnect failed");
                    }
                }
                return Err(e.into());
            }
        };

        check_entry_ids(batch.len(), &entry_ids)?;

        debug!(
            stream = %self.config.stream_key,
            events = batch.len(),
            bytes = batch.size_bytes(),
            first_entry = ?entry_ids.first(),
            "Batch appended to stream"
        );
        Ok(())
    }

    async fn close(&self) -> StreamResult<()> {
        if self.conn.lock().await.take().is_some() {
            info!(stream = %self.config.stream_key, "Redis producer closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::EncodedEvent;

    fn packed(config: &StreamConfig, batch: &EventBatch) -> String {
        String::from_utf8_lossy(&build_pipeline(config, batch).get_packed_pipeline()).to_string()
    }

    fn batch_of(ids: &[i64]) -> EventBatch {
        let mut batch = EventBatch::new(usize::MAX);
        for id in ids {
            batch
                .try_append(EncodedEvent::new(*id, format!("dev:1:{id}"), b"{}".to_vec()))
                .unwrap();
        }
        batch
    }

    #[test]
    fn test_pipeline_is_transactional() {
        let config = StreamConfig::new("redis://localhost", "telemetry:events");
        let wire = packed(&config, &batch_of(&[1, 2]));

        assert!(wire.contains("MULTI"));
        assert!(wire.contains("EXEC"));
        assert_eq!(wire.matches("XADD").count(), 2);
        assert!(wire.contains("telemetry:events"));
        assert!(wire.contains("dev:1:2"));
        assert!(!wire.contains("MAXLEN"));
    }

    #[test]
    fn test_pipeline_carries_max_len() {
        let config =
            StreamConfig::new("redis://localhost", "telemetry:events").with_max_len(Some(50_000));
        let wire = packed(&config, &batch_of(&[1]));

        assert!(wire.contains("MAXLEN"));
        assert!(wire.contains("~"));
        assert!(wire.contains("50000"));
    }

    #[test]
    fn test_short_reply_fails_whole_batch() {
        let ids = vec!["1714566600000-0".to_string(), "1714566600000-1".to_string()];
        assert!(check_entry_ids(2, &ids).is_ok());
        assert!(matches!(
            check_entry_ids(3, &ids),
            Err(StreamError::Rejected(_))
        ));
        assert!(matches!(check_entry_ids(1, &[]), Err(StreamError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = StreamConfig::new("redis://localhost", "");
        let result = RedisStreamProducer::connect(config).await;
        assert!(matches!(result, Err(StreamError::Config(_))));
    }
}
