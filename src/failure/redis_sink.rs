use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{FailureEvent, FailureSink};
use crate::metrics::FailureSinkMetrics;

/// Publishes failure events as JSON to a Redis Pub/Sub channel
#[derive(Clone)]
pub struct RedisFailureSink {
    conn: ConnectionManager,
    channel: String,
}

impl RedisFailureSink {
    /// Connect to Redis. The connection manager reconnects on its own afterwards.
    pub async fn connect(url: &str, channel: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            channel: channel.to_string(),
        })
    }
}

/// JSON message published for an event
fn encode(event: &FailureEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

#[async_trait]
impl FailureSink for RedisFailureSink {
    async fn publish(&self, event: FailureEvent) {
        let payload = match encode(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "Failed to serialize failure event");
                FailureSinkMetrics::record_dropped("redis");
                return;
            }
        };

        let mut conn = self.conn.clone();
        match conn.publish::<_, _, i64>(&self.channel, payload).await {
            Ok(receivers) => {
                tracing::debug!(
                    event_id = %event.id,
                    channel = %self.channel,
                    receivers,
                    "Failure event published to Redis"
                );
                FailureSinkMetrics::record_published("redis");
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %event.id,
                    channel = %self.channel,
                    error = %e,
                    "Failed to publish failure event to Redis"
                );
                FailureSinkMetrics::record_dropped("redis");
            }
        }
    }
}
