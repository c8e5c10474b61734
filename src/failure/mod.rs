//! Per-token delivery failure reporting.
//!
//! The channel produces a [`FailureEvent`] for every token the gateway
//! rejects and hands it to the [`FailureSink`] injected at construction.
//! What happens next is up to the sink:
//!
//! - `LogFailureSink`: writes a structured warning (default)
//! - `BroadcastFailureSink`: fans out to in-process subscribers
//! - `RedisFailureSink`: publishes JSON to a Redis Pub/Sub channel
//!
//! Use `create_failure_sink()` to build the sink named in configuration.

mod broadcast_sink;
mod log_sink;
mod redis_sink;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FailureSinkConfig;
use crate::notification::{DeviceToken, EntityRef};
use crate::transport::ResponseCode;

pub use broadcast_sink::BroadcastFailureSink;
pub use log_sink::LogFailureSink;
pub use redis_sink::RedisFailureSink;

/// Identity of the channel instance that produced an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Channel name ("apn")
    pub name: String,
    /// Instance id of the channel
    pub instance_id: Uuid,
}

/// Details of a rejected token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    pub token: DeviceToken,
    /// APNs response code
    pub error: ResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FailureContext {
    pub fn new(token: DeviceToken, error: ResponseCode) -> Self {
        Self {
            token,
            error,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A single per-token delivery failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub notifiable: EntityRef,
    pub notification: EntityRef,
    pub channel: ChannelRef,
    pub context: FailureContext,
}

impl FailureEvent {
    pub fn new(
        notifiable: EntityRef,
        notification: EntityRef,
        channel: ChannelRef,
        context: FailureContext,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            notifiable,
            notification,
            channel,
            context,
        }
    }

    pub fn token(&self) -> &DeviceToken {
        &self.context.token
    }

    pub fn error(&self) -> ResponseCode {
        self.context.error
    }
}

/// Receiver of failure events.
///
/// Publishing never fails from the channel's point of view: sinks deal with
/// their own delivery problems.
#[async_trait]
pub trait FailureSink: Send + Sync {
    async fn publish(&self, event: FailureEvent);
}

/// Create a failure sink based on configuration.
///
/// - `"redis"`: a `RedisFailureSink`, or a `LogFailureSink` if Redis is unreachable
/// - `"broadcast"`: a `BroadcastFailureSink` with the configured capacity
/// - anything else: a `LogFailureSink`
pub async fn create_failure_sink(config: &FailureSinkConfig) -> Arc<dyn FailureSink> {
    match config.backend.as_str() {
        "redis" => match RedisFailureSink::connect(&config.redis_url, &config.redis_channel).await {
            Ok(sink) => {
                tracing::info!(
                    backend = "redis",
                    channel = %config.redis_channel,
                    "Creating Redis failure sink"
                );
                Arc::new(sink)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Redis failure sink requested but Redis is unreachable, falling back to log"
                );
                Arc::new(LogFailureSink)
            }
        },
        "broadcast" => {
            tracing::info!(
                backend = "broadcast",
                capacity = config.broadcast_capacity,
                "Creating broadcast failure sink"
            );
            Arc::new(BroadcastFailureSink::new(config.broadcast_capacity))
        }
        _ => {
            tracing::info!(backend = "log", "Creating log failure sink");
            Arc::new(LogFailureSink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::FAILURE_EVENTS_TOTAL;
    use serde_json::json;

    fn sample_event() -> FailureEvent {
        FailureEvent::new(
            EntityRef::new("user", "42"),
            EntityRef::new("order.shipped", "n-1"),
            ChannelRef {
                name: "apn".to_string(),
                instance_id: Uuid::nil(),
            },
            FailureContext {
                token: DeviceToken::new("tok-B"),
                error: ResponseCode::ProcessingError,
                reason: None,
            },
        )
    }

    #[test]
    fn test_context_json_keys() {
        let event = sample_event();
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["context"], json!({"token": "tok-B", "error": 1}));
        assert_eq!(value["notifiable"], json!({"kind": "user", "id": "42"}));
        assert_eq!(value["channel"]["name"], json!("apn"));
    }

    #[test]
    fn test_context_reason() {
        let context = FailureContext::new(DeviceToken::new("tok"), ResponseCode::InvalidToken)
            .with_reason("Unregistered");

        assert_eq!(context.error, ResponseCode::InvalidToken);
        assert_eq!(context.reason.as_deref(), Some("Unregistered"));
        assert_eq!(
            serde_json::to_value(&context).unwrap(),
            json!({"token": "tok", "error": 8, "reason": "Unregistered"})
        );
    }

    fn published(sink: &str, result: &str) -> u64 {
        FAILURE_EVENTS_TOTAL.with_label_values(&[sink, result]).get()
    }

    #[tokio::test]
    async fn test_create_failure_sink_fallback() {
        let config = FailureSinkConfig {
            backend: "redis".to_string(),
            redis_url: "not-a-redis-url".to_string(),
            ..Default::default()
        };

        // Falls back to the log sink instead of failing
        let sink = create_failure_sink(&config).await;
        let before = published("log", "ok");
        sink.publish(sample_event()).await;
        assert!(published("log", "ok") > before);
    }

    #[tokio::test]
    async fn test_create_broadcast_sink() {
        let config = FailureSinkConfig {
            backend: "broadcast".to_string(),
            ..Default::default()
        };

        // Nobody subscribed to a freshly created broadcast sink
        let sink = create_failure_sink(&config).await;
        let before = published("broadcast", "dropped");
        sink.publish(sample_event()).await;
        assert!(published("broadcast", "dropped") > before);
    }

    #[tokio::test]
    async fn test_create_log_sink_by_default() {
        let sink = create_failure_sink(&FailureSinkConfig::default()).await;
        let before = published("log", "ok");
        sink.publish(sample_event()).await;
        assert!(published("log", "ok") > before);
    }
}
