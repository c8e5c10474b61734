use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{FailureEvent, FailureSink};
use crate::metrics::FailureSinkMetrics;

/// Fans failure events out to in-process subscribers.
///
/// Events published while nobody is subscribed are dropped. Slow subscribers
/// that fall more than `capacity` events behind observe a lag error.
#[derive(Debug, Clone)]
pub struct BroadcastFailureSink {
    sender: broadcast::Sender<FailureEvent>,
}

impl BroadcastFailureSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FailureEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl FailureSink for BroadcastFailureSink {
    async fn publish(&self, event: FailureEvent) {
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(receivers, "Failure event broadcast");
                FailureSinkMetrics::record_published("broadcast");
            }
            Err(_) => {
                tracing::debug!("No failure subscribers, event dropped");
                FailureSinkMetrics::record_dropped("broadcast");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::failure::{ChannelRef, FailureContext};
    use crate::notification::{DeviceToken, EntityRef};
    use crate::transport::ResponseCode;

    fn event(token: &str) -> FailureEvent {
        FailureEvent::new(
            EntityRef::new("user", "1"),
            EntityRef::new("welcome", "n-1"),
            ChannelRef {
                name: "apn".to_string(),
                instance_id: Uuid::new_v4(),
            },
            FailureContext {
                token: DeviceToken::new(token),
                error: ResponseCode::InvalidToken,
                reason: None,
            },
        )
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let sink = BroadcastFailureSink::new(8);
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();

        sink.publish(event("tok-A")).await;

        assert_eq!(first.recv().await.unwrap().token().as_str(), "tok-A");
        assert_eq!(second.recv().await.unwrap().token().as_str(), "tok-A");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let sink = BroadcastFailureSink::new(8);
        sink.publish(event("tok-A")).await;

        // Late subscribers do not see earlier events
        let mut late = sink.subscribe();
        assert!(late.try_recv().is_err());
    }
}
