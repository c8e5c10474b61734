use async_trait::async_trait;

use super::{FailureEvent, FailureSink};
use crate::metrics::FailureSinkMetrics;

/// Writes each failure as a structured warning
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFailureSink;

#[async_trait]
impl FailureSink for LogFailureSink {
    async fn publish(&self, event: FailureEvent) {
        tracing::warn!(
            event_id = %event.id,
            notifiable = %event.notifiable,
            notification = %event.notification,
            channel = %event.channel.name,
            token_prefix = %event.token().prefix(),
            error = event.error().code(),
            reason = ?event.context.reason,
            "Notification failed"
        );
        FailureSinkMetrics::record_published("log");
    }
}
