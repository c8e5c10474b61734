//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_TOTAL, DELIVERY_FAILURES_TOTAL, FAILURE_EVENTS_TOTAL, MESSAGES_SENT_TOTAL,
    MESSAGES_SKIPPED_TOTAL, SEND_LATENCY,
};
use crate::transport::ResponseCode;

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording channel metrics
pub struct ChannelMetrics;

impl ChannelMetrics {
    pub fn record_connection_opened() {
        CONNECTIONS_TOTAL.with_label_values(&["opened"]).inc();
    }

    pub fn record_connection_failed() {
        CONNECTIONS_TOTAL.with_label_values(&["failed"]).inc();
    }

    pub fn record_connection_closed() {
        CONNECTIONS_TOTAL.with_label_values(&["closed"]).inc();
    }

    pub fn record_close_error() {
        CONNECTIONS_TOTAL.with_label_values(&["close_error"]).inc();
    }

    pub fn record_delivered() {
        MESSAGES_SENT_TOTAL.with_label_values(&["delivered"]).inc();
    }

    /// Record a token the gateway rejected
    pub fn record_rejected(code: ResponseCode) {
        MESSAGES_SENT_TOTAL.with_label_values(&["rejected"]).inc();
        DELIVERY_FAILURES_TOTAL
            .with_label_values(&[code.as_str()])
            .inc();
    }

    /// Record a token that was never handed to the transport
    pub fn record_skipped(code: ResponseCode) {
        MESSAGES_SKIPPED_TOTAL
            .with_label_values(&[code.as_str()])
            .inc();
        DELIVERY_FAILURES_TOTAL
            .with_label_values(&[code.as_str()])
            .inc();
    }

    pub fn record_send_error() {
        MESSAGES_SENT_TOTAL.with_label_values(&["error"]).inc();
    }

    pub fn observe_send_latency(elapsed: Duration) {
        SEND_LATENCY.observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for failure sink metrics
pub struct FailureSinkMetrics;

impl FailureSinkMetrics {
    pub fn record_published(sink: &str) {
        FAILURE_EVENTS_TOTAL.with_label_values(&[sink, "ok"]).inc();
    }

    pub fn record_dropped(sink: &str) {
        FAILURE_EVENTS_TOTAL.with_label_values(&[sink, "dropped"]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_metrics() {
        ChannelMetrics::record_connection_opened();
        ChannelMetrics::record_connection_closed();
        ChannelMetrics::record_delivered();
        ChannelMetrics::record_rejected(ResponseCode::InvalidToken);
        ChannelMetrics::observe_send_latency(Duration::from_millis(12));
        // Just verify no panics
    }

    #[test]
    fn test_record_skipped() {
        let skipped = MESSAGES_SKIPPED_TOTAL
            .with_label_values(&["invalid_payload_size"])
            .get();

        ChannelMetrics::record_skipped(ResponseCode::InvalidPayloadSize);

        assert!(
            MESSAGES_SKIPPED_TOTAL
                .with_label_values(&["invalid_payload_size"])
                .get()
                > skipped
        );
    }

    #[test]
    fn test_encode_metrics() {
        ChannelMetrics::record_rejected(ResponseCode::ProcessingError);
        FailureSinkMetrics::record_published("log");

        let output = encode_metrics().unwrap();
        assert!(output.contains("ara_apn_delivery_failures_total"));
        assert!(output.contains("processing_error"));
        assert!(output.contains("ara_apn_failure_events_total"));
    }
}
