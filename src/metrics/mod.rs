//! Prometheus metrics for the APN channel.
//!
//! - Connection metrics (opened, failed, close errors)
//! - Message metrics (delivered, rejected by response code, transport errors)
//! - Messages skipped by client-side payload validation
//! - Send latency
//! - Failure sink publishing

mod helpers;

pub use helpers::{encode_metrics, ChannelMetrics, FailureSinkMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Histogram, IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_apn";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Connection lifecycle events by outcome
    pub static ref CONNECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_total", METRIC_PREFIX),
        "APNs connection lifecycle events",
        &["event"]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Messages sent by outcome (delivered, rejected, error)
    pub static ref MESSAGES_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_sent_total", METRIC_PREFIX),
        "Total messages handed to the APNs transport",
        &["result"]
    ).unwrap();

    /// Tokens not handed to the transport, by the code reported for them
    pub static ref MESSAGES_SKIPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_skipped_total", METRIC_PREFIX),
        "Messages rejected client-side before reaching the APNs transport",
        &["code"]
    ).unwrap();

    /// Per-token delivery failures by APNs response code
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Per-token delivery failures by response code",
        &["code"]
    ).unwrap();

    /// Time spent waiting for a single gateway response
    pub static ref SEND_LATENCY: Histogram = register_histogram!(
        format!("{}_send_latency_seconds", METRIC_PREFIX),
        "APNs send latency in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    // ============================================================================
    // Failure Sink Metrics
    // ============================================================================

    /// Failure events published by sink backend
    pub static ref FAILURE_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_failure_events_total", METRIC_PREFIX),
        "Failure events published",
        &["sink", "result"]
    ).unwrap();
}
