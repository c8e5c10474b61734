use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, debug_span, error, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::config::ApnConfig;
use crate::error::ChannelError;
use crate::failure::{ChannelRef, FailureContext, FailureEvent, FailureSink};
use crate::message::{self, MAX_PAYLOAD_BYTES};
use crate::metrics::ChannelMetrics;
use crate::notification::{
    ApnNotification, DeviceToken, EntityRef, Notifiable, NotificationPayload, APN_CHANNEL,
};
use crate::telemetry::{self, attributes};
use crate::transport::{
    ApnsTransport, ConnectionTarget, PushConnection, PushTransport, ResponseCode, TransportError,
};

/// Outcome of one `send` call that did not hit a transport fault
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Tokens processed (sent or rejected before sending)
    pub attempted: usize,
    /// Tokens the gateway accepted
    pub delivered: usize,
    /// Tokens reported to the failure sink
    pub failed: usize,
}

/// Client-side payload size check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    pub enabled: bool,
    pub max_bytes: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

impl PayloadLimits {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_bytes: MAX_PAYLOAD_BYTES,
        }
    }
}

/// Apple Push Notification channel.
///
/// Every [`send`](ApnChannel::send) opens its own connection, delivers one
/// message per device token in routing order, reports rejected tokens to the
/// failure sink, and closes the connection before returning. The channel
/// keeps no state between calls, so it can be shared behind an `Arc`.
pub struct ApnChannel {
    id: Uuid,
    target: ConnectionTarget,
    transport: Arc<dyn PushTransport>,
    failures: Arc<dyn FailureSink>,
    limits: PayloadLimits,
}

impl ApnChannel {
    /// Create a channel for a resolved connection target
    pub fn new(
        target: ConnectionTarget,
        transport: Arc<dyn PushTransport>,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            transport,
            failures,
            limits: PayloadLimits::default(),
        }
    }

    /// Create a channel backed by [`ApnsTransport`] from configuration
    pub fn from_config(config: &ApnConfig, failures: Arc<dyn FailureSink>) -> Self {
        let limits = PayloadLimits {
            enabled: config.validate_payload_size,
            max_bytes: config.max_payload_bytes,
        };
        Self::new(
            config.resolve(),
            Arc::new(ApnsTransport::from_config(config)),
            failures,
        )
        .with_payload_limits(limits)
    }

    pub fn with_payload_limits(mut self, limits: PayloadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel_ref(&self) -> ChannelRef {
        ChannelRef {
            name: APN_CHANNEL.to_string(),
            instance_id: self.id,
        }
    }

    /// Send a notification to every device token of a notifiable.
    ///
    /// Tokens and payload are resolved before the connection is opened, so a
    /// notifiable without tokens (or a notification that renders nothing)
    /// causes no network I/O at all.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::ConnectionFailed`] if the connection cannot be opened
    /// - [`ChannelError::SendingFailed`] if the transport faults mid-batch;
    ///   remaining tokens are skipped, the connection is still closed
    /// - [`ChannelError::CloseFailed`] if only closing the connection failed
    #[tracing::instrument(
        name = "apn.send",
        skip_all,
        fields(
            channel_id = %self.id,
            notifiable = %notifiable.notifiable_ref(),
            notification = %notification.notification_ref(),
        )
    )]
    pub async fn send(
        &self,
        notifiable: &dyn Notifiable,
        notification: &dyn ApnNotification,
    ) -> Result<DispatchReport, ChannelError> {
        let tokens = unique_tokens(notifiable.route_notification_for(APN_CHANNEL).into_tokens());
        if tokens.is_empty() {
            debug!("Notifiable has no APNs tokens, skipping");
            return Ok(DispatchReport::default());
        }

        let Some(payload) = notification.to_apn(notifiable) else {
            debug!("Notification rendered no APNs payload, skipping");
            return Ok(DispatchReport::default());
        };

        telemetry::record(&Span::current(), attributes::endpoint(self.target.endpoint));
        let mut connection = self.open_connection().await?;
        let outcome = self
            .deliver(connection.as_mut(), &tokens, &payload, notifiable, notification)
            .await;
        let result = self.close_connection(connection, outcome).await;

        if let Ok(report) = &result {
            info!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed,
                "APNs dispatch complete"
            );
        }
        result
    }

    async fn open_connection(&self) -> Result<Box<dyn PushConnection>, ChannelError> {
        match self.transport.connect(&self.target).await {
            Ok(connection) => {
                ChannelMetrics::record_connection_opened();
                Ok(connection)
            }
            Err(e) => {
                ChannelMetrics::record_connection_failed();
                let err = ChannelError::ConnectionFailed(e);
                error!(
                    endpoint = %self.target.endpoint,
                    certificate = %self.target.certificate_path.display(),
                    code = err.code(),
                    error = %err,
                    "Failed to open APNs connection"
                );
                Err(err)
            }
        }
    }

    /// Close the connection; a fault from the delivery loop takes precedence
    async fn close_connection(
        &self,
        mut connection: Box<dyn PushConnection>,
        outcome: Result<DispatchReport, ChannelError>,
    ) -> Result<DispatchReport, ChannelError> {
        match connection.close().await {
            Ok(()) => {
                ChannelMetrics::record_connection_closed();
                outcome
            }
            Err(close_err) => {
                ChannelMetrics::record_close_error();
                match outcome {
                    Err(err) => {
                        warn!(
                            code = err.code(),
                            error = %close_err,
                            "Failed to close APNs connection after aborted dispatch"
                        );
                        Err(err)
                    }
                    Ok(_) => {
                        let err = ChannelError::CloseFailed(close_err);
                        error!(code = err.code(), error = %err, "Failed to close APNs connection");
                        Err(err)
                    }
                }
            }
        }
    }

    async fn deliver(
        &self,
        connection: &mut dyn PushConnection,
        tokens: &[DeviceToken],
        payload: &NotificationPayload,
        notifiable: &dyn Notifiable,
        notification: &dyn ApnNotification,
    ) -> Result<DispatchReport, ChannelError> {
        let mut report = DispatchReport::default();
        let reporter = FailureReporter {
            sink: self.failures.as_ref(),
            notifiable: notifiable.notifiable_ref(),
            notification: notification.notification_ref(),
            channel: self.channel_ref(),
        };

        for token in tokens {
            report.attempted += 1;
            let remaining = tokens.len() - report.attempted;
            let message = message::build(token, payload);

            if self.limits.enabled {
                let size = connection
                    .encoded_len(&message)
                    .map_err(|source| send_fault(token, source, remaining))?;
                if size > self.limits.max_bytes {
                    warn!(
                        token_prefix = %token.prefix(),
                        size,
                        max = self.limits.max_bytes,
                        "Payload too large, not sending"
                    );
                    ChannelMetrics::record_skipped(ResponseCode::InvalidPayloadSize);
                    let context = FailureContext::new(token.clone(), ResponseCode::InvalidPayloadSize)
                        .with_reason(format!("payload is {size} bytes, limit {}", self.limits.max_bytes));
                    reporter.report(context).await;
                    report.failed += 1;
                    continue;
                }
            }

            let span = debug_span!("apn.deliver");
            telemetry::record(&span, attributes::token_prefix(token));

            let started = Instant::now();
            let response = connection
                .send(message)
                .instrument(span.clone())
                .await
                .map_err(|source| send_fault(token, source, remaining))?;
            ChannelMetrics::observe_send_latency(started.elapsed());
            telemetry::record(&span, attributes::response_code(response.code));

            if response.is_success() {
                ChannelMetrics::record_delivered();
                report.delivered += 1;
            } else {
                ChannelMetrics::record_rejected(response.code);
                report.failed += 1;
                let mut context = FailureContext::new(token.clone(), response.code);
                context.reason = response.reason;
                reporter.report(context).await;
            }
        }

        Ok(report)
    }
}

/// Abort the dispatch for a transport fault on `token`
fn send_fault(token: &DeviceToken, source: TransportError, remaining: usize) -> ChannelError {
    ChannelMetrics::record_send_error();
    let err = ChannelError::SendingFailed {
        token: token.clone(),
        source,
    };
    error!(
        token_prefix = %token.prefix(),
        code = err.code(),
        error = %err,
        remaining,
        "APNs send failed, aborting dispatch"
    );
    err
}

/// Builds failure events for one dispatch
struct FailureReporter<'a> {
    sink: &'a dyn FailureSink,
    notifiable: EntityRef,
    notification: EntityRef,
    channel: ChannelRef,
}

impl FailureReporter<'_> {
    async fn report(&self, context: FailureContext) {
        debug!(
            token_prefix = %context.token.prefix(),
            code = %context.error,
            "Token rejected"
        );

        let event = FailureEvent::new(
            self.notifiable.clone(),
            self.notification.clone(),
            self.channel.clone(),
            context,
        );
        self.sink.publish(event).await;
    }
}

/// Drop repeated tokens, keeping the first occurrence's position
fn unique_tokens(tokens: Vec<DeviceToken>) -> Vec<DeviceToken> {
    let mut seen = HashSet::with_capacity(tokens.len());
    let before = tokens.len();
    let unique: Vec<DeviceToken> = tokens
        .into_iter()
        .filter(|token| seen.insert(token.clone()))
        .collect();

    if unique.len() < before {
        debug!(duplicates = before - unique.len(), "Dropped duplicate device tokens");
    }
    unique
}
