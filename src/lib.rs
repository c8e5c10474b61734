//! Apple Push Notification channel.
//!
//! Sends one APNs message per device token of a notifiable, reports tokens
//! the gateway rejects through a [`FailureSink`](failure::FailureSink), and
//! propagates only transport faults as errors.
//!
//! ```rust,ignore
//! let settings = Settings::new()?;
//! let _guard = telemetry::init_telemetry(&settings.logging, &settings.otel)?;
//! let failures = failure::create_failure_sink(&settings.failures).await;
//! let channel = ApnChannel::from_config(&settings.apn, failures);
//!
//! let report = channel.send(&user, &order_shipped).await?;
//! ```

// Infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain
pub mod channel;
pub mod failure;
pub mod message;
pub mod notification;
pub mod transport;

pub use channel::{ApnChannel, DispatchReport, PayloadLimits};
pub use config::{ApnConfig, Settings};
pub use error::ChannelError;
pub use failure::{FailureEvent, FailureSink};
pub use message::WireMessage;
pub use notification::{ApnNotification, DeviceToken, EntityRef, Notifiable, NotificationPayload, Route};
pub use transport::{DeliveryResponse, PushConnection, PushTransport, ResponseCode, TransportError};
