use thiserror::Error;

use crate::notification::DeviceToken;
use crate::transport::TransportError;

/// Faults that abort a dispatch.
///
/// A gateway rejecting a single token is not a fault; it is reported through
/// the failure sink and the dispatch continues.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to open APNs connection: {0}")]
    ConnectionFailed(#[source] TransportError),

    #[error("Failed to send notification to token {}: {source}", .token.prefix())]
    SendingFailed {
        token: DeviceToken,
        #[source]
        source: TransportError,
    },

    #[error("Failed to close APNs connection: {0}")]
    CloseFailed(#[source] TransportError),
}

impl ChannelError {
    /// Stable error code for logs and metrics
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::ConnectionFailed(_) => "CONNECTION_FAILED",
            ChannelError::SendingFailed { .. } => "SENDING_FAILED",
            ChannelError::CloseFailed(_) => "CLOSE_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_sending_failed_keeps_source() {
        let err = ChannelError::SendingFailed {
            token: DeviceToken::new("tok-A"),
            source: TransportError::Send("stream reset".to_string()),
        };

        assert_eq!(err.code(), "SENDING_FAILED");
        assert!(err.to_string().contains("tok-A"));
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("Send failed: stream reset".to_string())
        );
    }

    #[test]
    fn test_connection_failed_message() {
        let err = ChannelError::ConnectionFailed(TransportError::Closed);
        assert_eq!(err.code(), "CONNECTION_FAILED");
        assert_eq!(
            err.to_string(),
            "Failed to open APNs connection: Connection already closed"
        );
    }
}
