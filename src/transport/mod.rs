//! Transport abstraction for the push gateway.
//!
//! A [`PushTransport`] is a connection factory. Each dispatch asks it for a
//! fresh [`PushConnection`], owns that connection exclusively, and closes it
//! before returning. The production transport is [`ApnsTransport`].

mod apns;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::WireMessage;
use crate::notification::DeviceToken;

pub use apns::ApnsTransport;

/// APNs gateway environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApnEndpoint {
    Sandbox,
    Production,
}

impl ApnEndpoint {
    pub fn uri(&self) -> &'static str {
        match self {
            ApnEndpoint::Sandbox => "https://api.sandbox.push.apple.com",
            ApnEndpoint::Production => "https://api.push.apple.com",
        }
    }
}

impl fmt::Display for ApnEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Resolved endpoint and certificate for opening a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub endpoint: ApnEndpoint,
    pub certificate_path: PathBuf,
}

/// Transport-level faults (never used for non-success delivery responses)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Certificate file not found: {}", .0.display())]
    CertificateNotFound(PathBuf),

    #[error("Invalid certificate: {0}")]
    Certificate(String),

    #[error("Failed to connect to {endpoint}: {message}")]
    Connect {
        endpoint: ApnEndpoint,
        message: String,
    },

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Connection already closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// APNs status codes reported per token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum ResponseCode {
    Ok,
    ProcessingError,
    MissingToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Shutdown,
    Unknown,
}

impl ResponseCode {
    pub fn code(self) -> u8 {
        match self {
            ResponseCode::Ok => 0,
            ResponseCode::ProcessingError => 1,
            ResponseCode::MissingToken => 2,
            ResponseCode::MissingTopic => 3,
            ResponseCode::MissingPayload => 4,
            ResponseCode::InvalidTokenSize => 5,
            ResponseCode::InvalidTopicSize => 6,
            ResponseCode::InvalidPayloadSize => 7,
            ResponseCode::InvalidToken => 8,
            ResponseCode::Shutdown => 10,
            ResponseCode::Unknown => 255,
        }
    }

    pub fn is_success(self) -> bool {
        self == ResponseCode::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseCode::Ok => "ok",
            ResponseCode::ProcessingError => "processing_error",
            ResponseCode::MissingToken => "missing_token",
            ResponseCode::MissingTopic => "missing_topic",
            ResponseCode::MissingPayload => "missing_payload",
            ResponseCode::InvalidTokenSize => "invalid_token_size",
            ResponseCode::InvalidTopicSize => "invalid_topic_size",
            ResponseCode::InvalidPayloadSize => "invalid_payload_size",
            ResponseCode::InvalidToken => "invalid_token",
            ResponseCode::Shutdown => "shutdown",
            ResponseCode::Unknown => "unknown",
        }
    }
}

impl From<u8> for ResponseCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ResponseCode::Ok,
            1 => ResponseCode::ProcessingError,
            2 => ResponseCode::MissingToken,
            3 => ResponseCode::MissingTopic,
            4 => ResponseCode::MissingPayload,
            5 => ResponseCode::InvalidTokenSize,
            6 => ResponseCode::InvalidTopicSize,
            7 => ResponseCode::InvalidPayloadSize,
            8 => ResponseCode::InvalidToken,
            10 => ResponseCode::Shutdown,
            _ => ResponseCode::Unknown,
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.as_str())
    }
}

/// Gateway answer for one sent message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub token: DeviceToken,
    pub code: ResponseCode,
    /// HTTP status returned by the gateway, if any
    pub status: Option<u16>,
    /// Gateway-provided rejection reason, if any
    pub reason: Option<String>,
    /// Identifier assigned by APNs, if any
    pub apns_id: Option<String>,
}

impl DeliveryResponse {
    pub fn ok(token: DeviceToken) -> Self {
        Self::with_code(token, ResponseCode::Ok)
    }

    pub fn with_code(token: DeviceToken, code: ResponseCode) -> Self {
        Self {
            token,
            code,
            status: None,
            reason: None,
            apns_id: None,
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

/// Factory for gateway connections
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a connection (TLS handshake, certificate loading)
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn PushConnection>, TransportError>;
}

/// An open gateway session owned by a single dispatch
#[async_trait]
pub trait PushConnection: Send {
    /// Size in bytes of the document `send` would put on the wire.
    ///
    /// Defaults to the length of [`WireMessage::to_json`]. Transports whose
    /// encoder adds keys of its own must measure their own encoding.
    fn encoded_len(&self, message: &WireMessage) -> Result<usize, TransportError> {
        Ok(message.encoded_len())
    }

    /// Send one message and wait for its response
    async fn send(&mut self, message: WireMessage) -> Result<DeliveryResponse, TransportError>;

    /// Release the session. Sending after close fails with [`TransportError::Closed`].
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uri() {
        assert_eq!(ApnEndpoint::Sandbox.uri(), "https://api.sandbox.push.apple.com");
        assert_eq!(ApnEndpoint::Production.uri(), "https://api.push.apple.com");
    }

    #[test]
    fn test_response_code_table() {
        for code in [0u8, 1, 2, 3, 4, 5, 6, 7, 8, 10, 255] {
            assert_eq!(ResponseCode::from(code).code(), code);
        }
        assert_eq!(ResponseCode::from(9), ResponseCode::Unknown);
        assert!(ResponseCode::Ok.is_success());
        assert!(!ResponseCode::ProcessingError.is_success());
    }

    #[test]
    fn test_response_code_serializes_as_number() {
        let json = serde_json::to_string(&ResponseCode::InvalidToken).unwrap();
        assert_eq!(json, "8");
        let code: ResponseCode = serde_json::from_str("1").unwrap();
        assert_eq!(code, ResponseCode::ProcessingError);
    }

    #[test]
    fn test_delivery_response() {
        let ok = DeliveryResponse::ok(DeviceToken::new("tok"));
        assert!(ok.is_success());

        let rejected = DeliveryResponse::with_code(DeviceToken::new("tok"), ResponseCode::InvalidToken)
            .reason("BadDeviceToken");
        assert!(!rejected.is_success());
        assert_eq!(rejected.reason.as_deref(), Some("BadDeviceToken"));
    }
}
