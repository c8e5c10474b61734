use std::fs::File;
use std::io::ErrorKind;

use a2::request::payload::Payload;
use a2::{
    Client, ClientConfig, DefaultNotificationBuilder, Endpoint, ErrorReason, NotificationBuilder,
    NotificationOptions,
};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    ApnEndpoint, ConnectionTarget, DeliveryResponse, PushConnection, PushTransport, ResponseCode,
    TransportError,
};
use crate::config::ApnConfig;
use crate::message::WireMessage;

/// APNs transport using certificate authentication over HTTP/2
#[derive(Debug, Clone, Default)]
pub struct ApnsTransport {
    passphrase: Option<String>,
    topic: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl ApnsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ApnConfig) -> Self {
        Self {
            passphrase: config.passphrase.clone(),
            topic: config.topic.clone(),
            request_timeout_secs: Some(config.request_timeout_secs),
        }
    }

    /// PKCS#12 passphrase
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// `apns-topic` header, usually the app bundle id
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

#[async_trait]
impl PushTransport for ApnsTransport {
    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<Box<dyn PushConnection>, TransportError> {
        let mut file = File::open(&target.certificate_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransportError::CertificateNotFound(target.certificate_path.clone()),
            _ => TransportError::Io(e),
        })?;

        let endpoint = match target.endpoint {
            ApnEndpoint::Sandbox => Endpoint::Sandbox,
            ApnEndpoint::Production => Endpoint::Production,
        };

        let mut client_config = ClientConfig::new(endpoint);
        if let Some(secs) = self.request_timeout_secs {
            client_config.request_timeout_secs = Some(secs);
        }

        let password = self.passphrase.as_deref().unwrap_or("");
        let client = Client::certificate(&mut file, password, client_config)
            .map_err(|e| TransportError::Certificate(e.to_string()))?;

        info!(
            endpoint = %target.endpoint,
            certificate = %target.certificate_path.display(),
            "APNs connection opened"
        );

        Ok(Box::new(ApnsConnection {
            client: Some(client),
            topic: self.topic.clone(),
        }))
    }
}

struct ApnsConnection {
    client: Option<Client>,
    topic: Option<String>,
}

#[async_trait]
impl PushConnection for ApnsConnection {
    fn encoded_len(&self, message: &WireMessage) -> Result<usize, TransportError> {
        let payload = to_payload(message, self.topic.as_deref())?;
        serde_json::to_string(&payload)
            .map(|json| json.len())
            .map_err(|e| TransportError::Send(format!("failed to encode payload: {e}")))
    }

    async fn send(&mut self, message: WireMessage) -> Result<DeliveryResponse, TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::Closed)?;
        let payload = to_payload(&message, self.topic.as_deref())?;

        let result = client.send(payload).await;
        let token = message.token.clone();

        match result {
            Ok(response) => Ok(DeliveryResponse {
                token,
                code: ResponseCode::Ok,
                status: Some(response.code),
                reason: None,
                apns_id: response.apns_id,
            }),
            Err(a2::Error::ResponseError(response)) => {
                let reason = response.error.as_ref().map(|body| &body.reason);
                let code = classify(reason, response.code);
                debug!(
                    token_prefix = %message.token.prefix(),
                    status = response.code,
                    code = %code,
                    "APNs rejected notification"
                );
                Ok(DeliveryResponse {
                    token,
                    code,
                    status: Some(response.code),
                    reason: reason.map(|r| format!("{r:?}")),
                    apns_id: response.apns_id,
                })
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.client.take() {
            Some(client) => {
                drop(client);
                debug!("APNs connection closed");
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }
}

/// Build the `a2` payload that is both measured and sent for a message
fn to_payload<'a>(
    message: &'a WireMessage,
    topic: Option<&'a str>,
) -> Result<Payload<'a>, TransportError> {
    let mut builder = DefaultNotificationBuilder::new().set_body(&message.alert);
    if let Some(title) = &message.title {
        builder = builder.set_title(title);
    }
    if let Some(badge) = message.badge {
        builder = builder.set_badge(badge);
    }
    if let Some(sound) = &message.sound {
        builder = builder.set_sound(sound);
    }

    let options = NotificationOptions {
        apns_topic: topic,
        ..Default::default()
    };

    let mut payload = builder.build(message.token.as_str(), options);
    for (key, value) in &message.custom {
        payload
            .add_custom_data(key, value)
            .map_err(|e| TransportError::Send(format!("invalid custom data '{key}': {e}")))?;
    }
    Ok(payload)
}

/// Map a gateway rejection onto the APNs status code table
fn classify(reason: Option<&ErrorReason>, status: u16) -> ResponseCode {
    match reason {
        Some(ErrorReason::BadDeviceToken)
        | Some(ErrorReason::Unregistered)
        | Some(ErrorReason::DeviceTokenNotForTopic) => ResponseCode::InvalidToken,
        Some(ErrorReason::MissingDeviceToken) => ResponseCode::MissingToken,
        Some(ErrorReason::MissingTopic) => ResponseCode::MissingTopic,
        Some(ErrorReason::BadTopic) | Some(ErrorReason::TopicDisallowed) => {
            ResponseCode::InvalidTopicSize
        }
        Some(ErrorReason::PayloadEmpty) => ResponseCode::MissingPayload,
        Some(ErrorReason::PayloadTooLarge) => ResponseCode::InvalidPayloadSize,
        Some(ErrorReason::Shutdown) => ResponseCode::Shutdown,
        Some(ErrorReason::InternalServerError) | Some(ErrorReason::ServiceUnavailable) => {
            ResponseCode::ProcessingError
        }
        Some(_) => ResponseCode::Unknown,
        None => match status {
            410 => ResponseCode::InvalidToken,
            413 => ResponseCode::InvalidPayloadSize,
            500 | 503 => ResponseCode::ProcessingError,
            _ => ResponseCode::Unknown,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::message::{self, MAX_PAYLOAD_BYTES};
    use crate::notification::{DeviceToken, NotificationPayload};

    fn closed_connection() -> ApnsConnection {
        ApnsConnection {
            client: None,
            topic: Some("com.example.app".to_string()),
        }
    }

    #[test]
    fn test_encoded_len_measures_sent_document() {
        let connection = closed_connection();
        let message = message::build(
            &DeviceToken::new("tok-A"),
            &NotificationPayload::new("Hi").badge(1).with_data("k", "v"),
        );

        let sent = serde_json::to_string(&to_payload(&message, Some("com.example.app")).unwrap()).unwrap();
        let measured = connection.encoded_len(&message).unwrap();
        assert_eq!(measured, sent.len());

        let document: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(document["aps"]["alert"], "Hi");
        assert_eq!(document["aps"]["badge"], 1);
        assert_eq!(document["k"], "v");
        assert!(measured >= message.encoded_len());
    }

    #[test]
    fn test_encoded_len_counts_keys_added_by_a2() {
        let connection = closed_connection();
        let token = DeviceToken::new("tok-A");

        // Body sized so the bare document sits exactly at the limit
        let empty = message::build(&token, &NotificationPayload::new("").badge(1));
        let body = "x".repeat(MAX_PAYLOAD_BYTES - empty.encoded_len());
        let message = message::build(&token, &NotificationPayload::new(body).badge(1));
        assert_eq!(message.encoded_len(), MAX_PAYLOAD_BYTES);

        let measured = connection.encoded_len(&message).unwrap();
        let sent = serde_json::to_string(&to_payload(&message, None).unwrap()).unwrap();
        assert_eq!(measured, sent.len());
        assert!(measured > MAX_PAYLOAD_BYTES);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let mut connection = closed_connection();
        let message = message::build(&DeviceToken::new("tok-A"), &NotificationPayload::new("Hi"));

        assert!(matches!(connection.send(message).await, Err(TransportError::Closed)));
        assert!(matches!(connection.close().await, Err(TransportError::Closed)));
    }

    #[test]
    fn test_classify_by_reason() {
        assert_eq!(
            classify(Some(&ErrorReason::BadDeviceToken), 400),
            ResponseCode::InvalidToken
        );
        assert_eq!(
            classify(Some(&ErrorReason::Unregistered), 410),
            ResponseCode::InvalidToken
        );
        assert_eq!(
            classify(Some(&ErrorReason::PayloadTooLarge), 413),
            ResponseCode::InvalidPayloadSize
        );
        assert_eq!(
            classify(Some(&ErrorReason::MissingTopic), 400),
            ResponseCode::MissingTopic
        );
        assert_eq!(
            classify(Some(&ErrorReason::ServiceUnavailable), 503),
            ResponseCode::ProcessingError
        );
        assert_eq!(
            classify(Some(&ErrorReason::Shutdown), 503),
            ResponseCode::Shutdown
        );
    }

    #[test]
    fn test_classify_by_status() {
        assert_eq!(classify(None, 410), ResponseCode::InvalidToken);
        assert_eq!(classify(None, 413), ResponseCode::InvalidPayloadSize);
        assert_eq!(classify(None, 500), ResponseCode::ProcessingError);
        assert_eq!(classify(None, 429), ResponseCode::Unknown);
    }

    #[tokio::test]
    async fn test_connect_missing_certificate() {
        let transport = ApnsTransport::new().with_topic("com.example.app");
        let target = ConnectionTarget {
            endpoint: ApnEndpoint::Sandbox,
            certificate_path: PathBuf::from("/nonexistent/apn-sandbox.p12"),
        };

        let result = transport.connect(&target).await;
        assert!(matches!(
            result,
            Err(TransportError::CertificateNotFound(path)) if path == target.certificate_path
        ));
    }

    #[tokio::test]
    async fn test_connect_invalid_certificate() {
        let path = std::env::temp_dir().join(format!("ara-apn-{}.p12", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"not a pkcs12 archive").unwrap();

        let transport = ApnsTransport::new().with_passphrase("secret");
        let target = ConnectionTarget {
            endpoint: ApnEndpoint::Production,
            certificate_path: path.clone(),
        };

        let result = transport.connect(&target).await;
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(TransportError::Certificate(_))));
    }
}
