//! Wire message construction.
//!
//! [`build`] turns a token and a payload into the message handed to the
//! transport. Fields are copied verbatim; size limits are checked by the
//! channel against [`PushConnection::encoded_len`](crate::transport::PushConnection::encoded_len),
//! not here.

use serde_json::{Map, Value};

use crate::notification::{DeviceToken, NotificationPayload};

/// Root key reserved by APNs for the system dictionary
pub const APS_KEY: &str = "aps";

/// Maximum payload size APNs accepts for regular remote notifications
pub const MAX_PAYLOAD_BYTES: usize = 4096;

/// A message addressed to exactly one device token
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub token: DeviceToken,
    pub alert: String,
    pub title: Option<String>,
    pub badge: Option<u32>,
    pub sound: Option<String>,
    /// Custom root-level keys (never contains `aps`)
    pub custom: Map<String, Value>,
}

/// Build the wire message for one token
pub fn build(token: &DeviceToken, payload: &NotificationPayload) -> WireMessage {
    let mut custom = payload.data.clone();
    if custom.remove(APS_KEY).is_some() {
        tracing::warn!(
            token_prefix = %token.prefix(),
            "Dropping custom data key reserved by APNs"
        );
    }

    WireMessage {
        token: token.clone(),
        alert: payload.body.clone(),
        title: payload.title.clone(),
        badge: payload.badge,
        sound: payload.sound.clone(),
        custom,
    }
}

impl WireMessage {
    /// Render the message fields as an APNs JSON document.
    ///
    /// This is the minimal document for the message. A transport may encode
    /// additional `aps` keys, so it is not necessarily the exact bytes sent.
    pub fn to_json(&self) -> Value {
        let alert = match &self.title {
            Some(title) => serde_json::json!({ "title": title, "body": self.alert }),
            None => Value::String(self.alert.clone()),
        };

        let mut aps = Map::new();
        aps.insert("alert".to_string(), alert);
        if let Some(badge) = self.badge {
            aps.insert("badge".to_string(), Value::from(badge));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), Value::String(sound.clone()));
        }

        let mut root = self.custom.clone();
        root.insert(APS_KEY.to_string(), Value::Object(aps));
        Value::Object(root)
    }

    /// Size in bytes of [`to_json`](Self::to_json) once encoded
    pub fn encoded_len(&self) -> usize {
        self.to_json().to_string().len()
    }
}
