use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Channel name notifiables are asked to route for
pub const APN_CHANNEL: &str = "apn";

/// Opaque identifier issued by APNs for one app install on one device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceToken(String);

impl DeviceToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, safe to put in logs
    pub fn prefix(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for DeviceToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Answer of a notifiable when asked where a channel should deliver.
///
/// A notifiable may have no token, exactly one, or several. The channel
/// flattens every variant into a token sequence with [`Route::into_tokens`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Route {
    #[default]
    None,
    Single(DeviceToken),
    Many(Vec<DeviceToken>),
}

impl Route {
    /// Normalize into a sequence, preserving routing order
    pub fn into_tokens(self) -> Vec<DeviceToken> {
        match self {
            Route::None => Vec::new(),
            Route::Single(token) => vec![token],
            Route::Many(tokens) => tokens,
        }
    }
}

impl From<DeviceToken> for Route {
    fn from(token: DeviceToken) -> Self {
        Route::Single(token)
    }
}

impl From<Option<DeviceToken>> for Route {
    fn from(token: Option<DeviceToken>) -> Self {
        token.map_or(Route::None, Route::Single)
    }
}

impl From<Vec<DeviceToken>> for Route {
    fn from(tokens: Vec<DeviceToken>) -> Self {
        Route::Many(tokens)
    }
}

impl From<Vec<String>> for Route {
    fn from(tokens: Vec<String>) -> Self {
        Route::Many(tokens.into_iter().map(DeviceToken::from).collect())
    }
}

/// Channel-agnostic content of a single push notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Alert body text
    pub body: String,
    /// Alert title (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Badge count shown on the app icon (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    /// Sound file name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// Custom key-value data delivered alongside the alert
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl NotificationPayload {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            title: None,
            badge: None,
            sound: None,
            data: Map::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    /// Replace the custom data map
    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Insert a single custom data entry, replacing an existing key
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Identity of a notifiable or a notification, carried in failure events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type (e.g., "user", "order.shipped")
    pub kind: String,
    /// Entity identifier
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// An entity that can receive notifications on one or more channels
pub trait Notifiable: Send + Sync {
    /// Identity reported in failure events
    fn notifiable_ref(&self) -> EntityRef;

    /// Device tokens for the given channel name
    fn route_notification_for(&self, channel: &str) -> Route;
}

/// A notification that knows how to render itself for APNs
pub trait ApnNotification: Send + Sync {
    /// Identity reported in failure events
    fn notification_ref(&self) -> EntityRef;

    /// Render the payload for a notifiable, or `None` to skip delivery
    fn to_apn(&self, notifiable: &dyn Notifiable) -> Option<NotificationPayload>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_normalization() {
        assert!(Route::None.into_tokens().is_empty());

        let single = Route::from(DeviceToken::new("abc"));
        assert_eq!(single.into_tokens(), vec![DeviceToken::new("abc")]);

        let many = Route::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            many.into_tokens(),
            vec![DeviceToken::new("a"), DeviceToken::new("b")]
        );

        assert_eq!(Route::from(None::<DeviceToken>), Route::None);
    }

    #[test]
    fn test_token_prefix() {
        let token = DeviceToken::new("0123456789abcdef");
        assert_eq!(token.prefix(), "01234567");
        assert_eq!(DeviceToken::new("abc").prefix(), "abc");
    }

    #[test]
    fn test_payload_builder() {
        let payload = NotificationPayload::new("Hi")
            .title("Greeting")
            .badge(3)
            .with_data("order_id", 42)
            .with_data("order_id", 43);

        assert_eq!(payload.body, "Hi");
        assert_eq!(payload.title.as_deref(), Some("Greeting"));
        assert_eq!(payload.badge, Some(3));
        assert_eq!(payload.data.len(), 1);
        assert_eq!(payload.data["order_id"], json!(43));
    }

    #[test]
    fn test_payload_deserialize_defaults() {
        let payload: NotificationPayload = serde_json::from_value(json!({"body": "Hi"})).unwrap();
        assert_eq!(payload, NotificationPayload::new("Hi"));
    }
}
