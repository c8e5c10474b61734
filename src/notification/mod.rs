//! Notification content and the capabilities the APN channel consumes.
//!
//! The channel never sees concrete application types. It talks to:
//!
//! - [`Notifiable`]: resolves device tokens for a channel name
//! - [`ApnNotification`]: renders a [`NotificationPayload`] for a notifiable

mod types;

pub use types::{
    ApnNotification, DeviceToken, EntityRef, Notifiable, NotificationPayload, Route, APN_CHANNEL,
};
