//! Notification channels.
//!
//! [`ApnChannel`] is the dispatch engine: it owns the connection lifecycle
//! for a single `send` call and turns per-token rejections into failure
//! events instead of errors.

mod apn;

pub use apn::{ApnChannel, DispatchReport, PayloadLimits};
