//! Outbound transaction notifications.

pub mod forwarder;
pub mod payload;

pub use forwarder::CallbackForwarder;
pub use payload::{DeliveryOutcome, NotificationPayload, NotificationRecord};
