//! Outbound Help Scout integration: OAuth token lifecycle, Mailbox API
//! client, and notification delivery.

pub mod api;
pub mod notifier;
pub mod token;
