//! HTTP surface: inbound webhook, subscription management, health.

pub mod routes;
