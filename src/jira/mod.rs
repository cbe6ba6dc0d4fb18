//! Inbound Jira webhook pipeline: authentication, payload mapping, and
//! issue sync orchestration.

pub mod payload;
pub mod signature;
pub mod status;
pub mod webhook;
