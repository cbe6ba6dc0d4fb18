#![forbid(unsafe_code)]

//! `issue-relay` — syncs Jira issue webhooks into a local issue store
//! and drives reliable, queued notification delivery to affected users
//! through the Help Scout Mailbox API.

pub mod api;
pub mod batch;
pub mod clock;
pub mod config;
pub mod errors;
pub mod helpscout;
pub mod jira;
pub mod models;
pub mod persistence;
pub mod queue;
pub mod state;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
