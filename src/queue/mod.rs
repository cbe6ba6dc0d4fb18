//! Persistent notification queues with retry and dead-letter handling.

pub mod manager;

pub use manager::{backoff_delay, QueueManager, BACKOFF_MINUTES, MAX_RETRIES};
