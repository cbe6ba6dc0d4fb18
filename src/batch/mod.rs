//! Batch delivery driver and its periodic scheduler.

pub mod processor;
pub mod scheduler;
