//! Domain model definitions.

pub mod issue;
pub mod queue;
pub mod subscriber;
