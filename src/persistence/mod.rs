//! Persistence layer modules.

pub mod db;
pub mod issue_repo;
pub mod schema;
pub mod subscriber_repo;
pub mod token_repo;
