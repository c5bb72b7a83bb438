//! Persistence layer modules.

pub mod db;
pub mod schema;
pub mod session_repo;

/// Re-export the store handle for convenience.
pub use db::Database;
