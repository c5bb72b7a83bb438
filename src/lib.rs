#![forbid(unsafe_code)]

//! Repairs hung RADIUS accounting sessions: `radacct` rows that never
//! received a stop record and have not been updated for longer than a
//! threshold.

pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod repair;

pub use config::JanitorConfig;
pub use errors::{AppError, Result};
