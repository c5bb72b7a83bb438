//! Domain model module declarations.

pub mod repair;
pub mod session;
