//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Process exit code for an unexpected failure.
pub const EXIT_UNEXPECTED: u8 = 1;
/// Process exit code for invalid or missing configuration.
pub const EXIT_CONFIG: u8 = 2;
/// Process exit code when the store cannot be reached or queried.
pub const EXIT_STORE_UNAVAILABLE: u8 = 3;
/// Process exit code when the repair transaction was rolled back.
pub const EXIT_STORE_WRITE: u8 = 4;

/// Details of a repair batch that was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// `radacctid` of the row whose update was rejected or timed out, or
    /// `None` when the commit itself failed.
    pub failed_id: Option<i64>,
    /// Rows whose update was issued before the rollback, in order.
    pub attempted: Vec<i64>,
    /// Store-reported reason.
    pub reason: String,
}

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The store could not be reached, or the detection query failed.
    StoreUnavailable(String),
    /// An update in the repair transaction failed; the batch was rolled back.
    StoreWrite(WriteFailure),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Exit status reported by the binary for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            Self::StoreUnavailable(_) => EXIT_STORE_UNAVAILABLE,
            Self::StoreWrite(_) => EXIT_STORE_WRITE,
            Self::Io(_) => EXIT_UNEXPECTED,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::StoreUnavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::StoreWrite(failure) => match failure.failed_id {
                Some(id) => write!(
                    f,
                    "store write: radacctid {id} rejected after {} attempted update(s), batch rolled back: {}",
                    failure.attempted.len(),
                    failure.reason
                ),
                None => write!(
                    f,
                    "store write: commit of {} update(s) failed: {}",
                    failure.attempted.len(),
                    failure.reason
                ),
            },
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
