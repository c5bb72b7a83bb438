//! Accounting store connection for `MySQL` / `MariaDB` and `SQLite` backends.

use std::str::FromStr;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::config::{redact_url, DatabaseConfig, StoreTarget};
use crate::{AppError, Result};

use super::schema;

/// A single-connection pool on one of the supported backends.
#[derive(Debug, Clone)]
pub enum Database {
    /// `SQLite` store.
    Sqlite(SqlitePool),
    /// `MySQL` or `MariaDB` store.
    MySql(MySqlPool),
}

impl Database {
    /// Short backend name for log fields.
    #[must_use]
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::MySql(_) => "mysql",
        }
    }

    /// The underlying `SQLite` pool, if this is a `SQLite` store.
    #[must_use]
    pub fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            Self::Sqlite(pool) => Some(pool),
            Self::MySql(_) => None,
        }
    }

    /// The underlying `MySQL` pool, if this is a `MySQL` store.
    #[must_use]
    pub fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            Self::MySql(pool) => Some(pool),
            Self::Sqlite(_) => None,
        }
    }

    /// Close the pool, waiting for the connection to be released.
    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
        }
    }
}

/// Connect to the configured accounting store.
///
/// One run uses one connection, so the pool is capped at a single
/// connection. `connect_timeout` bounds the initial connect and, for
/// `SQLite`, how long a statement waits on a locked database.
///
/// # Errors
///
/// Returns `AppError::Config` if the target is incomplete or the URL is
/// malformed, and `AppError::StoreUnavailable` if the connection fails.
pub async fn connect(config: &DatabaseConfig, connect_timeout: Duration) -> Result<Database> {
    match config.target()? {
        StoreTarget::SqliteUrl(url) => {
            let options = SqliteConnectOptions::from_str(&url)
                .map_err(|err| {
                    AppError::Config(format!("invalid sqlite url {}: {err}", redact_url(&url)))
                })?
                .busy_timeout(connect_timeout);
            debug!(url = %redact_url(&url), "connecting to sqlite store");
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(connect_timeout)
                .connect_with(options)
                .await
                .map_err(|err| AppError::StoreUnavailable(format!("sqlite connect: {err}")))?;
            Ok(Database::Sqlite(pool))
        }
        StoreTarget::MySqlUrl(url) => {
            let options = MySqlConnectOptions::from_str(&url).map_err(|err| {
                AppError::Config(format!("invalid mysql url {}: {err}", redact_url(&url)))
            })?;
            debug!(url = %redact_url(&url), "connecting to mysql store");
            connect_mysql(options, connect_timeout).await
        }
        StoreTarget::MySqlParts {
            host,
            port,
            user,
            database,
        } => {
            let password = config.password.as_deref().ok_or_else(|| {
                AppError::Config("database password has not been loaded".into())
            })?;
            let options = MySqlConnectOptions::new()
                .host(&host)
                .port(port)
                .username(&user)
                .password(password)
                .database(&database);
            debug!(%host, port, %user, %database, "connecting to mysql store");
            connect_mysql(options, connect_timeout).await
        }
    }
}

async fn connect_mysql(options: MySqlConnectOptions, connect_timeout: Duration) -> Result<Database> {
    let pool = MySqlPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(connect_timeout)
        .connect_with(options)
        .await
        .map_err(|err| AppError::StoreUnavailable(format!("mysql connect: {err}")))?;
    Ok(Database::MySql(pool))
}

/// Open an in-memory `SQLite` store with the `radacct` table created.
///
/// The single connection never expires, so the data lives as long as
/// the returned pool.
///
/// # Errors
///
/// Returns `AppError::StoreUnavailable` if the connection or schema
/// bootstrap fails.
pub async fn connect_memory() -> Result<Database> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    schema::bootstrap_schema(&pool).await?;
    Ok(Database::Sqlite(pool))
}
