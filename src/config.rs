//! Run configuration: TOML file, environment overlay, validation, and
//! credential loading.
//!
//! Layers are applied in order file → environment → command line, with
//! [`JanitorConfig::validate`] called once all of them are in place.

use std::env;
use std::fmt;
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name used for the store password.
pub const KEYRING_SERVICE: &str = "radacct-janitor";

/// Verbosity of query and parameter tracing.
///
/// Passed explicitly to the detector and repairer instead of living in a
/// process-wide switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogVerbosity {
    /// Per-record and summary lines only.
    #[default]
    Normal,
    /// Also trace SQL statements and bound parameters.
    Debug,
}

impl LogVerbosity {
    /// Map the boolean `debug` setting to a verbosity.
    #[must_use]
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            Self::Debug
        } else {
            Self::Normal
        }
    }

    /// Whether query and parameter tracing is enabled.
    #[must_use]
    pub fn is_debug(self) -> bool {
        self == Self::Debug
    }

    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    #[must_use]
    pub fn default_filter(self) -> &'static str {
        match self {
            Self::Normal => "info",
            Self::Debug => "debug",
        }
    }
}

/// Where the accounting store lives.
///
/// Either a full `url` (`mysql://…`, `mariadb://…`, `sqlite:…`) or the
/// individual `MySQL` connection parts. The password is never read from the
/// TOML file; see [`JanitorConfig::load_credentials`].
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual parts.
    #[serde(default)]
    pub url: Option<String>,
    /// `MySQL` host name.
    #[serde(default)]
    pub host: Option<String>,
    /// `MySQL` port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// `MySQL` user name.
    #[serde(default)]
    pub user: Option<String>,
    /// Database (schema) holding `radacct`.
    #[serde(default)]
    pub name: Option<String>,
    /// Password (populated at runtime).
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: default_port(),
            user: None,
            name: None,
            password: None,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_deref().map(redact_url))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A validated connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// `SQLite` URL such as `sqlite:///var/lib/radius/radacct.db`.
    SqliteUrl(String),
    /// `MySQL` / `MariaDB` URL.
    MySqlUrl(String),
    /// `MySQL` connection assembled from parts.
    MySqlParts {
        /// Host name.
        host: String,
        /// TCP port.
        port: u16,
        /// User name.
        user: String,
        /// Database name.
        database: String,
    },
}

impl DatabaseConfig {
    /// Whether the connection is assembled from parts and therefore
    /// needs a separately loaded password.
    #[must_use]
    pub fn needs_password(&self) -> bool {
        self.url.is_none()
    }

    /// Resolve the configured settings into a connection target.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither a supported URL nor the
    /// complete set of host, user, and database name is present.
    pub fn target(&self) -> Result<StoreTarget> {
        if let Some(url) = self.url.as_deref() {
            let url = url.trim();
            if url.starts_with("sqlite:") {
                return Ok(StoreTarget::SqliteUrl(url.to_owned()));
            }
            if url.starts_with("mysql://") || url.starts_with("mariadb://") {
                return Ok(StoreTarget::MySqlUrl(url.to_owned()));
            }
            return Err(AppError::Config(format!(
                "unsupported database url scheme in {}; expected mysql://, mariadb:// or sqlite:",
                redact_url(url)
            )));
        }

        let host = non_empty(self.host.as_deref(), "DB_HOST / database.host")?;
        let user = non_empty(self.user.as_deref(), "DB_USER / database.user")?;
        let database = non_empty(self.name.as_deref(), "DB_DATABASE / database.name")?;
        Ok(StoreTarget::MySqlParts {
            host: host.to_owned(),
            port: self.port,
            user: user.to_owned(),
            database: database.to_owned(),
        })
    }
}

fn non_empty<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Config(format!("{what} is required"))),
    }
}

/// Strip the userinfo section from a connection URL for logging.
#[must_use]
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://<redacted>{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_owned(),
    }
}

fn default_port() -> u16 {
    3306
}

fn default_threshold_minutes() -> i64 {
    60
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_query_timeout_seconds() -> u64 {
    30
}

/// Top-level configuration for one janitor run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct JanitorConfig {
    /// Accounting store connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Age in minutes after which an open session counts as hung.
    #[serde(default = "default_threshold_minutes")]
    pub threshold_minutes: i64,
    /// Report intended changes without writing them.
    #[serde(default)]
    pub dry_run: bool,
    /// Trace SQL statements and bound parameters.
    #[serde(default)]
    pub debug: bool,
    /// Upper bound on acquiring the store connection.
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Upper bound on the detection query and on the repair transaction.
    #[serde(default = "default_query_timeout_seconds")]
    pub query_timeout_seconds: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            threshold_minutes: default_threshold_minutes(),
            dry_run: false,
            debug: false,
            connect_timeout_seconds: default_connect_timeout_seconds(),
            query_timeout_seconds: default_query_timeout_seconds(),
        }
    }
}

/// Settings threaded into the detector and repairer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairConfig {
    /// Hung-session age cutoff.
    pub threshold_minutes: NonZeroU32,
    /// Simulate instead of commit.
    pub dry_run: bool,
    /// Query tracing verbosity.
    pub verbosity: LogVerbosity,
    /// Bound on each store round (detection, repair transaction).
    pub query_timeout: Duration,
}

impl JanitorConfig {
    /// Load configuration from a TOML file path, without validating it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, without validating it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    /// Overlay settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a numeric or boolean variable cannot
    /// be parsed.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// Overlay settings from an arbitrary variable lookup.
    ///
    /// Recognised variables: `DATABASE_URL`, `DB_HOST`, `DB_PORT`,
    /// `DB_USER`, `DB_DATABASE`, `HUNG_SESSION_THRESHOLD`, `DRY_RUN`,
    /// `DEBUG`. Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a numeric or boolean variable cannot
    /// be parsed.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(host) = get("DB_HOST") {
            self.database.host = Some(host);
        }
        if let Some(port) = get("DB_PORT") {
            self.database.port = port
                .trim()
                .parse()
                .map_err(|err| AppError::Config(format!("DB_PORT is not a valid port: {err}")))?;
        }
        if let Some(user) = get("DB_USER") {
            self.database.user = Some(user);
        }
        if let Some(name) = get("DB_DATABASE") {
            self.database.name = Some(name);
        }
        if let Some(threshold) = get("HUNG_SESSION_THRESHOLD") {
            self.threshold_minutes = threshold.trim().parse().map_err(|err| {
                AppError::Config(format!("HUNG_SESSION_THRESHOLD is not an integer: {err}"))
            })?;
        }
        if let Some(dry_run) = get("DRY_RUN") {
            self.dry_run = parse_bool("DRY_RUN", &dry_run)?;
        }
        if let Some(debug) = get("DEBUG") {
            self.debug = parse_bool("DEBUG", &debug)?;
        }
        Ok(())
    }

    /// Check the final, fully layered configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for a non-positive threshold, a zero
    /// timeout, or an incomplete store target.
    pub fn validate(&self) -> Result<()> {
        self.threshold()?;
        if self.connect_timeout_seconds == 0 {
            return Err(AppError::Config(
                "connect_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.query_timeout_seconds == 0 {
            return Err(AppError::Config(
                "query_timeout_seconds must be greater than zero".into(),
            ));
        }
        self.database.target()?;
        Ok(())
    }

    /// The threshold as a positive minute count.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the threshold is zero, negative, or
    /// does not fit in 32 bits.
    pub fn threshold(&self) -> Result<NonZeroU32> {
        u32::try_from(self.threshold_minutes)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "threshold_minutes must be a positive integer, got {}",
                    self.threshold_minutes
                ))
            })
    }

    /// Verbosity derived from the `debug` setting.
    #[must_use]
    pub fn verbosity(&self) -> LogVerbosity {
        LogVerbosity::from_debug_flag(self.debug)
    }

    /// Bound on acquiring the store connection.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Settings for the detector and repairer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the threshold is not positive.
    pub fn repair_config(&self) -> Result<RepairConfig> {
        Ok(RepairConfig {
            threshold_minutes: self.threshold()?,
            dry_run: self.dry_run,
            verbosity: self.verbosity(),
            query_timeout: Duration::from_secs(self.query_timeout_seconds),
        })
    }

    /// Load the store password from the OS keychain with env-var fallback.
    ///
    /// Only needed when connecting by parts; a URL carries its own
    /// credentials. Tries the `radacct-janitor` keyring service first,
    /// then `DB_PASSWORD`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a password.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if self.database.needs_password() && self.database.password.is_none() {
            self.database.password = Some(load_credential("db_password", "DB_PASSWORD").await?);
        }
        Ok(())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!(
            "{key} must be a boolean (true/false/1/0/yes/no/on/off), got {other:?}"
        ))),
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(keyring::Error::NoEntry) => {}
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain service {KEYRING_SERVICE} or {env_key} env var"
        ))),
    }
}
