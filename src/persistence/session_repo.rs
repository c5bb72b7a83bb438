//! `radacct` repository: hung-session reads and batched session closes.
//!
//! All statements use bound `?` placeholders, which both `MySQL` and
//! `SQLite` accept, so the SQL text is shared between backends. Only the
//! store clock query differs per backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, error, warn};

use crate::config::LogVerbosity;
use crate::errors::WriteFailure;
use crate::models::repair::SessionClose;
use crate::models::session::SessionRecord;
use crate::{AppError, Result};

use super::db::Database;

/// Detection query: open rows last updated strictly before the cutoff.
pub const SELECT_HUNG_SQL: &str = "SELECT radacctid, username, acctstarttime, acctupdatetime \
     FROM radacct \
     WHERE acctstoptime IS NULL AND acctupdatetime < ? \
     ORDER BY radacctid";

/// Close statement; the `acctstoptime IS NULL` guard leaves rows another
/// writer already closed untouched.
pub const CLOSE_SESSION_SQL: &str = "UPDATE radacct \
     SET acctstoptime = ?, acctterminatecause = ?, acctsessiontime = ? \
     WHERE radacctid = ? AND acctstoptime IS NULL";

/// Store clock on `MySQL`: the session time zone, the same one
/// `FROM_UNIXTIME` uses when the RADIUS server writes accounting rows.
const STORE_NOW_MYSQL_SQL: &str = "SELECT NOW(6)";

/// Store clock on `SQLite` (UTC), in the same text layout as stored rows.
const STORE_NOW_SQLITE_SQL: &str = "SELECT strftime('%Y-%m-%d %H:%M:%f', 'now')";

const SELECT_BY_ID_SQL: &str = "SELECT radacctid, username, acctstarttime, acctupdatetime, \
     acctstoptime, acctterminatecause, CAST(acctsessiontime AS SIGNED) AS acctsessiontime \
     FROM radacct WHERE radacctid = ?";

/// Internal row struct for the detection query.
#[derive(sqlx::FromRow)]
struct HungRow {
    radacctid: i64,
    username: String,
    acctstarttime: Option<NaiveDateTime>,
    acctupdatetime: NaiveDateTime,
}

impl HungRow {
    fn into_record(self) -> SessionRecord {
        SessionRecord {
            id: self.radacctid,
            username: self.username,
            start_time: self.acctstarttime,
            update_time: self.acctupdatetime,
            stop_time: None,
            terminate_cause: None,
            session_duration: None,
        }
    }
}

/// Internal row struct for full single-row reads.
#[derive(sqlx::FromRow)]
struct SessionRow {
    radacctid: i64,
    username: String,
    acctstarttime: Option<NaiveDateTime>,
    acctupdatetime: Option<NaiveDateTime>,
    acctstoptime: Option<NaiveDateTime>,
    acctterminatecause: Option<String>,
    acctsessiontime: Option<i64>,
}

impl SessionRow {
    fn into_record(self) -> Result<SessionRecord> {
        let update_time = self.acctupdatetime.ok_or_else(|| {
            AppError::StoreUnavailable(format!(
                "radacctid {} has no acctupdatetime",
                self.radacctid
            ))
        })?;
        Ok(SessionRecord {
            id: self.radacctid,
            username: self.username,
            start_time: self.acctstarttime,
            update_time,
            stop_time: self.acctstoptime,
            // FreeRADIUS schemas default the cause to '' rather than NULL.
            terminate_cause: self.acctterminatecause.filter(|c| !c.is_empty()),
            session_duration: self.acctsessiontime,
        })
    }
}

/// Issue every close inside one transaction on `$pool`; commit only if
/// all of them succeed. Expands once per backend.
///
/// `$timeout` bounds opening the transaction and the updates. The commit
/// is always awaited so its outcome is known.
macro_rules! close_in_transaction {
    ($pool:expr, $closes:expr, $verbosity:expr, $timeout:expr) => {{
        let deadline = tokio::time::Instant::now() + $timeout;
        let exceeded = |what: &str| format!("{what} exceeded {:?}", $timeout);

        let mut tx = match tokio::time::timeout_at(deadline, $pool.begin()).await {
            Ok(begun) => begun.map_err(|err| {
                AppError::StoreUnavailable(format!("begin repair transaction: {err}"))
            })?,
            Err(_) => {
                return Err(AppError::StoreUnavailable(exceeded(
                    "begin repair transaction",
                )))
            }
        };
        let mut attempted = Vec::with_capacity($closes.len());
        let mut skipped = Vec::new();

        for close in $closes {
            attempted.push(close.id);
            if $verbosity.is_debug() {
                debug!(
                    sql = CLOSE_SESSION_SQL,
                    radacctid = close.id,
                    stop_time = %close.stop_time,
                    terminate_cause = %close.terminate_cause,
                    session_duration = close.session_duration,
                    "close session statement"
                );
            }
            let update = sqlx::query(CLOSE_SESSION_SQL)
                .bind(close.stop_time)
                .bind(&close.terminate_cause)
                .bind(close.session_duration)
                .bind(close.id)
                .execute(&mut *tx);

            let Ok(outcome) = tokio::time::timeout_at(deadline, update).await else {
                // Dropping `tx` rolls back once the abandoned statement returns.
                return Err(AppError::StoreWrite(WriteFailure {
                    failed_id: Some(close.id),
                    attempted,
                    reason: exceeded("repair updates"),
                }));
            };

            match outcome {
                Ok(done) if done.rows_affected() == 0 => {
                    warn!(
                        radacctid = close.id,
                        "session already closed by another writer, left untouched"
                    );
                    skipped.push(close.id);
                }
                Ok(_) => {}
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        error!(%rollback_err, "explicit rollback failed; dropping transaction");
                    }
                    return Err(AppError::StoreWrite(WriteFailure {
                        failed_id: Some(close.id),
                        attempted,
                        reason: err.to_string(),
                    }));
                }
            }
        }

        tx.commit().await.map_err(|err| {
            AppError::StoreWrite(WriteFailure {
                failed_id: None,
                attempted,
                reason: err.to_string(),
            })
        })?;
        Ok(skipped)
    }};
}

/// Repository wrapper around the accounting store for `radacct` rows.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
    verbosity: LogVerbosity,
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_verbosity(db, LogVerbosity::Normal)
    }

    /// Create a repository that traces statements and parameters when
    /// `verbosity` is [`LogVerbosity::Debug`].
    #[must_use]
    pub fn with_verbosity(db: Arc<Database>, verbosity: LogVerbosity) -> Self {
        Self { db, verbosity }
    }

    /// Read all open sessions last updated strictly before `cutoff`,
    /// ordered by `radacctid`.
    ///
    /// A single `SELECT`, so the result is one consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the query fails.
    pub async fn find_open_before(&self, cutoff: NaiveDateTime) -> Result<Vec<SessionRecord>> {
        if self.verbosity.is_debug() {
            debug!(sql = SELECT_HUNG_SQL, %cutoff, "detection query");
        }
        let rows: Vec<HungRow> = match self.db.as_ref() {
            Database::Sqlite(pool) => {
                sqlx::query_as(SELECT_HUNG_SQL)
                    .bind(cutoff)
                    .fetch_all(pool)
                    .await?
            }
            Database::MySql(pool) => {
                sqlx::query_as(SELECT_HUNG_SQL)
                    .bind(cutoff)
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(HungRow::into_record).collect())
    }

    /// Current time according to the store's own clock.
    ///
    /// Stored timestamps are zone-less and written by the RADIUS server in
    /// the store's time zone, so the detection cutoff must come from the
    /// same clock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the query fails or the
    /// result cannot be read as a timestamp.
    pub async fn store_now(&self) -> Result<NaiveDateTime> {
        match self.db.as_ref() {
            Database::Sqlite(pool) => {
                let (raw,): (String,) = sqlx::query_as(STORE_NOW_SQLITE_SQL)
                    .fetch_one(pool)
                    .await?;
                NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f").map_err(|err| {
                    AppError::StoreUnavailable(format!("unreadable store clock {raw:?}: {err}"))
                })
            }
            Database::MySql(pool) => {
                let (now,): (NaiveDateTime,) = sqlx::query_as(STORE_NOW_MYSQL_SQL)
                    .fetch_one(pool)
                    .await?;
                Ok(now)
            }
        }
    }

    /// Retrieve a session by `radacctid`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the query fails or the row
    /// has no update time.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<SessionRecord>> {
        let row: Option<SessionRow> = match self.db.as_ref() {
            Database::Sqlite(pool) => {
                sqlx::query_as(SELECT_BY_ID_SQL)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
            }
            Database::MySql(pool) => {
                sqlx::query_as(SELECT_BY_ID_SQL)
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
            }
        };
        row.map(SessionRow::into_record).transpose()
    }

    /// Apply every close in one all-or-nothing transaction.
    ///
    /// Returns the ids of rows left untouched because another writer had
    /// already closed them; normally empty. An empty batch opens no
    /// transaction.
    ///
    /// `timeout` bounds opening the transaction and issuing the updates;
    /// the commit itself is not cut short.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreWrite` if any update fails or times out, or
    /// if the commit fails; nothing has been committed in any of these
    /// cases. Returns `AppError::StoreUnavailable` if the transaction
    /// cannot be opened in time.
    pub async fn close_batch(
        &self,
        closes: &[SessionClose],
        timeout: Duration,
    ) -> Result<Vec<i64>> {
        if closes.is_empty() {
            return Ok(Vec::new());
        }
        match self.db.as_ref() {
            Database::Sqlite(pool) => {
                close_in_transaction!(pool, closes, self.verbosity, timeout)
            }
            Database::MySql(pool) => {
                close_in_transaction!(pool, closes, self.verbosity, timeout)
            }
        }
    }
}
