//! `SQLite` `radacct` schema bootstrap.
//!
//! The accounting schema belongs to the RADIUS server; this only exists
//! to stand up a compatible table for local stores and tests. Uses
//! `CREATE TABLE IF NOT EXISTS`, so it is safe to re-run.

use sqlx::SqlitePool;

use crate::Result;

/// Create the `radacct` table and its session-state index if absent.
///
/// Column names and types follow the `FreeRADIUS` `SQLite` schema, cut
/// down to the columns accounting rows commonly carry.
///
/// # Errors
///
/// Returns `AppError::StoreUnavailable` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS radacct (
    radacctid           INTEGER PRIMARY KEY AUTOINCREMENT,
    acctsessionid       VARCHAR(64) NOT NULL DEFAULT '',
    acctuniqueid        VARCHAR(32) NOT NULL DEFAULT '',
    username            VARCHAR(64) NOT NULL DEFAULT '',
    realm               VARCHAR(64) DEFAULT '',
    nasipaddress        VARCHAR(15) NOT NULL DEFAULT '',
    nasportid           VARCHAR(32) DEFAULT NULL,
    acctstarttime       DATETIME NULL DEFAULT NULL,
    acctupdatetime      DATETIME NULL DEFAULT NULL,
    acctstoptime        DATETIME NULL DEFAULT NULL,
    acctinterval        INTEGER DEFAULT NULL,
    acctsessiontime     INTEGER DEFAULT NULL,
    acctinputoctets     BIGINT DEFAULT NULL,
    acctoutputoctets    BIGINT DEFAULT NULL,
    callingstationid    VARCHAR(50) NOT NULL DEFAULT '',
    acctterminatecause  VARCHAR(32) DEFAULT NULL,
    framedipaddress     VARCHAR(15) NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS radacct_open_sessions_idx ON radacct(acctstoptime, acctupdatetime);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
