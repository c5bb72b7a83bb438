//! Accounting session record as read from the `radacct` table.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One `radacct` row relevant to hung-session repair.
///
/// Timestamps are zone-less, exactly as the accounting pipeline stores
/// them; the janitor treats them as UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionRecord {
    /// `radacctid`, assigned by the store.
    pub id: i64,
    /// Subject the session belongs to; never written.
    pub username: String,
    /// Session start, absent if the start event was lost too.
    pub start_time: Option<NaiveDateTime>,
    /// Most recent interim update seen for the session.
    pub update_time: NaiveDateTime,
    /// Session end; `None` while the session is open.
    pub stop_time: Option<NaiveDateTime>,
    /// Reason code recorded at session end.
    pub terminate_cause: Option<String>,
    /// Active seconds, meaningful once `stop_time` is set.
    pub session_duration: Option<i64>,
}

impl SessionRecord {
    /// Whether the session has no recorded stop time.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stop_time.is_none()
    }

    /// Hung-session predicate: open, and last updated strictly before
    /// `cutoff`.
    #[must_use]
    pub fn is_hung(&self, cutoff: NaiveDateTime) -> bool {
        self.is_open() && self.update_time < cutoff
    }
}
