//! Synthetic session close and per-run repair summary.

use chrono::NaiveDateTime;
use serde::Serialize;

use super::session::SessionRecord;

/// Terminate cause written on every repaired row.
///
/// Distinguishes janitor repairs from sessions the NAS closed itself.
pub const TERMINATE_CAUSE: &str = "Session-Timeout";

/// The values written to close one hung session.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionClose {
    /// `radacctid` of the row to close.
    pub id: i64,
    /// Owner of the session, for reporting.
    pub username: String,
    /// Synthetic stop time: the row's last update.
    pub stop_time: NaiveDateTime,
    /// Whole seconds between start and synthetic stop, never negative.
    pub session_duration: i64,
    /// Always [`TERMINATE_CAUSE`].
    pub terminate_cause: String,
    /// The row had no start time, so the duration defaulted to zero.
    pub start_time_missing: bool,
}

impl SessionClose {
    /// Derive the synthetic close for a detected record.
    ///
    /// The stop time is the record's `update_time`, never the wall clock.
    /// A start time later than the last update yields a zero duration.
    #[must_use]
    pub fn for_record(record: &SessionRecord) -> Self {
        let stop_time = record.update_time;
        let session_duration = record
            .start_time
            .map_or(0, |start| (stop_time - start).num_seconds().max(0));

        Self {
            id: record.id,
            username: record.username.clone(),
            stop_time,
            session_duration,
            terminate_cause: TERMINATE_CAUSE.to_owned(),
            start_time_missing: record.start_time.is_none(),
        }
    }
}

/// Outcome of one repair pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RepairSummary {
    /// Whether the pass was a simulation.
    pub dry_run: bool,
    /// Hung sessions handed to the repairer.
    pub detected: usize,
    /// Rows actually closed by a committed transaction.
    pub applied: usize,
    /// Rows a dry run would have closed.
    pub would_apply: usize,
    /// Rows another writer closed between detection and repair.
    pub already_closed: usize,
    /// Rows repaired with a defaulted duration because the start time was missing.
    pub anomalies: usize,
    /// Computed closes, in detection order.
    pub closes: Vec<SessionClose>,
}

impl RepairSummary {
    /// Summary of a simulated pass.
    #[must_use]
    pub fn simulated(closes: Vec<SessionClose>) -> Self {
        Self {
            dry_run: true,
            detected: closes.len(),
            applied: 0,
            would_apply: closes.len(),
            already_closed: 0,
            anomalies: count_anomalies(&closes),
            closes,
        }
    }

    /// Summary of a committed pass that changed `applied` rows.
    #[must_use]
    pub fn committed(closes: Vec<SessionClose>, applied: usize) -> Self {
        Self {
            dry_run: false,
            detected: closes.len(),
            applied,
            would_apply: 0,
            already_closed: closes.len().saturating_sub(applied),
            anomalies: count_anomalies(&closes),
            closes,
        }
    }

    /// Whether there was nothing to repair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detected == 0
    }
}

fn count_anomalies(closes: &[SessionClose]) -> usize {
    closes.iter().filter(|c| c.start_time_missing).count()
}
