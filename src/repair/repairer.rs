//! Synthetic close of hung sessions, committed or simulated.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, info_span, warn, Instrument};

use crate::config::RepairConfig;
use crate::models::repair::{RepairSummary, SessionClose};
use crate::models::session::SessionRecord;
use crate::persistence::db::Database;
use crate::persistence::session_repo::SessionRepo;
use crate::{AppError, Result};

/// Closes hung sessions with `stop_time = update_time` and
/// `terminate_cause = Session-Timeout`.
pub struct Repairer {
    repo: SessionRepo,
    query_timeout: Duration,
}

impl Repairer {
    /// Construct a repairer over `db`.
    #[must_use]
    pub fn new(db: Arc<Database>, config: &RepairConfig) -> Self {
        Self {
            repo: SessionRepo::with_verbosity(db, config.verbosity),
            query_timeout: config.query_timeout,
        }
    }

    /// Repair `records`.
    ///
    /// With `dry_run` nothing is sent to the store and each record is
    /// reported as a would-update. Otherwise all closes go through one
    /// transaction: either every row is closed or none is.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreWrite` if any update fails or the updates
    /// exceed the query timeout; nothing is committed in either case.
    /// Returns `AppError::StoreUnavailable` if the transaction cannot be
    /// opened. Never fails in dry-run mode.
    pub async fn repair(&self, records: &[SessionRecord], dry_run: bool) -> Result<RepairSummary> {
        let span = info_span!("repair_hung_sessions", count = records.len(), dry_run);
        async {
            let closes = plan_closes(records);

            if dry_run {
                for close in &closes {
                    info!(
                        radacctid = close.id,
                        username = %close.username,
                        stop_time = %close.stop_time,
                        session_duration = close.session_duration,
                        "would close hung session (dry run)"
                    );
                }
                let summary = RepairSummary::simulated(closes);
                log_summary(&summary);
                return Ok(summary);
            }

            let skipped = self.commit(&closes).await?;
            for close in closes.iter().filter(|c| !skipped.contains(&c.id)) {
                info!(
                    radacctid = close.id,
                    username = %close.username,
                    stop_time = %close.stop_time,
                    session_duration = close.session_duration,
                    "closed hung session"
                );
            }

            let applied = closes.len() - skipped.len();
            let summary = RepairSummary::committed(closes, applied);
            log_summary(&summary);
            Ok::<_, AppError>(summary)
        }
        .instrument(span)
        .await
    }

    /// Run the batch transaction; the query timeout bounds the updates.
    async fn commit(&self, closes: &[SessionClose]) -> Result<Vec<i64>> {
        let outcome = self.repo.close_batch(closes, self.query_timeout).await;
        if let Err(AppError::StoreWrite(failure)) = &outcome {
            error!(
                failed_id = ?failure.failed_id,
                attempted = ?failure.attempted,
                reason = %failure.reason,
                "repair batch rolled back"
            );
        }
        outcome
    }
}

/// Compute the close for each record, warning about missing start times.
fn plan_closes(records: &[SessionRecord]) -> Vec<SessionClose> {
    records
        .iter()
        .map(|record| {
            let close = SessionClose::for_record(record);
            if close.start_time_missing {
                warn!(
                    radacctid = record.id,
                    username = %record.username,
                    "data quality: hung session has no start time, duration set to 0"
                );
            }
            close
        })
        .collect()
}

fn log_summary(summary: &RepairSummary) {
    info!(
        dry_run = summary.dry_run,
        detected = summary.detected,
        applied = summary.applied,
        would_apply = summary.would_apply,
        already_closed = summary.already_closed,
        anomalies = summary.anomalies,
        "repair pass complete"
    );
}
