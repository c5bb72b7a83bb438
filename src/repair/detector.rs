//! Hung-session detection.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, SubsecRound, TimeDelta};
use tracing::{debug, info, info_span, Instrument};

use crate::config::RepairConfig;
use crate::models::session::SessionRecord;
use crate::persistence::db::Database;
use crate::persistence::session_repo::SessionRepo;
use crate::{AppError, Result};

/// Finds open sessions whose last update is older than the threshold.
///
/// Read-only; failures surface immediately and are never retried.
pub struct Detector {
    repo: SessionRepo,
    query_timeout: Duration,
}

impl Detector {
    /// Construct a detector over `db`.
    #[must_use]
    pub fn new(db: Arc<Database>, config: &RepairConfig) -> Self {
        Self {
            repo: SessionRepo::with_verbosity(db, config.verbosity),
            query_timeout: config.query_timeout,
        }
    }

    /// Hung sessions as of the store's current time.
    ///
    /// The clock is read from the store, not the local host, so the
    /// cutoff is in the same time zone as the stored timestamps.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if reading the clock or the
    /// detection query fails or times out.
    pub async fn find_hung(&self, threshold_minutes: NonZeroU32) -> Result<Vec<SessionRecord>> {
        let now = tokio::time::timeout(self.query_timeout, self.repo.store_now())
            .await
            .map_err(|_| {
                AppError::StoreUnavailable(format!(
                    "store clock query exceeded {:?}",
                    self.query_timeout
                ))
            })??;
        debug!(store_now = %now, "read store clock");
        self.find_hung_as_of(now, threshold_minutes).await
    }

    /// Hung sessions relative to an explicit `now`, given in the store's
    /// time zone.
    ///
    /// `now` is truncated to microseconds, the finest precision the
    /// supported stores keep. A row updated exactly at the cutoff is not
    /// hung.
    ///
    /// # Errors
    ///
    /// Returns `AppError::StoreUnavailable` if the query fails or times out.
    pub async fn find_hung_as_of(
        &self,
        now: NaiveDateTime,
        threshold_minutes: NonZeroU32,
    ) -> Result<Vec<SessionRecord>> {
        let cutoff = cutoff_for(now, threshold_minutes);
        let span = info_span!(
            "detect_hung_sessions",
            %cutoff,
            threshold_minutes = threshold_minutes.get()
        );

        async {
            let hung = tokio::time::timeout(self.query_timeout, self.repo.find_open_before(cutoff))
                .await
                .map_err(|_| {
                    AppError::StoreUnavailable(format!(
                        "detection query exceeded {:?}",
                        self.query_timeout
                    ))
                })??;
            debug_assert!(hung.iter().all(|record| record.is_hung(cutoff)));

            for record in &hung {
                info!(
                    radacctid = record.id,
                    username = %record.username,
                    update_time = %record.update_time,
                    "hung session detected"
                );
            }
            Ok::<_, AppError>(hung)
        }
        .instrument(span)
        .await
    }
}

/// `now - threshold`, at microsecond precision.
#[must_use]
pub fn cutoff_for(now: NaiveDateTime, threshold_minutes: NonZeroU32) -> NaiveDateTime {
    now.trunc_subsecs(6) - TimeDelta::minutes(i64::from(threshold_minutes.get()))
}
