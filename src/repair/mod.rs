//! Hung-session repair: detection, synthetic close, and the one-shot sweep.
//!
//! A sweep runs the [`Detector`] once and hands its snapshot to the
//! [`Repairer`]; nothing flows back from repair to detection.

pub mod detector;
pub mod repairer;

use std::sync::Arc;

use tracing::info;

use crate::config::RepairConfig;
use crate::models::repair::RepairSummary;
use crate::persistence::db::Database;
use crate::Result;

pub use detector::Detector;
pub use repairer::Repairer;

/// Detect and repair hung sessions once.
///
/// # Errors
///
/// Returns `AppError::StoreUnavailable` if detection fails (no repair is
/// attempted) and `AppError::StoreWrite` if the repair transaction was
/// rolled back.
pub async fn sweep(db: Arc<Database>, config: &RepairConfig) -> Result<RepairSummary> {
    let detector = Detector::new(Arc::clone(&db), config);
    let repairer = Repairer::new(db, config);

    let hung = detector.find_hung(config.threshold_minutes).await?;
    if hung.is_empty() {
        info!("no hung sessions found");
        return Ok(RepairSummary {
            dry_run: config.dry_run,
            ..RepairSummary::default()
        });
    }

    info!(
        count = hung.len(),
        dry_run = config.dry_run,
        "found hung sessions, repairing"
    );
    repairer.repair(&hung, config.dry_run).await
}
