//! Integration tests for `SessionRepo` reads and batched closes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use radacct_janitor::models::repair::SessionClose;
use radacct_janitor::persistence::session_repo::SessionRepo;

use super::test_helpers::{insert_open, memory_db, pool, snapshot, ts};

const BATCH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn store_now_reads_the_store_clock() {
    let db = memory_db().await;
    let repo = SessionRepo::new(Arc::clone(&db));

    let before = Utc::now().naive_utc() - TimeDelta::seconds(1);
    let now = repo.store_now().await.expect("store clock");
    let after = Utc::now().naive_utc() + TimeDelta::seconds(1);
    // An in-memory SQLite store keeps UTC, the same clock as the test host.
    assert!(before <= now && now <= after, "store clock {now} outside [{before}, {after}]");
}

#[tokio::test]
async fn get_by_id_returns_none_for_missing() {
    let db = memory_db().await;
    let repo = SessionRepo::new(Arc::clone(&db));
    assert!(repo.get_by_id(42).await.expect("query").is_none());
}

#[tokio::test]
async fn empty_terminate_cause_reads_as_none() {
    let db = memory_db().await;
    let id = insert_open(&db, "blank", None, "2024-05-01 08:00:00").await;
    sqlx::query("UPDATE radacct SET acctterminatecause = '' WHERE radacctid = ?1")
        .bind(id)
        .execute(pool(&db))
        .await
        .expect("blank cause");

    let repo = SessionRepo::new(Arc::clone(&db));
    let row = repo.get_by_id(id).await.expect("query").expect("exists");
    assert!(row.terminate_cause.is_none());
    assert!(row.is_open());
}

#[tokio::test]
async fn find_open_before_uses_strict_cutoff() {
    let db = memory_db().await;
    let old = insert_open(&db, "old", None, "2024-05-01 09:59:59").await;
    insert_open(&db, "at", None, "2024-05-01 10:00:00").await;

    let repo = SessionRepo::new(Arc::clone(&db));
    let rows = repo
        .find_open_before(ts("2024-05-01 10:00:00"))
        .await
        .expect("query");
    assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![old]);
}

#[tokio::test]
async fn close_batch_of_nothing_touches_nothing() {
    let db = memory_db().await;
    let id = insert_open(&db, "idle", None, "2024-05-01 08:00:00").await;
    let before = snapshot(&db, id).await;

    let repo = SessionRepo::new(Arc::clone(&db));
    let skipped = repo.close_batch(&[], BATCH_TIMEOUT).await.expect("empty batch");
    assert!(skipped.is_empty());
    assert_eq!(snapshot(&db, id).await, before);
}

#[tokio::test]
async fn close_batch_writes_all_three_columns_together() {
    let db = memory_db().await;
    let id = insert_open(&db, "trio", Some("2024-05-01 07:00:00"), "2024-05-01 07:00:30").await;
    let repo = SessionRepo::new(Arc::clone(&db));

    let record = repo
        .find_open_before(ts("2024-05-01 12:00:00"))
        .await
        .expect("query")
        .remove(0);
    let skipped = repo
        .close_batch(&[SessionClose::for_record(&record)], BATCH_TIMEOUT)
        .await
        .expect("close");
    assert!(skipped.is_empty());

    let row = repo.get_by_id(id).await.expect("query").expect("exists");
    assert_eq!(row.stop_time, Some(ts("2024-05-01 07:00:30")));
    assert_eq!(row.session_duration, Some(30));
    assert_eq!(row.terminate_cause.as_deref(), Some("Session-Timeout"));
}

#[tokio::test]
async fn close_batch_reports_rows_already_closed() {
    let db = memory_db().await;
    let id = insert_open(&db, "gone", None, "2024-05-01 07:00:00").await;
    let repo = SessionRepo::new(Arc::clone(&db));
    let record = repo
        .find_open_before(ts("2024-05-01 12:00:00"))
        .await
        .expect("query")
        .remove(0);

    sqlx::query("UPDATE radacct SET acctstoptime = '2024-05-01 07:01:00' WHERE radacctid = ?1")
        .bind(id)
        .execute(pool(&db))
        .await
        .expect("close");

    let skipped = repo
        .close_batch(&[SessionClose::for_record(&record)], BATCH_TIMEOUT)
        .await
        .expect("close batch");
    assert_eq!(skipped, vec![id]);
}
