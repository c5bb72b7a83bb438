//! Integration tests for store connection and schema bootstrap.

use std::sync::Arc;
use std::time::Duration;

use radacct_janitor::config::DatabaseConfig;
use radacct_janitor::persistence::{db, schema};
use radacct_janitor::{repair, AppError};

use super::test_helpers::{insert_open, repair_config};

fn url_config(url: String) -> DatabaseConfig {
    DatabaseConfig {
        url: Some(url),
        ..DatabaseConfig::default()
    }
}

#[tokio::test]
async fn connects_to_sqlite_file_and_sweeps() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("radacct.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let db = db::connect(&url_config(url), Duration::from_secs(5))
        .await
        .expect("connect");
    assert_eq!(db.backend(), "sqlite");
    schema::bootstrap_schema(db.as_sqlite().expect("sqlite"))
        .await
        .expect("schema");
    // Bootstrap is idempotent.
    schema::bootstrap_schema(db.as_sqlite().expect("sqlite"))
        .await
        .expect("schema again");

    let db = Arc::new(db);
    insert_open(&db, "file", Some("2000-01-01 00:00:00"), "2000-01-01 00:10:00").await;

    let summary = repair::sweep(Arc::clone(&db), &repair_config(false))
        .await
        .expect("sweep");
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.closes[0].session_duration, 600);
    db.close().await;
}

#[tokio::test]
async fn missing_sqlite_file_is_store_unavailable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("absent.db");
    let url = format!("sqlite://{}", path.display());

    let err = db::connect(&url_config(url), Duration::from_secs(2))
        .await
        .expect_err("file does not exist");
    assert!(matches!(err, AppError::StoreUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn unsupported_scheme_is_config_error() {
    let err = db::connect(
        &url_config("postgres://radius@localhost/radius".into()),
        Duration::from_secs(2),
    )
    .await
    .expect_err("postgres is not supported");
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[tokio::test]
async fn parts_without_password_is_config_error() {
    let config = DatabaseConfig {
        host: Some("127.0.0.1".into()),
        user: Some("radius".into()),
        name: Some("radius".into()),
        ..DatabaseConfig::default()
    };
    let err = db::connect(&config, Duration::from_secs(2))
        .await
        .expect_err("password not loaded");
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}
