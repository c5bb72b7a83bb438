//! Unit tests for store password loading.
//!
//! The keyring service `radacct-janitor` has no entries in test
//! environments, so these exercise the `DB_PASSWORD` fallback.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use radacct_janitor::{AppError, JanitorConfig};

fn parts_config() -> JanitorConfig {
    let mut config = JanitorConfig::default();
    config.database.host = Some("radius-db".into());
    config.database.user = Some("radius".into());
    config.database.name = Some("radius".into());
    config
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn password_loaded_from_env_when_connecting_by_parts() {
    let mut config = parts_config();
    unsafe {
        std::env::set_var("DB_PASSWORD", "radpass");
    }

    let result = config.load_credentials().await;
    assert!(result.is_ok(), "load_credentials should succeed with env var");
    assert_eq!(config.database.password.as_deref(), Some("radpass"));

    unsafe {
        std::env::remove_var("DB_PASSWORD");
    }
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn url_mode_skips_password_lookup() {
    let mut config = JanitorConfig::default();
    config.database.url = Some("mysql://radius:inline@db/radius".into());
    unsafe {
        std::env::remove_var("DB_PASSWORD");
    }

    config.load_credentials().await.expect("url carries credentials");
    assert!(config.database.password.is_none());
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn preloaded_password_is_kept() {
    let mut config = parts_config();
    config.database.password = Some("from-caller".into());
    unsafe {
        std::env::set_var("DB_PASSWORD", "from-env");
    }

    config.load_credentials().await.expect("already loaded");
    assert_eq!(config.database.password.as_deref(), Some("from-caller"));

    unsafe {
        std::env::remove_var("DB_PASSWORD");
    }
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn missing_password_error_names_both_sources() {
    let mut config = parts_config();
    unsafe {
        std::env::remove_var("DB_PASSWORD");
    }

    let err = config
        .load_credentials()
        .await
        .expect_err("no credential source exists");
    assert!(matches!(err, AppError::Config(_)));
    let msg = err.to_string();
    assert!(msg.contains("radacct-janitor"), "got: {msg}");
    assert!(msg.contains("DB_PASSWORD"), "got: {msg}");
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn empty_env_password_counts_as_missing() {
    let mut config = parts_config();
    unsafe {
        std::env::set_var("DB_PASSWORD", "");
    }

    let result = config.load_credentials().await;
    assert!(result.is_err(), "empty password must not be accepted");

    unsafe {
        std::env::remove_var("DB_PASSWORD");
    }
}
