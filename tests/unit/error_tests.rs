//! Unit tests for error display and exit status mapping.

use radacct_janitor::errors::{
    WriteFailure, EXIT_CONFIG, EXIT_STORE_UNAVAILABLE, EXIT_STORE_WRITE, EXIT_UNEXPECTED,
};
use radacct_janitor::AppError;

#[test]
fn display_prefixes() {
    assert_eq!(
        AppError::Config("threshold".into()).to_string(),
        "config: threshold"
    );
    assert_eq!(
        AppError::StoreUnavailable("refused".into()).to_string(),
        "store unavailable: refused"
    );
    assert_eq!(AppError::Io("stdout".into()).to_string(), "io: stdout");
}

#[test]
fn store_write_names_rejected_row() {
    let err = AppError::StoreWrite(WriteFailure {
        failed_id: Some(42),
        attempted: vec![41, 42],
        reason: "lock wait timeout".into(),
    });
    let msg = err.to_string();
    assert!(msg.starts_with("store write:"));
    assert!(msg.contains("radacctid 42"));
    assert!(msg.contains("2 attempted"));
    assert!(msg.contains("lock wait timeout"));
}

#[test]
fn store_write_commit_failure() {
    let err = AppError::StoreWrite(WriteFailure {
        failed_id: None,
        attempted: vec![1, 2, 3],
        reason: "connection reset".into(),
    });
    assert_eq!(
        err.to_string(),
        "store write: commit of 3 update(s) failed: connection reset"
    );
}

#[test]
fn exit_codes_are_distinct_and_non_zero() {
    let codes = [
        AppError::Config(String::new()).exit_code(),
        AppError::StoreUnavailable(String::new()).exit_code(),
        AppError::StoreWrite(WriteFailure {
            failed_id: None,
            attempted: Vec::new(),
            reason: String::new(),
        })
        .exit_code(),
        AppError::Io(String::new()).exit_code(),
    ];
    assert_eq!(
        codes,
        [EXIT_CONFIG, EXIT_STORE_UNAVAILABLE, EXIT_STORE_WRITE, EXIT_UNEXPECTED]
    );
    assert!(codes.iter().all(|c| *c != 0));
    let mut sorted = codes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), codes.len());
}

#[test]
fn toml_errors_become_config_errors() {
    let err: AppError = toml::from_str::<toml::Value>("= nope")
        .expect_err("invalid toml")
        .into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn sqlx_errors_become_store_unavailable() {
    let err: AppError = sqlx::Error::PoolClosed.into();
    assert!(matches!(err, AppError::StoreUnavailable(_)));
    assert_eq!(err.exit_code(), EXIT_STORE_UNAVAILABLE);
}
