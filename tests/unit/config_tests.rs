//! Unit tests for configuration parsing, defaults, and validation.

use std::io::Write as _;
use std::time::Duration;

use statement_runner::config::GlobalConfig;
use statement_runner::AppError;

const MINIMAL: &str = r#"
metadata_db = "/tmp/runner/metadata.db"
data_source_db = "/tmp/runner/data.db"

[session]
application_id = "app-1"
job_id = "job-1"
session_id = "session-1"
data_source = "mys3"
"#;

#[test]
fn minimal_config_applies_defaults() {
    let config = GlobalConfig::from_toml_str(MINIMAL).expect("minimal config parses");

    assert_eq!(config.inactivity_limit(), Duration::from_secs(30 * 60));
    assert_eq!(config.query_execution_timeout(), Duration::from_secs(30 * 60));
    assert_eq!(config.query_wait_limit(), Duration::from_secs(10 * 60));
    assert_eq!(config.poll_interval(), Duration::from_millis(100));
    assert_eq!(config.verification_timeout(), Duration::from_secs(60));
    assert_eq!(config.ownership_check_interval(), Duration::from_secs(60));
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(60));
    assert_eq!(config.heartbeat_initial_delay(), Duration::from_secs(3));
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry_initial_delay(), Duration::from_secs(2));
    assert_eq!(config.collaborators.engine, "sqlite");
    assert_eq!(config.collaborators.result_writer, "sqlite");
    assert_eq!(config.collaborators.metadata_store, "sqlite");
    assert!(config.session.excluded_job_ids.is_empty());
}

#[test]
fn explicit_values_override_defaults() {
    let raw = format!(
        "{MINIMAL}
[timeouts]
inactivity_limit_seconds = 5
poll_interval_millis = 20

[heartbeat]
interval_seconds = 7
initial_delay_seconds = 0

[retry]
max_retries = 2
initial_delay_millis = 10
"
    );
    let config = GlobalConfig::from_toml_str(&raw).expect("config parses");

    assert_eq!(config.inactivity_limit(), Duration::from_secs(5));
    assert_eq!(config.poll_interval(), Duration::from_millis(20));
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(7));
    assert_eq!(config.heartbeat_initial_delay(), Duration::ZERO);
    assert_eq!(config.retry.max_retries, 2);
    assert_eq!(config.retry_initial_delay(), Duration::from_millis(10));
    // Untouched option keeps its default.
    assert_eq!(config.query_wait_limit(), Duration::from_secs(600));
}

#[test]
fn empty_session_id_is_rejected() {
    let raw = MINIMAL.replace("session_id = \"session-1\"", "session_id = \"  \"");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("blank session id");
    assert_eq!(
        err,
        AppError::Config("session.session_id must not be empty".into())
    );
}

#[test]
fn zero_execution_timeout_is_rejected() {
    let raw = format!("{MINIMAL}\n[timeouts]\nquery_execution_timeout_seconds = 0\n");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("zero timeout");
    assert!(
        err.to_string()
            .contains("timeouts.query_execution_timeout_seconds"),
        "unexpected error: {err}"
    );
}

#[test]
fn zero_ownership_interval_is_allowed() {
    let raw = format!("{MINIMAL}\n[timeouts]\nownership_check_interval_seconds = 0\n");
    let config = GlobalConfig::from_toml_str(&raw).expect("zero interval re-checks every time");
    assert_eq!(config.ownership_check_interval(), Duration::ZERO);
}

#[test]
fn zero_max_retries_is_rejected() {
    let raw = format!("{MINIMAL}\n[retry]\nmax_retries = 0\n");
    assert!(matches!(
        GlobalConfig::from_toml_str(&raw),
        Err(AppError::Config(_))
    ));
}

#[test]
fn own_job_in_exclusion_list_is_rejected() {
    let raw = MINIMAL.replace(
        "data_source = \"mys3\"",
        "data_source = \"mys3\"\nexcluded_job_ids = [\"job-0\", \"job-1\"]",
    );
    let err = GlobalConfig::from_toml_str(&raw).expect_err("self-excluded job");
    assert!(err.to_string().contains("excluded_job_ids"));
}

#[test]
fn malformed_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("metadata_db = [").expect_err("bad toml");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_session_table_is_config_error() {
    let raw = "metadata_db = \"a.db\"\ndata_source_db = \"b.db\"\n";
    assert!(matches!(
        GlobalConfig::from_toml_str(raw),
        Err(AppError::Config(_))
    ));
}

#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(MINIMAL.as_bytes()).expect("write config");

    let config = GlobalConfig::load_from_path(file.path()).expect("load config");
    assert_eq!(config.session.session_id, "session-1");
    assert_eq!(config.session.job_id, "job-1");
}

#[test]
fn load_from_missing_path_is_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = GlobalConfig::load_from_path(dir.path().join("absent.toml"))
        .expect_err("missing file");
    assert!(matches!(err, AppError::Config(_)));
}
