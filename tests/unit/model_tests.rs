//! Unit tests for session, statement, and verification models.

use std::collections::BTreeSet;

use chrono::{Duration, Utc};

use statement_runner::models::session::{Session, SessionState};
use statement_runner::models::statement::{Statement, StatementState};
use statement_runner::models::verification::VerificationResult;

fn session() -> Session {
    Session::new("app-1".into(), "job-1".into(), "session-1".into())
}

#[test]
fn new_session_is_not_started() {
    let s = session();
    assert_eq!(s.state, SessionState::NotStarted);
    assert_eq!(s.seq_no, 0);
    assert!(s.error.is_none());
    assert!(s.excluded_job_ids.is_empty());
}

#[test]
fn session_transitions() {
    let mut s = session();
    assert!(s.can_transition_to(SessionState::Running));
    assert!(!s.can_transition_to(SessionState::Completed));

    s.state = SessionState::Running;
    assert!(s.can_transition_to(SessionState::Running));
    assert!(s.can_transition_to(SessionState::Completed));
    assert!(s.can_transition_to(SessionState::Failed));

    for terminal in [SessionState::Completed, SessionState::Failed] {
        s.state = terminal;
        assert!(terminal.is_terminal());
        assert!(!s.can_transition_to(SessionState::Running));
        assert!(!s.can_transition_to(SessionState::NotStarted));
    }
}

#[test]
fn claim_records_owner_and_exclusions() {
    let mut s = session();
    s.error = Some("old".into());
    assert!(s.claim("app-2", "job-7", &["job-1".to_owned(), "job-2".to_owned()]));

    assert_eq!(s.state, SessionState::Running);
    assert_eq!(s.application_id, "app-2");
    assert_eq!(s.job_id, "job-7");
    assert!(s.error.is_none());
    assert_eq!(
        s.excluded_job_ids,
        BTreeSet::from(["job-1".to_owned(), "job-2".to_owned()])
    );
}

#[test]
fn owner_may_pick_next_statement() {
    let s = session();
    assert!(s.can_pick_next_statement("job-1"));
}

#[test]
fn different_owner_blocks_pick() {
    let s = session();
    assert!(!s.can_pick_next_statement("job-2"));
}

#[test]
fn empty_owner_allows_any_job() {
    let mut s = session();
    s.job_id = String::new();
    assert!(s.can_pick_next_statement("job-9"));
}

#[test]
fn excluded_job_blocks_pick_even_as_owner() {
    let mut s = session();
    s.excluded_job_ids.insert("job-1".into());
    assert!(!s.can_pick_next_statement("job-1"));
}

#[test]
fn session_fail_records_reason() {
    let mut s = session();
    s.state = SessionState::Running;
    s.fail("connectivity: refused");
    assert_eq!(s.state, SessionState::Failed);
    assert_eq!(s.error.as_deref(), Some("connectivity: refused"));
}

#[test]
fn finished_session_ignores_claim_and_state_changes() {
    let mut s = session();
    assert!(s.claim("app-1", "job-1", &[]));
    s.complete();
    let finished = s.clone();

    assert!(!s.claim("app-2", "job-2", &["job-1".to_owned()]));
    s.fail("late failure");

    assert_eq!(s.state, SessionState::Completed);
    assert_eq!(s.job_id, finished.job_id);
    assert_eq!(s.application_id, finished.application_id);
    assert!(s.excluded_job_ids.is_empty());
    assert!(s.error.is_none());
}

#[test]
fn failed_session_cannot_complete() {
    let mut s = session();
    s.state = SessionState::Running;
    s.fail("boom");
    s.complete();
    assert_eq!(s.state, SessionState::Failed);
    assert_eq!(s.error.as_deref(), Some("boom"));
}

#[test]
fn unclaimed_session_cannot_finish() {
    let mut s = session();
    s.complete();
    assert_eq!(s.state, SessionState::NotStarted);
    s.fail("boom");
    assert_eq!(s.state, SessionState::NotStarted);
    assert!(s.error.is_none());
}

#[test]
fn new_statement_is_waiting_with_distinct_ids() {
    let st = Statement::new("session-1".into(), "SELECT 1".into());
    assert_eq!(st.state, StatementState::Waiting);
    assert_ne!(st.statement_id, st.query_id);
    assert!(st.query_start_time.is_none());
}

#[test]
fn statement_start_sets_running_and_start_time() {
    let mut st = Statement::new("session-1".into(), "SELECT 1".into());
    st.start();
    assert_eq!(st.state, StatementState::Running);
    assert!(st.query_start_time.is_some());
}

#[test]
fn statement_complete_requires_running() {
    let mut st = Statement::new("session-1".into(), "SELECT 1".into());
    st.complete();
    assert_eq!(st.state, StatementState::Waiting);

    st.start();
    st.complete();
    assert_eq!(st.state, StatementState::Succeeded);
}

#[test]
fn terminal_statement_never_regresses() {
    let mut st = Statement::new("session-1".into(), "SELECT 1".into());
    st.start();
    st.fail("first");
    st.complete();
    st.fail("second");
    st.start();

    assert_eq!(st.state, StatementState::Failed);
    assert_eq!(st.error.as_deref(), Some("first"));
}

#[test]
fn succeeded_statement_cannot_fail() {
    let mut st = Statement::new("session-1".into(), "SELECT 1".into());
    st.start();
    st.complete();
    st.fail("late");
    assert_eq!(st.state, StatementState::Succeeded);
    assert!(st.error.is_none());
}

#[test]
fn waited_measures_queue_age() {
    let mut st = Statement::new("session-1".into(), "SELECT 1".into());
    let now = Utc::now();
    st.submit_time = now - Duration::minutes(11);
    assert_eq!(st.waited(now), Duration::minutes(11));
}

#[test]
fn verification_defaults_to_not_verified() {
    let v = VerificationResult::default();
    assert_eq!(v, VerificationResult::NotVerified);
    assert!(!v.is_resolved());
    assert!(VerificationResult::VerifiedOk.is_resolved());
    assert!(VerificationResult::VerifiedError("x".into()).is_resolved());
}

#[test]
fn verification_serializes_as_tagged_union() {
    let json = serde_json::to_value(VerificationResult::VerifiedError("no index".into()))
        .expect("serialize");
    assert_eq!(
        json,
        serde_json::json!({ "status": "verified_error", "reason": "no index" })
    );
}

#[test]
fn state_storage_names() {
    assert_eq!(SessionState::NotStarted.as_str(), "not_started");
    assert_eq!(SessionState::Completed.as_str(), "completed");
    assert_eq!(StatementState::Waiting.as_str(), "waiting");
    assert_eq!(StatementState::Succeeded.as_str(), "succeeded");
}
