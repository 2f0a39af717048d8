//! Integration tests for the session lifecycle: claim, heartbeat, retry,
//! and terminal writes.

use std::sync::Arc;
use std::time::Duration;

use statement_runner::metrics::{
    Metrics, SESSION_FAILED, SESSION_RETRY, SESSION_RUNNING, SESSION_SUCCESS,
};
use statement_runner::models::session::{Session, SessionState};
use statement_runner::models::statement::StatementState;
use statement_runner::orchestrator::session_driver::{SessionDriver, SessionOutcome};
use statement_runner::store::UpdateMode;

use super::test_helpers::{
    FakeStore, FakeWriter, Harness, Probe, SessionWrite, APP_ID, JOB_ID, SESSION_ID,
};

fn driver(harness: &Harness) -> SessionDriver {
    SessionDriver::with_metrics(Arc::new(harness.ctx.clone()), Arc::new(Metrics::new()))
}

fn claim_then(state: SessionState, applied: bool) -> Vec<SessionWrite> {
    vec![
        SessionWrite {
            state: SessionState::Running,
            mode: UpdateMode::Upsert,
            applied: true,
        },
        SessionWrite {
            state,
            mode: UpdateMode::UpdateIfUnchanged,
            applied,
        },
    ]
}

#[tokio::test(start_paused = true)]
async fn idle_session_completes_and_stops_heartbeat() {
    let harness = Harness::new(FakeStore::with_statements(&["q1"]), FakeWriter::new(Probe::Ready));
    let driver = driver(&harness);

    let outcome = driver.run().await.expect("claim succeeds");

    assert_eq!(outcome, SessionOutcome::Completed);
    let session = harness.store.session().expect("session created");
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.job_id, JOB_ID);
    assert!(session.excluded_job_ids.contains("job-0"));
    assert_eq!(
        harness.store.session_writes(),
        claim_then(SessionState::Completed, true)
    );
    assert_eq!(harness.store.statements()[0].state, StatementState::Succeeded);

    let beats = harness.store.heartbeats();
    assert!(beats >= 4, "heartbeat ran during the idle window, got {beats}");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.store.heartbeats(), beats, "heartbeat stopped on exit");

    let metrics = driver.metrics();
    assert_eq!(metrics.get(SESSION_RUNNING), 0);
    assert_eq!(metrics.get(SESSION_SUCCESS), 1);
    assert_eq!(metrics.get(SESSION_FAILED), 0);
}

#[tokio::test(start_paused = true)]
async fn existing_session_is_reclaimed() {
    let store = FakeStore::default();
    let mut previous = Session::new(APP_ID.into(), "job-0".into(), SESSION_ID.into());
    previous.claim(APP_ID, "job-0", &[]);
    previous.seq_no = 7;
    store.state.lock().unwrap().session = Some(previous.clone());
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));

    let outcome = driver(&harness).run().await.expect("claim succeeds");

    assert_eq!(outcome, SessionOutcome::Completed);
    let session = harness.store.session().expect("session");
    assert_eq!(session.job_id, JOB_ID);
    assert_eq!(session.create_time, previous.create_time);
    assert_eq!(session.state, SessionState::Completed);
}

#[tokio::test(start_paused = true)]
async fn terminal_session_is_not_reclaimed() {
    let store = FakeStore::with_statements(&["q1"]);
    let mut finished = Session::new(APP_ID.into(), "job-0".into(), SESSION_ID.into());
    finished.claim(APP_ID, "job-0", &[]);
    finished.complete();
    store.state.lock().unwrap().session = Some(finished);
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));

    let outcome = driver(&harness).run().await.expect("no store errors");

    assert_eq!(outcome, SessionOutcome::Superseded);
    assert!(harness.store.session_writes().is_empty());
    assert!(harness.engine.executed().is_empty());
    assert_eq!(harness.store.heartbeats(), 0);
}

#[tokio::test(start_paused = true)]
async fn ownership_loss_skips_terminal_write() {
    let store = FakeStore::with_statements(&["q1", "q2", "q3"]);
    store.state.lock().unwrap().usurp_after = Some(1);
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));
    let driver = driver(&harness);

    let outcome = driver.run().await.expect("claim succeeds");

    assert_eq!(outcome, SessionOutcome::Superseded);
    assert!(driver.early_exit());
    // Only the claim was written; the new owner's record is untouched.
    let writes = harness.store.session_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].mode, UpdateMode::Upsert);
    let session = harness.store.session().expect("session");
    assert_eq!(session.state, SessionState::Running);
    assert_eq!(session.job_id, "job-2");

    let pending = harness
        .store
        .statements()
        .iter()
        .filter(|st| st.state == StatementState::Waiting)
        .count();
    assert_eq!(pending, 2);
    assert_eq!(driver.metrics().get(SESSION_SUCCESS), 0);
    assert_eq!(driver.metrics().get(SESSION_FAILED), 0);
}

#[tokio::test(start_paused = true)]
async fn self_excluded_job_never_writes() {
    let mut harness =
        Harness::new(FakeStore::with_statements(&["q1"]), FakeWriter::new(Probe::Ready));
    harness.ctx.excluded_job_ids = vec![JOB_ID.into()];
    let driver = driver(&harness);

    let outcome = driver.run().await.expect("no store errors");

    assert_eq!(outcome, SessionOutcome::Superseded);
    assert!(driver.early_exit());
    assert!(harness.store.session_writes().is_empty());
    assert!(harness.store.session().is_none());
    assert!(harness.engine.executed().is_empty());
    assert_eq!(harness.store.heartbeats(), 0);
    assert_eq!(driver.metrics().get(SESSION_RUNNING), 0);
}

#[tokio::test(start_paused = true)]
async fn job_excluded_by_stored_session_never_writes() {
    let store = FakeStore::with_statements(&["q1"]);
    let mut previous = Session::new(APP_ID.into(), "job-0".into(), SESSION_ID.into());
    previous.claim(APP_ID, "job-0", &[JOB_ID.to_owned()]);
    store.state.lock().unwrap().session = Some(previous.clone());
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));
    let driver = driver(&harness);

    let outcome = driver.run().await.expect("no store errors");

    assert_eq!(outcome, SessionOutcome::Superseded);
    assert!(driver.early_exit());
    assert!(harness.store.session_writes().is_empty());
    let session = harness.store.session().expect("session");
    assert_eq!(session.job_id, "job-0");
    assert_eq!(session.seq_no, previous.seq_no);
    assert!(harness.engine.executed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rerun_after_ownership_loss_completes() {
    let store = FakeStore::with_statements(&["q1", "q2"]);
    store.state.lock().unwrap().usurp_after = Some(1);
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));
    let driver = driver(&harness);

    assert_eq!(driver.run().await.expect("claim succeeds"), SessionOutcome::Superseded);
    assert!(driver.early_exit());

    harness.store.state.lock().unwrap().usurp_after = None;
    let outcome = driver.run().await.expect("claim succeeds");

    assert_eq!(outcome, SessionOutcome::Completed);
    assert!(!driver.early_exit());
    let session = harness.store.session().expect("session");
    assert_eq!(session.state, SessionState::Completed);
    assert_eq!(session.job_id, JOB_ID);
    assert_eq!(harness.engine.executed(), ["q1", "q2"]);
}

#[tokio::test(start_paused = true)]
async fn connectivity_failures_retry_with_session_running() {
    let store = FakeStore::with_statements(&["q1"]);
    store.state.lock().unwrap().connectivity_failures = 3;
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));
    let driver = driver(&harness);

    let outcome = driver.run().await.expect("claim succeeds");

    assert_eq!(outcome, SessionOutcome::Completed);
    let state_during_failures = harness.store.state.lock().unwrap().state_during_failures.clone();
    assert_eq!(state_during_failures, [SessionState::Running; 3]);
    assert_eq!(
        harness.store.session_writes(),
        claim_then(SessionState::Completed, true)
    );
    assert_eq!(harness.engine.executed(), ["q1"]);
    assert_eq!(driver.metrics().get(SESSION_RETRY), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_session() {
    let store = FakeStore::with_statements(&["q1"]);
    store.state.lock().unwrap().connectivity_failures = 10;
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));
    let driver = driver(&harness);

    let outcome = driver.run().await.expect("claim succeeds");

    let SessionOutcome::Failed(reason) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(reason.starts_with("connectivity:"), "got {reason}");
    let session = harness.store.session().expect("session");
    assert_eq!(session.state, SessionState::Failed);
    assert_eq!(session.error.as_deref(), Some(reason.as_str()));
    assert_eq!(
        harness.store.session_writes(),
        claim_then(SessionState::Failed, true)
    );
    // Five attempts consumed five injected failures.
    assert_eq!(harness.store.state.lock().unwrap().connectivity_failures, 5);
    assert_eq!(driver.metrics().get(SESSION_FAILED), 1);
    assert_eq!(driver.metrics().get(SESSION_RUNNING), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_claim_turns_terminal_write_into_noop() {
    let store = FakeStore::with_statements(&["q1"]);
    let harness = Harness::new(store, FakeWriter::new(Probe::Ready));
    let store = Arc::clone(&harness.store);
    // Another writer bumps the record without taking ownership from this job.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Some(session) = store.state.lock().unwrap().session.as_mut() {
            session.seq_no += 1;
        }
    });

    let outcome = driver(&harness).run().await.expect("claim succeeds");

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(
        harness.store.session_writes(),
        claim_then(SessionState::Completed, false)
    );
    let session = harness.store.session().expect("session");
    assert_eq!(session.state, SessionState::Running);
}
