//! Unit tests for the session repository.

use std::collections::BTreeSet;
use std::sync::Arc;

use statement_runner::models::session::{Session, SessionState};
use statement_runner::persistence::{db, session_repo::SessionRepo};
use statement_runner::AppError;

async fn repo() -> SessionRepo {
    let db = db::connect_memory().await.expect("db connect");
    SessionRepo::new(Arc::new(db))
}

fn running_session() -> Session {
    let mut session = Session::new("app-1".into(), "job-1".into(), "session-1".into());
    session.claim("app-1", "job-1", &["job-0".to_owned()]);
    session
}

#[tokio::test]
async fn in_memory_connect_creates_tables() {
    let pool = db::connect_memory().await.expect("in-memory connect");
    for table in ["session", "statement"] {
        let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("table '{table}' should be queryable: {e}"));
        assert_eq!(row.0, 0, "table '{table}' should start empty");
    }
}

#[tokio::test]
async fn missing_session_is_none() {
    let repo = repo().await;
    assert!(repo.get_by_id("nope").await.expect("query").is_none());
}

#[tokio::test]
async fn upsert_inserts_then_overwrites_and_bumps_seq_no() {
    let repo = repo().await;
    let session = running_session();
    repo.upsert(&session).await.expect("insert");

    let stored = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.state, SessionState::Running);
    assert_eq!(stored.job_id, "job-1");
    assert_eq!(stored.excluded_job_ids, BTreeSet::from(["job-0".to_owned()]));
    assert_eq!(stored.seq_no, 1);

    let mut moved = stored.clone();
    moved.job_id = "job-2".into();
    repo.upsert(&moved).await.expect("overwrite");

    let stored = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.job_id, "job-2");
    assert_eq!(stored.seq_no, 2);
}

#[tokio::test]
async fn conditional_update_applies_when_unchanged() {
    let repo = repo().await;
    repo.upsert(&running_session()).await.expect("insert");
    let mut read = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");

    read.complete();
    let applied = repo.update_if_unchanged(&read).await.expect("update");

    assert!(applied);
    let stored = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.state, SessionState::Completed);
    assert_eq!(stored.seq_no, read.seq_no + 1);
}

#[tokio::test]
async fn conditional_update_is_silent_noop_after_concurrent_write() {
    let repo = repo().await;
    repo.upsert(&running_session()).await.expect("insert");
    let mut stale = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");

    // Another owner claims the session in between.
    let mut other = stale.clone();
    other.claim("app-1", "job-2", &["job-1".to_owned()]);
    repo.upsert(&other).await.expect("concurrent claim");

    stale.complete();
    let applied = repo.update_if_unchanged(&stale).await.expect("no error");

    assert!(!applied);
    let stored = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.state, SessionState::Running);
    assert_eq!(stored.job_id, "job-2");
}

#[tokio::test]
async fn touch_advances_time_without_bumping_seq_no() {
    let repo = repo().await;
    repo.upsert(&running_session()).await.expect("insert");
    let before = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    repo.touch("session-1").await.expect("touch");

    let after = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");
    assert!(after.last_update_time > before.last_update_time);
    assert_eq!(after.seq_no, before.seq_no);
}

#[tokio::test]
async fn touch_missing_session_is_not_found() {
    let repo = repo().await;
    let err = repo.touch("ghost").await.expect_err("missing session");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn set_excluded_job_ids_revokes_ownership() {
    let repo = repo().await;
    repo.upsert(&running_session()).await.expect("insert");

    repo.set_excluded_job_ids("session-1", &BTreeSet::from(["job-1".to_owned()]))
        .await
        .expect("exclude");

    let stored = repo
        .get_by_id("session-1")
        .await
        .expect("fetch")
        .expect("present");
    assert!(!stored.can_pick_next_statement("job-1"));
    assert_eq!(stored.seq_no, 2);
}
