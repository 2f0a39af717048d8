//! Unit tests for the built-in `SQLite` result writer.

use std::sync::Arc;

use serde_json::json;

use statement_runner::engine::sqlite_engine::SqliteQueryEngine;
use statement_runner::engine::QueryEngine;
use statement_runner::models::result::{ColumnSchema, QueryResult};
use statement_runner::models::statement::Statement;
use statement_runner::persistence::db;
use statement_runner::writer::sqlite_writer::{SqliteResultWriter, STATUS_SUCCESS};
use statement_runner::writer::ResultWriter;
use statement_runner::AppError;

async fn writer() -> SqliteResultWriter {
    let pool = db::open_memory().await.expect("open destination");
    SqliteResultWriter::new(Arc::new(pool), "mys3".into())
}

fn raw() -> QueryResult {
    QueryResult {
        columns: vec![
            ColumnSchema {
                name: "id".into(),
                data_type: "INTEGER".into(),
            },
            ColumnSchema {
                name: "name".into(),
                data_type: "TEXT".into(),
            },
        ],
        rows: vec![vec![json!(1), json!("alice")], vec![json!(2), json!(null)]],
    }
}

fn running_statement() -> Statement {
    let mut st = Statement::new("session-1".into(), "SELECT id, name FROM t".into());
    st.start();
    st
}

#[tokio::test]
async fn prepare_creates_destination_and_is_repeatable() {
    let writer = writer().await;
    writer.prepare().await.expect("first prepare");
    writer.prepare().await.expect("second prepare");
}

#[tokio::test]
async fn format_encodes_rows_as_arrays_in_schema_order() {
    let writer = writer().await;
    let st = running_statement();

    let formatted = writer.format(raw(), &st).expect("format");

    assert_eq!(formatted.statement_id, st.statement_id);
    assert_eq!(formatted.query_id, st.query_id);
    assert_eq!(formatted.session_id, "session-1");
    assert_eq!(formatted.data_source, "mys3");
    assert_eq!(formatted.status, STATUS_SUCCESS);
    assert_eq!(formatted.schema.len(), 2);
    assert_eq!(formatted.rows.len(), 2);
    let first: serde_json::Value = serde_json::from_str(&formatted.rows[0]).expect("json row");
    assert_eq!(first, json!([1, "alice"]));
    assert_eq!(formatted.rows[1], r#"[2,null]"#);
    assert!(formatted.query_run_time_millis >= 0);
}

#[tokio::test]
async fn format_keeps_duplicate_and_unsorted_columns() {
    let pool = Arc::new(db::open_memory().await.expect("open data source"));
    let engine = SqliteQueryEngine::new(Arc::clone(&pool));
    let writer = SqliteResultWriter::new(pool, "mys3".into());
    let raw = engine
        .execute("SELECT 1 AS z, 2 AS a, 3 AS z".into(), "job-1".into())
        .await
        .expect("query runs");

    let formatted = writer.format(raw, &running_statement()).expect("format");

    let names: Vec<&str> = formatted.schema.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["z", "a", "z"]);
    assert_eq!(formatted.rows, ["[1,2,3]"]);
}

#[tokio::test]
async fn format_rejects_ragged_rows() {
    let writer = writer().await;
    let mut ragged = raw();
    ragged.rows.push(vec![json!(3)]);

    let err = writer
        .format(ragged, &running_statement())
        .expect_err("ragged row");
    assert!(matches!(err, AppError::Persistence(_)));
}

#[tokio::test]
async fn persist_stores_result() {
    let writer = writer().await;
    writer.prepare().await.expect("prepare");
    let st = running_statement();
    let formatted = writer.format(raw(), &st).expect("format");

    writer.persist(&formatted, &st).await.expect("persist");

    let stored = writer
        .results()
        .get_by_statement(&st.statement_id)
        .await
        .expect("fetch")
        .expect("stored");
    assert_eq!(stored.rows, formatted.rows);
    assert_eq!(stored.schema, formatted.schema);
    assert_eq!(stored.status, STATUS_SUCCESS);
}

#[tokio::test]
async fn persist_without_destination_is_persistence_error() {
    let writer = writer().await;
    let st = running_statement();
    let formatted = writer.format(raw(), &st).expect("format");

    let err = writer
        .persist(&formatted, &st)
        .await
        .expect_err("table missing");
    assert!(matches!(err, AppError::Persistence(_)), "got {err:?}");
}
