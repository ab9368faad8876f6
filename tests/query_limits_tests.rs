// Tests for query limits enforced at execution time
mod common;

use common::{create_engine_with_limits, query};
use docsql::{parse_sql, validate, ErrorKind, QueryLimits, SqlError, Value};

#[tokio::test]
async fn test_require_limit_rejects_plain_scan() {
    let engine = create_engine_with_limits(QueryLimits::strict());

    let err = engine.execute("SELECT * FROM users").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Limit);
    assert!(err.to_string().contains("users"));
    assert!(err.to_string().contains("1000"));

    let rows = query(&engine, "SELECT * FROM users LIMIT 10").await;
    assert_eq!(rows.len(), 10);
}

#[tokio::test]
async fn test_unknown_table_wins_over_missing_limit() {
    let engine = create_engine_with_limits(QueryLimits::strict());
    let err = engine.execute("SELECT * FROM ghosts").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert_eq!(err, SqlError::TableNotFound("ghosts".to_string()));
}

#[tokio::test]
async fn test_require_limit_allows_aggregates() {
    let engine = create_engine_with_limits(QueryLimits::strict());

    let rows = query(&engine, "SELECT COUNT(*) AS n FROM users").await;
    assert_eq!(rows[0]["n"], Value::from(300i64));

    let rows = query(&engine, "SELECT status, COUNT(*) AS n FROM users GROUP BY status").await;
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_exempt_table() {
    let limits = QueryLimits::strict().with_exempt_table("posts");
    let engine = create_engine_with_limits(limits);

    let rows = query(&engine, "SELECT _id FROM posts").await;
    assert_eq!(rows.len(), 150);
    assert!(engine.execute("SELECT _id FROM users").await.is_err());
}

#[tokio::test]
async fn test_limit_above_maximum() {
    let engine = create_engine_with_limits(QueryLimits::strict());
    let err = engine
        .execute("SELECT COUNT(*) FROM users LIMIT 5000")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SqlError::LimitExceeded {
            limit: 5000,
            max_limit: 1000,
        }
    );
}

#[tokio::test]
async fn test_default_limit_is_max_rows() {
    let limits = QueryLimits {
        max_rows: 25,
        ..QueryLimits::default()
    };
    let engine = create_engine_with_limits(limits.clone());

    let rows = query(&engine, "SELECT _id FROM users").await;
    assert_eq!(rows.len(), 25);

    let mut stmt = parse_sql("SELECT _id FROM users").unwrap();
    validate(&mut stmt, &limits).unwrap();
    assert_eq!(stmt.limit, Some(25));
}

#[tokio::test]
async fn test_max_rows_caps_grouped_results() {
    let limits = QueryLimits {
        max_rows: 2,
        ..QueryLimits::default()
    };
    let engine = create_engine_with_limits(limits);

    let rows = query(&engine, "SELECT team, COUNT(*) FROM users GROUP BY team").await;
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_limits_from_toml() {
    let limits = QueryLimits::from_toml_str(
        r#"
        max_rows = 200
        require_limit = true
        exempt_tables = ["settings"]
        "#,
    )
    .unwrap();

    assert_eq!(limits.max_rows, 200);
    assert_eq!(limits.max_limit, QueryLimits::default().max_limit);
    assert!(limits.require_limit);
    assert!(limits.is_exempt("settings"));

    assert!(QueryLimits::from_toml_str("max_rows = \"many\"").is_err());
}
