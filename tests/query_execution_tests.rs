// Tests for single-table execution: filtering, projection, ordering,
// grouping and aggregation
mod common;

use common::{canonical, column, create_seeded_engine, query};
use docsql::{ErrorKind, InMemoryDatabase, QueryEngine, QueryOutcome, SqlError, Value};
use serde_json::json;

#[tokio::test]
async fn test_select_star_returns_documents() {
    let engine = create_seeded_engine();
    let rows = query(&engine, "SELECT * FROM users WHERE _id = 'u7'").await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], Value::from("user007"));
    assert_eq!(rows[0]["status"], Value::from("pending"));
    assert!(rows[0].contains_key("_creationTime"));
}

#[tokio::test]
async fn test_projection_and_aliases() {
    let engine = create_seeded_engine();
    let rows = query(
        &engine,
        "SELECT name AS who, users.status, missing FROM users WHERE _id = 'u3'",
    )
    .await;

    assert_eq!(rows[0].len(), 3);
    assert_eq!(rows[0]["who"], Value::from("user003"));
    assert_eq!(rows[0]["status"], Value::from("active"));
    assert_eq!(rows[0]["missing"], Value::Null);
}

#[tokio::test]
async fn test_boolean_logic() {
    let engine = create_seeded_engine();

    let rows = query(
        &engine,
        "SELECT _id FROM users WHERE status = 'active' AND (age < 20 OR age > 65)",
    )
    .await;
    // active users are i % 3 == 0; age = 18 + i % 50, absent when i % 25 == 0
    let expected = (0..300)
        .filter(|i| i % 3 == 0 && i % 25 != 0)
        .filter(|i| {
            let age = 18 + i % 50;
            age < 20 || age > 65
        })
        .count();
    assert_eq!(rows.len(), expected);
}

#[tokio::test]
async fn test_null_comparisons() {
    let engine = create_seeded_engine();

    let missing = query(&engine, "SELECT _id FROM users WHERE age = NULL").await;
    assert_eq!(missing.len(), 12);

    let present = query(&engine, "SELECT _id FROM users WHERE age != NULL").await;
    assert_eq!(present.len(), 288);

    // Range comparisons never match a missing field.
    let ranged = query(&engine, "SELECT _id FROM users WHERE age >= 0").await;
    assert_eq!(ranged.len(), 288);
}

#[tokio::test]
async fn test_order_asc_desc_with_nulls() {
    let engine = create_seeded_engine();

    let asc = query(&engine, "SELECT _id, age FROM users ORDER BY age ASC").await;
    let desc = query(&engine, "SELECT _id, age FROM users ORDER BY age DESC").await;

    let asc_ages = column(&asc, "age");
    let desc_ages = column(&desc, "age");
    assert_eq!(asc_ages.len(), 300);

    assert_eq!(asc_ages[0], Value::from(19i64));
    assert!(asc_ages[288..].iter().all(Value::is_null));
    assert!(desc_ages[..12].iter().all(Value::is_null));
    assert_eq!(desc_ages[12], Value::from(67i64));

    let mut reversed = asc_ages.clone();
    reversed.reverse();
    assert_eq!(reversed, desc_ages);
}

#[tokio::test]
async fn test_multi_key_order() {
    let engine = create_seeded_engine();
    let rows = query(
        &engine,
        "SELECT status, name FROM users ORDER BY status DESC, name ASC LIMIT 4",
    )
    .await;

    assert_eq!(
        column(&rows, "status"),
        vec![Value::from("pending"); 4]
    );
    assert_eq!(
        column(&rows, "name"),
        vec![
            Value::from("user001"),
            Value::from("user004"),
            Value::from("user007"),
            Value::from("user010"),
        ]
    );
}

#[tokio::test]
async fn test_string_order_is_case_insensitive() {
    let db = InMemoryDatabase::new();
    db.add_table(
        "words",
        vec![
            json!({"w": "banana"}),
            json!({"w": "Apple"}),
            json!({"w": "cherry"}),
            json!({"w": "apple"}),
        ],
    )
    .unwrap();
    let engine = QueryEngine::new(db);

    let rows = query(&engine, "SELECT w FROM words ORDER BY w").await;
    assert_eq!(
        column(&rows, "w"),
        vec![
            Value::from("apple"),
            Value::from("Apple"),
            Value::from("banana"),
            Value::from("cherry"),
        ]
    );
}

#[tokio::test]
async fn test_count_pending() {
    let engine = create_seeded_engine();
    let rows = query(&engine, "SELECT COUNT(*) FROM users WHERE status = 'pending'").await;

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 1);
    assert_eq!(rows[0]["COUNT(*)"], Value::from(100i64));
}

#[tokio::test]
async fn test_aggregate_functions() {
    let engine = create_seeded_engine();
    let rows = query(
        &engine,
        "SELECT COUNT(age) AS with_age, MIN(age), MAX(age), SUM(team) AS teams, AVG(team) FROM users",
    )
    .await;

    let row = &rows[0];
    assert_eq!(row["with_age"], Value::from(288i64));
    assert_eq!(row["MIN(age)"], Value::from(19i64));
    assert_eq!(row["MAX(age)"], Value::from(67i64));
    assert_eq!(row["teams"], Value::from(450i64));
    assert_eq!(row["AVG(team)"], Value::from(1.5));
}

#[tokio::test]
async fn test_aggregate_ignores_limit_for_scanning() {
    let engine = create_seeded_engine();
    let rows = query(&engine, "SELECT COUNT(*) AS n FROM users LIMIT 1").await;
    assert_eq!(rows[0]["n"], Value::from(300i64));
}

#[tokio::test]
async fn test_group_by_counts() {
    let engine = create_seeded_engine();
    let rows = query(
        &engine,
        "SELECT status, COUNT(*) AS n FROM users GROUP BY status ORDER BY status",
    )
    .await;

    assert_eq!(
        canonical(&rows),
        canonical(&[
            row(&[("status", "active".into()), ("n", 100i64.into())]),
            row(&[("status", "banned".into()), ("n", 100i64.into())]),
            row(&[("status", "pending".into()), ("n", 100i64.into())]),
        ])
    );
    assert_eq!(rows[0]["status"], Value::from("active"));
}

#[tokio::test]
async fn test_group_by_limit_keeps_full_counts() {
    let engine = create_seeded_engine();
    let rows = query(
        &engine,
        "SELECT status, COUNT(*) AS n FROM users GROUP BY status LIMIT 2",
    )
    .await;

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["n"] == Value::from(100i64)));
}

#[tokio::test]
async fn test_group_by_having() {
    let engine = create_seeded_engine();
    let rows = query(
        &engine,
        "SELECT team, AVG(age) AS avg_age FROM users GROUP BY team HAVING COUNT(*) >= 75 ORDER BY avg_age DESC",
    )
    .await;

    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.len() == 2));
    let averages: Vec<f64> = rows.iter().filter_map(|r| r["avg_age"].as_f64()).collect();
    assert!(averages.windows(2).all(|w| w[0] >= w[1]));

    let none = query(
        &engine,
        "SELECT team FROM users GROUP BY team HAVING COUNT(*) > 75",
    )
    .await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_abs_in_groups() {
    let db = InMemoryDatabase::new();
    db.add_table(
        "moves",
        vec![
            json!({"kind": "debit", "delta": -5}),
            json!({"kind": "debit", "delta": -7}),
            json!({"kind": "credit", "delta": 3}),
        ],
    )
    .unwrap();
    let engine = QueryEngine::new(db);
    let rows = query(
        &engine,
        "SELECT kind, ABS(delta) AS size FROM moves GROUP BY kind ORDER BY kind",
    )
    .await;

    assert_eq!(rows[0]["kind"], Value::from("credit"));
    assert_eq!(rows[0]["size"], Value::from(3i64));
    assert_eq!(rows[1]["size"], Value::from(5i64));
}

#[tokio::test]
async fn test_semantic_errors() {
    let engine = create_seeded_engine();

    let cases = [
        "SELECT name, COUNT(*) FROM users GROUP BY status",
        "SELECT * FROM users GROUP BY status",
        "SELECT name, COUNT(*) FROM users",
        "SELECT MEDIAN(age) FROM users",
        "SELECT SUM(age, team) FROM users",
        "SELECT SUM(*) FROM users",
        "SELECT name FROM users HAVING COUNT(*) > 1",
    ];
    for sql in cases {
        let err = engine.execute(sql).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Semantic, "{} -> {}", sql, err);
    }

    let err = engine
        .execute("SELECT name, COUNT(*) FROM users GROUP BY status")
        .await
        .unwrap_err();
    assert_eq!(err, SqlError::NotGrouped("name".to_string()));
}

#[tokio::test]
async fn test_unknown_table_is_named() {
    let engine = create_seeded_engine();
    let err = engine.execute("SELECT * FROM accounts").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(err.to_string().contains("accounts"));
}

#[tokio::test]
async fn test_outcome_reports_failures_as_data() {
    let engine = create_seeded_engine();

    let ok = engine
        .execute_outcome("SELECT COUNT(*) AS n FROM users")
        .await;
    assert!(ok.is_ok());
    assert_eq!(serde_json::to_value(&ok).unwrap()["rows"][0]["n"], 300);

    let failed = engine.execute_outcome("DELETE FROM users").await;
    assert!(!failed.is_ok());
    match failed {
        QueryOutcome::Error { kind, message } => {
            assert_eq!(kind, "UnsupportedCommandError");
            assert!(message.contains("DELETE"));
        }
        other => panic!("expected error outcome, got {:?}", other),
    }
}

fn row(pairs: &[(&str, Value)]) -> docsql::Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
