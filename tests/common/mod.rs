//! Common test utilities for docsql integration tests
//!
//! Provides shared helpers for:
//! - Seeding an in-memory database with users and posts
//! - Building engines with custom limits
//! - Comparing result sets independent of order

#![allow(dead_code)]

use std::collections::BTreeMap;

use docsql::{InMemoryDatabase, QueryEngine, QueryLimits, Row, Value};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const USER_COUNT: usize = 300;
pub const STATUSES: [&str; 3] = ["active", "pending", "banned"];

/// Install a fmt subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// 300 users (100 per status, every 25th without an age) and 150 posts, five
/// of which reference no existing user.
pub fn create_seeded_database() -> InMemoryDatabase {
    init_tracing();
    let db = InMemoryDatabase::new();

    db.add_table(
        "users",
        (0..USER_COUNT)
            .map(|i| {
                let mut user = json!({
                    "_id": format!("u{}", i),
                    "name": format!("user{:03}", i),
                    "status": STATUSES[i % 3],
                    "team": i % 4,
                });
                if i % 25 != 0 {
                    user["age"] = json!(18 + (i % 50));
                }
                user
            })
            .collect(),
    )
    .unwrap();
    db.define_index("users", "by_status", &["status"]).unwrap();
    db.define_index("users", "by_age", &["age"]).unwrap();
    db.define_index("users", "by_status_age", &["status", "age"])
        .unwrap();

    let mut posts: Vec<serde_json::Value> = (0..145)
        .map(|i| {
            json!({
                "authorId": format!("u{}", i % 100),
                "title": format!("post {}", i),
                "views": (i * 7) % 100,
                "team": i % 4,
            })
        })
        .collect();
    for i in 0..5 {
        posts.push(json!({"authorId": format!("ghost{}", i), "title": "orphan", "views": 1}));
    }
    db.add_table("posts", posts).unwrap();
    db.define_index("posts", "by_author", &["authorId"]).unwrap();
    db.define_index("posts", "by_views", &["views"]).unwrap();

    db
}

pub fn create_seeded_engine() -> QueryEngine<InMemoryDatabase> {
    QueryEngine::with_limits(create_seeded_database(), QueryLimits::permissive())
}

pub fn create_engine_with_limits(limits: QueryLimits) -> QueryEngine<InMemoryDatabase> {
    QueryEngine::with_limits(create_seeded_database(), limits)
}

/// Run a query that is expected to succeed.
pub async fn query(engine: &QueryEngine<InMemoryDatabase>, sql: &str) -> Vec<Row> {
    engine
        .execute(sql)
        .await
        .unwrap_or_else(|err| panic!("query failed: {}\n  {}", sql, err))
}

/// Rows as sorted JSON strings, for multiset comparison.
pub fn canonical(rows: &[Row]) -> Vec<String> {
    let mut out: Vec<String> = rows
        .iter()
        .map(|row| {
            let ordered: BTreeMap<&String, &Value> = row.iter().collect();
            serde_json::to_string(&ordered).unwrap()
        })
        .collect();
    out.sort();
    out
}

/// One column of a result, in row order.
pub fn column(rows: &[Row], key: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(key).cloned().unwrap_or(Value::Null))
        .collect()
}
