//! docsql - read-only SQL over any document store.
//!
//! This crate compiles a small SELECT-only SQL dialect into calls against an
//! abstract document-store interface and runs them to produce rows. It knows
//! nothing about a particular storage engine: anything that implements
//! [`DatabaseContext`] can be queried.
//!
//! # Main Components
//!
//! - **Lexer / Parser**: SQL text to a [`SelectStatement`]
//! - **Limits**: [`QueryLimits`] and the validator that enforces them
//! - **Storage**: the capability traits plus an in-memory implementation
//! - **Executor**: [`QueryEngine`], which plans and runs statements
//!
//! # Example
//!
//! ```rust
//! use docsql::{InMemoryDatabase, QueryEngine, Value};
//! use serde_json::json;
//!
//! let db = InMemoryDatabase::new();
//! db.add_table(
//!     "users",
//!     vec![
//!         json!({"name": "Alice", "status": "active"}),
//!         json!({"name": "Bob", "status": "pending"}),
//!         json!({"name": "Carol", "status": "active"}),
//!     ],
//! )
//! .unwrap();
//! db.define_index("users", "by_status", &["status"]).unwrap();
//!
//! let engine = QueryEngine::new(db);
//! # tokio_test::block_on(async {
//! let rows = engine
//!     .execute("SELECT COUNT(*) AS n FROM users@by_status WHERE status = 'active'")
//!     .await
//!     .unwrap();
//! assert_eq!(rows[0]["n"], Value::from(2i64));
//! # });
//! ```

pub mod error;
pub mod executor;
pub mod limits;
pub mod sql;
pub mod storage;
pub mod value;

// Re-export main types for convenience
pub use error::{ErrorKind, SqlError, SqlResult};
pub use executor::{execute_select, ExecutionPlan, QueryEngine, QueryOutcome};
pub use limits::{validate, QueryLimits};
pub use sql::{parse, parse_sql, tokenize, SelectStatement, Token, TokenKind};
pub use storage::{
    DatabaseContext, FilterBuilder, FilterExpr, InMemoryDatabase, IndexRange, IndexRangeBuilder,
    QueryBuilder, SchemaInfo, StorageError, StorageResult,
};
pub use value::{Row, Value};
