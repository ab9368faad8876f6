//! Document-store capability interface.
//!
//! The engine never talks to a concrete backend. It drives these traits:
//! [`DatabaseContext`] hands out [`QueryBuilder`]s, which accept an index range
//! ([`IndexRange`]) and filters ([`FilterExpr`]). Ranges and filters are plain
//! data; a backend lowers them into its own query language by implementing
//! [`IndexRangeBuilder`] and [`FilterBuilder`] and calling
//! [`IndexRange::apply`] / [`FilterExpr::build`].

pub mod memory;
mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use memory::InMemoryDatabase;
pub use schema::{SchemaCache, SchemaInfo, TableSchema};

use crate::sql::{ComparisonOperator, SortDirection};
use crate::value::{Row, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Index '{index}' does not exist on table '{table}'")]
    IndexNotFound { table: String, index: String },

    #[error("{0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Entry point a backend exposes to the engine.
///
/// `Send + Sync` so one context can serve concurrent queries and concurrent
/// per-key join fetches.
#[async_trait]
pub trait DatabaseContext: Send + Sync {
    /// Start a query on `table`. Fails if the table is unknown.
    fn query(&self, table: &str) -> StorageResult<Box<dyn QueryBuilder>>;

    /// Tables and their index definitions.
    async fn schema(&self) -> StorageResult<SchemaInfo>;
}

#[async_trait]
impl<T: DatabaseContext + ?Sized> DatabaseContext for &T {
    fn query(&self, table: &str) -> StorageResult<Box<dyn QueryBuilder>> {
        (**self).query(table)
    }

    async fn schema(&self) -> StorageResult<SchemaInfo> {
        (**self).schema().await
    }
}

#[async_trait]
impl<T: DatabaseContext + ?Sized> DatabaseContext for Arc<T> {
    fn query(&self, table: &str) -> StorageResult<Box<dyn QueryBuilder>> {
        (**self).query(table)
    }

    async fn schema(&self) -> StorageResult<SchemaInfo> {
        (**self).schema().await
    }
}

/// One in-flight query against a single table.
#[async_trait]
pub trait QueryBuilder: Send {
    /// Narrow to an index range. Rows come back in index order.
    fn with_index(
        self: Box<Self>,
        index: &str,
        range: &IndexRange,
    ) -> StorageResult<Box<dyn QueryBuilder>>;

    /// Keep only rows matching `filter`, evaluated after the index range.
    fn filter(self: Box<Self>, filter: &FilterExpr) -> Box<dyn QueryBuilder>;

    /// Direction of the native order (index order, else creation order).
    fn order(self: Box<Self>, direction: SortDirection) -> Box<dyn QueryBuilder>;

    async fn take(self: Box<Self>, n: usize) -> StorageResult<Vec<Row>>;

    async fn collect(self: Box<Self>) -> StorageResult<Vec<Row>>;
}

/// Operators an index range can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeOp {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl RangeOp {
    /// `None` for `!=`, which no index can serve.
    pub fn from_comparison(op: ComparisonOperator) -> Option<Self> {
        match op {
            ComparisonOperator::Eq => Some(RangeOp::Eq),
            ComparisonOperator::Gt => Some(RangeOp::Gt),
            ComparisonOperator::Lt => Some(RangeOp::Lt),
            ComparisonOperator::GtEq => Some(RangeOp::Gte),
            ComparisonOperator::LtEq => Some(RangeOp::Lte),
            ComparisonOperator::NotEq => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexBound {
    pub field: String,
    pub op: RangeOp,
    pub value: Value,
}

/// Bounds over an index prefix, in index column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexRange {
    pub bounds: Vec<IndexBound>,
}

impl IndexRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            bounds: vec![IndexBound {
                field: field.into(),
                op: RangeOp::Eq,
                value,
            }],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, op: RangeOp, value: Value) {
        self.bounds.push(IndexBound {
            field: field.into(),
            op,
            value,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Replay the bounds onto a backend's range builder.
    pub fn apply<B: IndexRangeBuilder + ?Sized>(&self, builder: &mut B) {
        for bound in &self.bounds {
            match bound.op {
                RangeOp::Eq => builder.eq(&bound.field, &bound.value),
                RangeOp::Gt => builder.gt(&bound.field, &bound.value),
                RangeOp::Lt => builder.lt(&bound.field, &bound.value),
                RangeOp::Gte => builder.gte(&bound.field, &bound.value),
                RangeOp::Lte => builder.lte(&bound.field, &bound.value),
            }
        }
    }
}

pub trait IndexRangeBuilder {
    fn eq(&mut self, field: &str, value: &Value);
    fn gt(&mut self, field: &str, value: &Value);
    fn lt(&mut self, field: &str, value: &Value);
    fn gte(&mut self, field: &str, value: &Value);
    fn lte(&mut self, field: &str, value: &Value);
}

/// Filter tree handed to [`QueryBuilder::filter`]. Field names are unqualified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FilterExpr {
    Compare {
        field: String,
        operator: ComparisonOperator,
        value: Value,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    pub fn and_all<I>(exprs: I) -> Option<FilterExpr>
    where
        I: IntoIterator<Item = FilterExpr>,
    {
        exprs
            .into_iter()
            .reduce(|acc, next| FilterExpr::And(Box::new(acc), Box::new(next)))
    }

    /// Lower the tree through a backend's filter builder.
    pub fn build<B: FilterBuilder + ?Sized>(&self, builder: &mut B) -> B::Expr {
        match self {
            FilterExpr::Compare {
                field,
                operator,
                value,
            } => {
                let field = builder.field(field);
                match operator {
                    ComparisonOperator::Eq => builder.eq(field, value),
                    ComparisonOperator::NotEq => builder.neq(field, value),
                    ComparisonOperator::Gt => builder.gt(field, value),
                    ComparisonOperator::Lt => builder.lt(field, value),
                    ComparisonOperator::GtEq => builder.gte(field, value),
                    ComparisonOperator::LtEq => builder.lte(field, value),
                }
            }
            FilterExpr::And(left, right) => {
                let left = left.build(builder);
                let right = right.build(builder);
                builder.and(left, right)
            }
            FilterExpr::Or(left, right) => {
                let left = left.build(builder);
                let right = right.build(builder);
                builder.or(left, right)
            }
        }
    }
}

/// Backend-side filter construction: `field(name)` yields a field reference,
/// comparisons yield boolean expressions, `and`/`or` combine them.
pub trait FilterBuilder {
    type FieldRef;
    type Expr;

    fn field(&mut self, name: &str) -> Self::FieldRef;
    fn eq(&mut self, field: Self::FieldRef, value: &Value) -> Self::Expr;
    fn neq(&mut self, field: Self::FieldRef, value: &Value) -> Self::Expr;
    fn gt(&mut self, field: Self::FieldRef, value: &Value) -> Self::Expr;
    fn lt(&mut self, field: Self::FieldRef, value: &Value) -> Self::Expr;
    fn gte(&mut self, field: Self::FieldRef, value: &Value) -> Self::Expr;
    fn lte(&mut self, field: Self::FieldRef, value: &Value) -> Self::Expr;
    fn and(&mut self, left: Self::Expr, right: Self::Expr) -> Self::Expr;
    fn or(&mut self, left: Self::Expr, right: Self::Expr) -> Self::Expr;
}
