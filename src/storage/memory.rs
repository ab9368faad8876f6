//! In-memory document store implementing the capability interface.
//!
//! Used by the test suite and by hosts that want to run queries over a small
//! JSON dataset without a real backend. Every inserted document gets an `_id`
//! and a strictly increasing `_creationTime`; a query without an index returns
//! documents in creation order.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use super::{
    DatabaseContext, FilterBuilder, FilterExpr, IndexRange, IndexRangeBuilder, QueryBuilder,
    RangeOp, SchemaInfo, StorageError, StorageResult, TableSchema,
};
use crate::sql::{ComparisonOperator, SortDirection, CREATION_TIME_FIELD};
use crate::value::{compare_nulls_last, row_from_json, Row, Value};

pub const ID_FIELD: &str = "_id";

#[derive(Debug, Default, Clone)]
struct MemoryTable {
    rows: Arc<Vec<Row>>,
    indexes: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    tables: RwLock<HashMap<String, MemoryTable>>,
    clock: AtomicU64,
    queries_started: AtomicUsize,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table. A no-op if it already exists.
    pub fn create_table(&self, name: &str) {
        self.tables.write().entry(name.to_string()).or_default();
    }

    /// Create a table and insert `docs` in order.
    pub fn add_table(&self, name: &str, docs: Vec<serde_json::Value>) -> StorageResult<()> {
        self.create_table(name);
        for doc in docs {
            self.insert(name, doc)?;
        }
        Ok(())
    }

    /// Declare an index over `fields`, in order.
    pub fn define_index(&self, table: &str, index: &str, fields: &[&str]) -> StorageResult<()> {
        let mut tables = self.tables.write();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        entry.indexes.insert(
            index.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
        Ok(())
    }

    /// Insert one document and return its `_id`. An existing `_id` is kept.
    pub fn insert(&self, table: &str, doc: serde_json::Value) -> StorageResult<String> {
        let mut row = row_from_json(&doc);
        let tick = self.clock.fetch_add(1, AtomicOrdering::SeqCst) + 1;

        let id = match row.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            _ => format!("{}:{}", table, tick),
        };
        row.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        row.insert(CREATION_TIME_FIELD.to_string(), Value::Number(tick as f64));

        let mut tables = self.tables.write();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Arc::make_mut(&mut entry.rows).push(row);
        Ok(id)
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.read().get(table).map(|t| t.rows.len())
    }

    /// Number of [`DatabaseContext::query`] calls served so far.
    pub fn queries_started(&self) -> usize {
        self.queries_started.load(AtomicOrdering::Relaxed)
    }
}

#[async_trait]
impl DatabaseContext for InMemoryDatabase {
    fn query(&self, table: &str) -> StorageResult<Box<dyn QueryBuilder>> {
        let tables = self.tables.read();
        let entry = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        self.queries_started.fetch_add(1, AtomicOrdering::Relaxed);

        Ok(Box::new(MemoryQuery {
            table: table.to_string(),
            rows: Arc::clone(&entry.rows),
            indexes: entry.indexes.clone(),
            index: None,
            filters: Vec::new(),
            direction: SortDirection::Asc,
        }))
    }

    async fn schema(&self) -> StorageResult<SchemaInfo> {
        let tables = self.tables.read();
        Ok(SchemaInfo {
            tables: tables
                .iter()
                .map(|(name, table)| {
                    (
                        name.clone(),
                        TableSchema {
                            indexes: table.indexes.clone(),
                        },
                    )
                })
                .collect(),
        })
    }
}

type RowPredicate = Box<dyn Fn(&Row) -> bool + Send + Sync>;

struct IndexScan {
    fields: Vec<String>,
    bounds: Vec<(String, RangeOp, Value)>,
}

struct MemoryQuery {
    table: String,
    rows: Arc<Vec<Row>>,
    indexes: HashMap<String, Vec<String>>,
    index: Option<IndexScan>,
    filters: Vec<RowPredicate>,
    direction: SortDirection,
}

impl MemoryQuery {
    fn run(self, limit: Option<usize>) -> Vec<Row> {
        let mut selected: Vec<&Row> = self
            .rows
            .iter()
            .filter(|row| match &self.index {
                Some(scan) => scan
                    .bounds
                    .iter()
                    .all(|(field, op, value)| range_matches(field_of(*row, field), *op, value)),
                None => true,
            })
            .filter(|row| self.filters.iter().all(|f| f(*row)))
            .collect();

        // Rows start in creation order, so a stable sort on the index key
        // leaves ties in creation order whichever way the key runs.
        match (&self.index, self.direction) {
            (Some(scan), direction) => selected.sort_by(|a, b| {
                let key = index_key_cmp(&scan.fields, a, b);
                match direction {
                    SortDirection::Asc => key,
                    SortDirection::Desc => key.reverse(),
                }
            }),
            (None, SortDirection::Desc) => selected.reverse(),
            (None, SortDirection::Asc) => {}
        }

        let limit = limit.unwrap_or(selected.len());
        trace!(
            table = %self.table,
            matched = selected.len(),
            limit,
            "In-memory query"
        );
        selected.into_iter().take(limit).cloned().collect()
    }
}

#[async_trait]
impl QueryBuilder for MemoryQuery {
    fn with_index(
        mut self: Box<Self>,
        index: &str,
        range: &IndexRange,
    ) -> StorageResult<Box<dyn QueryBuilder>> {
        let fields = self
            .indexes
            .get(index)
            .cloned()
            .ok_or_else(|| StorageError::IndexNotFound {
                table: self.table.clone(),
                index: index.to_string(),
            })?;

        let mut collector = BoundCollector::default();
        range.apply(&mut collector);
        if let Some((field, _, _)) = collector
            .bounds
            .iter()
            .find(|(field, _, _)| !fields.contains(field))
        {
            return Err(StorageError::Backend(format!(
                "Field '{}' is not part of index '{}' on table '{}'",
                field, index, self.table
            )));
        }

        self.index = Some(IndexScan {
            fields,
            bounds: collector.bounds,
        });
        Ok(self)
    }

    fn filter(mut self: Box<Self>, filter: &FilterExpr) -> Box<dyn QueryBuilder> {
        let predicate = filter.build(&mut PredicateCompiler);
        self.filters.push(predicate);
        self
    }

    fn order(mut self: Box<Self>, direction: SortDirection) -> Box<dyn QueryBuilder> {
        self.direction = direction;
        self
    }

    async fn take(self: Box<Self>, n: usize) -> StorageResult<Vec<Row>> {
        Ok(self.run(Some(n)))
    }

    async fn collect(self: Box<Self>) -> StorageResult<Vec<Row>> {
        Ok(self.run(None))
    }
}

#[derive(Default)]
struct BoundCollector {
    bounds: Vec<(String, RangeOp, Value)>,
}

impl BoundCollector {
    fn push(&mut self, field: &str, op: RangeOp, value: &Value) {
        self.bounds.push((field.to_string(), op, value.clone()));
    }
}

impl IndexRangeBuilder for BoundCollector {
    fn eq(&mut self, field: &str, value: &Value) {
        self.push(field, RangeOp::Eq, value);
    }
    fn gt(&mut self, field: &str, value: &Value) {
        self.push(field, RangeOp::Gt, value);
    }
    fn lt(&mut self, field: &str, value: &Value) {
        self.push(field, RangeOp::Lt, value);
    }
    fn gte(&mut self, field: &str, value: &Value) {
        self.push(field, RangeOp::Gte, value);
    }
    fn lte(&mut self, field: &str, value: &Value) {
        self.push(field, RangeOp::Lte, value);
    }
}

/// Compiles a [`FilterExpr`] into a row closure.
struct PredicateCompiler;

impl PredicateCompiler {
    fn compare(field: String, op: ComparisonOperator, value: &Value) -> RowPredicate {
        let value = value.clone();
        Box::new(move |row: &Row| op.evaluate(field_of(row, &field), &value))
    }
}

impl FilterBuilder for PredicateCompiler {
    type FieldRef = String;
    type Expr = RowPredicate;

    fn field(&mut self, name: &str) -> String {
        name.to_string()
    }
    fn eq(&mut self, field: String, value: &Value) -> RowPredicate {
        Self::compare(field, ComparisonOperator::Eq, value)
    }
    fn neq(&mut self, field: String, value: &Value) -> RowPredicate {
        Self::compare(field, ComparisonOperator::NotEq, value)
    }
    fn gt(&mut self, field: String, value: &Value) -> RowPredicate {
        Self::compare(field, ComparisonOperator::Gt, value)
    }
    fn lt(&mut self, field: String, value: &Value) -> RowPredicate {
        Self::compare(field, ComparisonOperator::Lt, value)
    }
    fn gte(&mut self, field: String, value: &Value) -> RowPredicate {
        Self::compare(field, ComparisonOperator::GtEq, value)
    }
    fn lte(&mut self, field: String, value: &Value) -> RowPredicate {
        Self::compare(field, ComparisonOperator::LtEq, value)
    }
    fn and(&mut self, left: RowPredicate, right: RowPredicate) -> RowPredicate {
        Box::new(move |row: &Row| left(row) && right(row))
    }
    fn or(&mut self, left: RowPredicate, right: RowPredicate) -> RowPredicate {
        Box::new(move |row: &Row| left(row) || right(row))
    }
}

static NULL: Value = Value::Null;

#[inline]
fn field_of<'a>(row: &'a Row, field: &str) -> &'a Value {
    row.get(field).unwrap_or(&NULL)
}

fn range_matches(actual: &Value, op: RangeOp, bound: &Value) -> bool {
    let op = match op {
        RangeOp::Eq => ComparisonOperator::Eq,
        RangeOp::Gt => ComparisonOperator::Gt,
        RangeOp::Lt => ComparisonOperator::Lt,
        RangeOp::Gte => ComparisonOperator::GtEq,
        RangeOp::Lte => ComparisonOperator::LtEq,
    };
    op.evaluate(actual, bound)
}

/// Index key order: field by field under the engine's collation, null last.
fn index_key_cmp(fields: &[String], a: &Row, b: &Row) -> Ordering {
    fields
        .iter()
        .map(|f| compare_nulls_last(field_of(a, f), field_of(b, f)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}
