use serde::Serialize;

use crate::error::SqlResult;
use crate::sql::{JoinCondition, SortDirection, WhereClause};
use crate::storage::{FilterExpr, IndexRange};
use crate::value::Row;

/// How one table is read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "access_type", rename_all = "snake_case")]
pub enum AccessPath {
    FullScan {
        filter: Option<FilterExpr>,
    },
    Index {
        index: String,
        /// Leading index fields, in order
        fields: Vec<String>,
        range: IndexRange,
        /// Conditions the range does not cover
        residual: Option<FilterExpr>,
    },
}

impl AccessPath {
    pub fn index_name(&self) -> Option<&str> {
        match self {
            AccessPath::Index { index, .. } => Some(index),
            AccessPath::FullScan { .. } => None,
        }
    }

    pub fn first_index_field(&self) -> Option<&str> {
        match self {
            AccessPath::Index { fields, .. } => fields.first().map(String::as_str),
            AccessPath::FullScan { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStrategy {
    /// No ORDER BY
    Unordered,
    /// The store returns rows already ordered; LIMIT is pushed into `take`.
    Native(SortDirection),
    /// Rows are collected and sorted by the engine.
    InMemory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JoinStrategy {
    /// One index-scoped fetch per distinct left join value, issued concurrently.
    IndexedLookup { index: String },
    /// Hash the right rows on the join field and probe per left row.
    HashProbe,
    /// No condition names the join target; every pair is checked.
    NestedLoop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinPlan {
    pub table: String,
    /// Retrieval of the right table; also the fallback for an indexed lookup
    pub access: AccessPath,
    /// WHERE conditions on this table alone, applied while reading it
    pub pushdown: Option<FilterExpr>,
    pub strategy: JoinStrategy,
    /// Conditions normalized so the target table is on the right when it is named
    pub conditions: Vec<JoinCondition>,
}

impl JoinPlan {
    /// Condition used to key the hash map, if any names the target.
    pub fn probe_condition(&self) -> Option<&JoinCondition> {
        self.conditions
            .iter()
            .find(|c| c.right_table == self.table && c.left_table != self.table)
    }
}

/// What the engine will do for a statement, computed without reading rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub table: String,
    pub access: AccessPath,
    pub order: OrderStrategy,
    pub joins: Vec<JoinPlan>,
    /// Conditions evaluated on merged rows after every join
    pub post_join_filter: Option<WhereClause>,
    pub limit: Option<usize>,
}

/// Query result as data, for hosts that report failures instead of raising them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryOutcome {
    Ok { rows: Vec<Row> },
    Error { kind: String, message: String },
}

impl QueryOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryOutcome::Ok { .. })
    }
}

impl From<SqlResult<Vec<Row>>> for QueryOutcome {
    fn from(result: SqlResult<Vec<Row>>) -> Self {
        match result {
            Ok(rows) => QueryOutcome::Ok { rows },
            Err(err) => QueryOutcome::Error {
                kind: err.kind().as_str().to_string(),
                message: err.to_string(),
            },
        }
    }
}
