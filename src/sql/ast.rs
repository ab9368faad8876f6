//! SQL abstract syntax tree.
//!
//! Nodes are produced once per parse and treated as immutable afterwards. The
//! only field ever written after parsing is [`SelectStatement::limit`], which
//! the limits validator may fill with a default.

use serde::Serialize;

use crate::value::{values_equal, Value};

/// Name under which the store exposes document creation order.
pub const CREATION_TIME_FIELD: &str = "_creationTime";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectStatement {
    pub columns: Vec<ColumnExpression>,
    pub from: String,
    pub index_hint: Option<String>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<WhereClause>,
    pub group_by: Vec<GroupByClause>,
    pub having: Option<WhereClause>,
    pub order_by: Vec<OrderByClause>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    /// No GROUP BY and every selected column is a function call.
    pub fn is_aggregate_only(&self) -> bool {
        self.group_by.is_empty()
            && !self.columns.is_empty()
            && self.columns.iter().all(ColumnExpression::is_function)
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// Every table the statement reads, FROM first.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.from.as_str()).chain(self.joins.iter().map(|j| j.table.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ColumnExpression {
    Star,
    TableStar(String),
    Column {
        table: Option<String>,
        name: String,
        alias: Option<String>,
    },
    Function(FunctionCall),
}

impl ColumnExpression {
    pub fn is_function(&self) -> bool {
        matches!(self, ColumnExpression::Function(_))
    }

    /// Key the column takes in an output row. `None` for star forms.
    pub fn output_name(&self) -> Option<String> {
        match self {
            ColumnExpression::Star | ColumnExpression::TableStar(_) => None,
            ColumnExpression::Column { name, alias, .. } => {
                Some(alias.clone().unwrap_or_else(|| name.clone()))
            }
            ColumnExpression::Function(call) => Some(call.output_name()),
        }
    }

    /// Source-like rendering used inside function signatures.
    pub fn render(&self) -> String {
        match self {
            ColumnExpression::Star => "*".to_string(),
            ColumnExpression::TableStar(table) => format!("{}.*", table),
            ColumnExpression::Column {
                table: Some(table),
                name,
                ..
            } => format!("{}.{}", table, name),
            ColumnExpression::Column { name, .. } => name.clone(),
            ColumnExpression::Function(call) => call.signature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    /// Upper-cased function name
    pub name: String,
    pub args: Vec<ColumnExpression>,
    pub alias: Option<String>,
}

impl FunctionCall {
    /// Rendered call, e.g. `COUNT(*)` or `SUM(posts.views)`. This is the key an
    /// aggregate is stored under and what HAVING resolves against.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, format_function_args(&self.args))
    }

    pub fn output_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.signature())
    }
}

/// Render a function's argument list the way it appears inside a signature.
pub fn format_function_args(args: &[ColumnExpression]) -> String {
    args.iter()
        .map(ColumnExpression::render)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

impl ComparisonOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(ComparisonOperator::Eq),
            "!=" => Some(ComparisonOperator::NotEq),
            ">" => Some(ComparisonOperator::Gt),
            "<" => Some(ComparisonOperator::Lt),
            ">=" => Some(ComparisonOperator::GtEq),
            "<=" => Some(ComparisonOperator::LtEq),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::GtEq => ">=",
            ComparisonOperator::LtEq => "<=",
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::Gt
                | ComparisonOperator::Lt
                | ComparisonOperator::GtEq
                | ComparisonOperator::LtEq
        )
    }

    /// `left <op> right`. Equality is structural (null equals null); range
    /// operators are false unless both sides have the same non-null type.
    pub fn evaluate(&self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering::*;
        match self {
            ComparisonOperator::Eq => values_equal(left, right),
            ComparisonOperator::NotEq => !values_equal(left, right),
            ComparisonOperator::Gt => matches!(left.compare(right), Some(Greater)),
            ComparisonOperator::Lt => matches!(left.compare(right), Some(Less)),
            ComparisonOperator::GtEq => matches!(left.compare(right), Some(Greater | Equal)),
            ComparisonOperator::LtEq => matches!(left.compare(right), Some(Less | Equal)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub table: Option<String>,
    /// Field name, or the rendered signature when `function` is set
    pub field: String,
    pub operator: ComparisonOperator,
    pub value: Value,
    /// Parsed call when the field position held one (HAVING COUNT(*) > 1)
    pub function: Option<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WhereClause {
    And(Box<WhereClause>, Box<WhereClause>),
    Or(Box<WhereClause>, Box<WhereClause>),
    Comparison(Comparison),
}

impl WhereClause {
    /// Top-level AND operands, left to right. An OR node is one conjunct.
    pub fn conjuncts(&self) -> Vec<&WhereClause> {
        match self {
            WhereClause::And(left, right) => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// Rebuild a left-deep AND from conjuncts.
    pub fn and_all<I>(clauses: I) -> Option<WhereClause>
    where
        I: IntoIterator<Item = WhereClause>,
    {
        clauses
            .into_iter()
            .reduce(|acc, next| WhereClause::And(Box::new(acc), Box::new(next)))
    }

    pub fn comparisons(&self) -> Vec<&Comparison> {
        match self {
            WhereClause::And(left, right) | WhereClause::Or(left, right) => {
                let mut out = left.comparisons();
                out.extend(right.comparisons());
                out
            }
            WhereClause::Comparison(c) => vec![c],
        }
    }

    pub fn contains_function(&self) -> bool {
        self.comparisons().iter().any(|c| c.function.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinCondition {
    pub left_table: String,
    pub left_field: String,
    pub right_table: String,
    pub right_field: String,
}

impl JoinCondition {
    /// Same equality with its sides exchanged.
    pub fn flipped(&self) -> JoinCondition {
        JoinCondition {
            left_table: self.right_table.clone(),
            left_field: self.right_field.clone(),
            right_table: self.left_table.clone(),
            right_field: self.left_field.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinClause {
    pub table: String,
    pub index_hint: Option<String>,
    pub conditions: Vec<JoinCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderByClause {
    pub table: Option<String>,
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupByClause {
    pub table: Option<String>,
    pub field: String,
}
