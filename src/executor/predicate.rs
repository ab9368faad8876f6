//! WHERE/HAVING evaluation and lowering.

use std::collections::BTreeSet;

use crate::sql::WhereClause;
use crate::storage::FilterExpr;
use crate::value::{resolve_field, Row, Value};

/// Evaluate a predicate against a row. Missing fields read as null.
pub fn evaluate(clause: &WhereClause, row: &Row, default_table: &str) -> bool {
    match clause {
        WhereClause::And(left, right) => {
            evaluate(left, row, default_table) && evaluate(right, row, default_table)
        }
        WhereClause::Or(left, right) => {
            evaluate(left, row, default_table) || evaluate(right, row, default_table)
        }
        WhereClause::Comparison(cmp) => {
            let actual = resolve_field(row, cmp.table.as_deref(), &cmp.field, default_table)
                .unwrap_or(&Value::Null);
            cmp.operator.evaluate(actual, &cmp.value)
        }
    }
}

/// Lower a predicate to a store filter. Qualifiers are dropped; callers only
/// lower conditions that belong to the table being queried.
pub fn to_filter(clause: &WhereClause) -> FilterExpr {
    match clause {
        WhereClause::And(left, right) => {
            FilterExpr::And(Box::new(to_filter(left)), Box::new(to_filter(right)))
        }
        WhereClause::Or(left, right) => {
            FilterExpr::Or(Box::new(to_filter(left)), Box::new(to_filter(right)))
        }
        WhereClause::Comparison(cmp) => FilterExpr::Compare {
            field: cmp.field.clone(),
            operator: cmp.operator,
            value: cmp.value.clone(),
        },
    }
}

pub fn to_filter_all<'a, I>(clauses: I) -> Option<FilterExpr>
where
    I: IntoIterator<Item = &'a WhereClause>,
{
    FilterExpr::and_all(clauses.into_iter().map(to_filter))
}

/// Tables a predicate reads. Unqualified fields belong to `default_table`.
pub fn referenced_tables<'a>(clause: &'a WhereClause, default_table: &'a str) -> BTreeSet<&'a str> {
    clause
        .comparisons()
        .into_iter()
        .map(|c| c.table.as_deref().unwrap_or(default_table))
        .collect()
}
