//! Statement checks that need no data, and output-row projection.

use std::collections::HashSet;

use crate::error::{SqlError, SqlResult};
use crate::sql::{ColumnExpression, FunctionCall, SelectStatement, WhereClause};
use crate::value::{resolve_field, Row, Value};

use super::aggregate::{self, Function};

/// Reject statements whose shape cannot be executed.
pub fn check_select(stmt: &SelectStatement) -> SqlResult<()> {
    check_tables(stmt)?;

    if let Some(clause) = &stmt.where_clause {
        if clause.contains_function() {
            return Err(SqlError::semantic(
                "Aggregate functions are not allowed in WHERE; use HAVING",
            ));
        }
    }

    for call in select_functions(stmt) {
        aggregate::resolve(call)?;
    }
    for call in having_functions(stmt) {
        aggregate::resolve(call)?;
    }

    if stmt.is_grouped() {
        check_grouped_columns(stmt)?;
    } else if stmt.is_aggregate_only() {
        for call in select_functions(stmt).chain(having_functions(stmt)) {
            if let Some(f) = Function::lookup(&call.name) {
                if f.is_row_scoped() {
                    return Err(SqlError::semantic(format!(
                        "{} needs a current row and cannot be used in an aggregate-only query",
                        call.signature()
                    )));
                }
            }
        }
    } else {
        if stmt.columns.iter().any(ColumnExpression::is_function) {
            return Err(SqlError::semantic(
                "Cannot mix aggregate functions and plain columns without GROUP BY",
            ));
        }
        if stmt.having.is_some() {
            return Err(SqlError::semantic("HAVING requires GROUP BY or an aggregate"));
        }
    }

    Ok(())
}

fn check_tables(stmt: &SelectStatement) -> SqlResult<()> {
    let mut seen = HashSet::new();
    for table in stmt.tables() {
        if !seen.insert(table) {
            return Err(SqlError::semantic(format!(
                "Table '{}' appears more than once",
                table
            )));
        }
    }

    let known = |table: &str| ensure_known(&seen, table);

    for column in &stmt.columns {
        match column {
            ColumnExpression::TableStar(table) => known(table.as_str())?,
            ColumnExpression::Column {
                table: Some(table), ..
            } => known(table.as_str())?,
            _ => {}
        }
    }
    for join in &stmt.joins {
        for cond in &join.conditions {
            known(cond.left_table.as_str())?;
            known(cond.right_table.as_str())?;
        }
    }
    for clause in stmt.where_clause.iter().chain(stmt.having.iter()) {
        for cmp in clause.comparisons() {
            if let Some(table) = cmp.table.as_deref() {
                known(table)?;
            }
        }
    }
    for table in stmt
        .group_by
        .iter()
        .filter_map(|g| g.table.as_deref())
        .chain(stmt.order_by.iter().filter_map(|o| o.table.as_deref()))
    {
        known(table)?;
    }
    Ok(())
}

fn ensure_known(tables: &HashSet<&str>, table: &str) -> SqlResult<()> {
    if tables.contains(table) {
        Ok(())
    } else {
        Err(SqlError::semantic(format!(
            "Unknown table '{}' referenced in query",
            table
        )))
    }
}

fn check_grouped_columns(stmt: &SelectStatement) -> SqlResult<()> {
    for column in &stmt.columns {
        match column {
            ColumnExpression::Star | ColumnExpression::TableStar(_) => {
                return Err(SqlError::semantic("Cannot use * with GROUP BY"));
            }
            ColumnExpression::Column { table, name, .. } => {
                let grouped = stmt.group_by.iter().any(|g| {
                    g.field == *name
                        && match (&g.table, table) {
                            (Some(a), Some(b)) => a == b,
                            _ => true,
                        }
                });
                if !grouped {
                    return Err(SqlError::NotGrouped(name.clone()));
                }
            }
            ColumnExpression::Function(_) => {}
        }
    }
    Ok(())
}

pub fn select_functions(stmt: &SelectStatement) -> impl Iterator<Item = &FunctionCall> {
    stmt.columns.iter().filter_map(|c| match c {
        ColumnExpression::Function(call) => Some(call),
        _ => None,
    })
}

pub fn having_functions(stmt: &SelectStatement) -> impl Iterator<Item = &FunctionCall> {
    stmt.having
        .iter()
        .flat_map(WhereClause::comparisons)
        .filter_map(|c| c.function.as_ref())
}

/// Project a plain (ungrouped) row onto the select list.
pub fn project_row(row: &Row, columns: &[ColumnExpression], default_table: &str) -> Row {
    let mut out = Row::new();

    for column in columns {
        match column {
            ColumnExpression::Star => {
                out.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            ColumnExpression::TableStar(table) => {
                let prefix = format!("{}.", table);
                let prefixed: Vec<_> = row
                    .iter()
                    .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|f| (f.to_string(), v.clone())))
                    .collect();
                if prefixed.is_empty() && table == default_table {
                    // Unjoined rows carry bare field names.
                    out.extend(
                        row.iter()
                            .filter(|(k, _)| !k.contains('.'))
                            .map(|(k, v)| (k.clone(), v.clone())),
                    );
                } else {
                    out.extend(prefixed);
                }
            }
            ColumnExpression::Column { table, name, .. } => {
                let value = resolve_field(row, table.as_deref(), name, default_table)
                    .cloned()
                    .unwrap_or(Value::Null);
                if let Some(key) = column.output_name() {
                    out.insert(key, value);
                }
            }
            ColumnExpression::Function(_) => {}
        }
    }

    out
}

/// Keep only the select list's output names from a computed group row.
pub fn project_group_row(row: &Row, columns: &[ColumnExpression]) -> Row {
    columns
        .iter()
        .filter_map(ColumnExpression::output_name)
        .map(|name| {
            let value = row.get(&name).cloned().unwrap_or(Value::Null);
            (name, value)
        })
        .collect()
}
