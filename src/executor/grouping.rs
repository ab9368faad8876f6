//! GROUP BY and aggregate-only pipelines.

use std::collections::HashMap;

use tracing::debug;

use crate::error::SqlResult;
use crate::sql::{ColumnExpression, SelectStatement};
use crate::value::{resolve_field, Row, Value};

use super::aggregate;
use super::predicate::evaluate;
use super::projection::{having_functions, project_group_row};
use super::sort::sort_rows;

/// Group rows, compute aggregates, then HAVING, ORDER BY and LIMIT over groups.
pub fn group_rows(stmt: &SelectStatement, rows: Vec<Row>) -> SqlResult<Vec<Row>> {
    let mut groups: Vec<Vec<Row>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let key = group_key(stmt, &row);
        match positions.get(&key) {
            Some(&pos) => groups[pos].push(row),
            None => {
                positions.insert(key, groups.len());
                groups.push(vec![row]);
            }
        }
    }
    debug!(table = %stmt.from, groups = groups.len(), "Grouped rows");

    let computed = groups
        .iter()
        .map(|members| group_row(stmt, members))
        .collect::<SqlResult<Vec<_>>>()?;

    Ok(finish(stmt, computed))
}

/// Collapse every row into one computed row.
pub fn aggregate_all(stmt: &SelectStatement, rows: Vec<Row>) -> SqlResult<Vec<Row>> {
    debug!(table = %stmt.from, rows = rows.len(), "Aggregating");
    let row = group_row(stmt, &rows)?;
    Ok(finish(stmt, vec![row]))
}

fn finish(stmt: &SelectStatement, mut rows: Vec<Row>) -> Vec<Row> {
    if let Some(having) = &stmt.having {
        rows.retain(|row| evaluate(having, row, &stmt.from));
    }
    sort_rows(&mut rows, &stmt.order_by, &stmt.from);
    if let Some(limit) = stmt.limit {
        rows.truncate(limit);
    }
    rows.iter()
        .map(|row| project_group_row(row, &stmt.columns))
        .collect()
}

/// Each GROUP BY value's JSON form, joined with `|`.
fn group_key(stmt: &SelectStatement, row: &Row) -> String {
    stmt.group_by
        .iter()
        .map(|g| {
            resolve_field(row, g.table.as_deref(), &g.field, &stmt.from)
                .unwrap_or(&Value::Null)
                .group_key()
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// The row HAVING and ORDER BY see for one group.
///
/// Written in order: GROUP BY values under their field names, HAVING-only
/// aggregates under their signatures, then each selected column. A function
/// is stored under its signature and, when aliased, under the alias too. Later
/// writes replace earlier ones on a name collision.
fn group_row(stmt: &SelectStatement, members: &[Row]) -> SqlResult<Row> {
    let mut out = Row::new();
    let first = members.first();
    let read = |table: Option<&str>, field: &str| -> Value {
        first
            .and_then(|row| resolve_field(row, table, field, &stmt.from))
            .cloned()
            .unwrap_or(Value::Null)
    };

    for g in &stmt.group_by {
        out.insert(g.field.clone(), read(g.table.as_deref(), &g.field));
    }

    for call in having_functions(stmt) {
        out.insert(
            call.signature(),
            aggregate::compute(call, members, &stmt.from)?,
        );
    }

    for column in &stmt.columns {
        match column {
            ColumnExpression::Column { table, name, alias } => {
                let key = alias.clone().unwrap_or_else(|| name.clone());
                out.insert(key, read(table.as_deref(), name));
            }
            ColumnExpression::Function(call) => {
                let value = aggregate::compute(call, members, &stmt.from)?;
                if let Some(alias) = &call.alias {
                    out.insert(alias.clone(), value.clone());
                }
                out.insert(call.signature(), value);
            }
            ColumnExpression::Star | ColumnExpression::TableStar(_) => {}
        }
    }

    Ok(out)
}
