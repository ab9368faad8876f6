//! Aggregate and scalar functions over row groups.

use std::cmp::Ordering;

use crate::error::{SqlError, SqlResult};
use crate::sql::{ColumnExpression, FunctionCall};
use crate::value::{resolve_field, Row, Value};

use super::sort::compare_values;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Abs,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "COUNT" => Some(Function::Count),
            "SUM" => Some(Function::Sum),
            "AVG" => Some(Function::Avg),
            "MIN" => Some(Function::Min),
            "MAX" => Some(Function::Max),
            "ABS" => Some(Function::Abs),
            _ => None,
        }
    }

    /// Row-scoped functions read one row rather than the whole group.
    pub fn is_row_scoped(&self) -> bool {
        matches!(self, Function::Abs)
    }
}

/// Argument a resolved function reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument<'a> {
    AllRows,
    Column { table: Option<&'a str>, name: &'a str },
}

/// Check name and arguments of a call, returning the resolved function.
pub fn resolve(call: &FunctionCall) -> SqlResult<(Function, Argument<'_>)> {
    let function =
        Function::lookup(&call.name).ok_or_else(|| SqlError::UnknownFunction(call.name.clone()))?;

    if call.args.len() != 1 {
        return Err(SqlError::ArityMismatch {
            name: call.name.clone(),
            expected: "1 argument".to_string(),
            found: call.args.len(),
        });
    }

    let argument = match (&call.args[0], function) {
        (ColumnExpression::Star, Function::Count) => Argument::AllRows,
        (ColumnExpression::Column { table, name, .. }, _) => Argument::Column {
            table: table.as_deref(),
            name,
        },
        (other, _) => {
            return Err(SqlError::semantic(format!(
                "Function {} does not accept argument '{}'",
                call.name,
                other.render()
            )))
        }
    };

    Ok((function, argument))
}

/// Compute `call` over `rows`.
pub fn compute(call: &FunctionCall, rows: &[Row], default_table: &str) -> SqlResult<Value> {
    let (function, argument) = resolve(call)?;

    let column = |row: &Row| -> Value {
        match &argument {
            Argument::AllRows => Value::Null,
            Argument::Column { table, name } => resolve_field(row, *table, name, default_table)
                .cloned()
                .unwrap_or(Value::Null),
        }
    };

    let value = match function {
        Function::Count => match &argument {
            Argument::AllRows => Value::from(rows.len()),
            Argument::Column { .. } => {
                Value::from(rows.iter().filter(|&r| !column(r).is_null()).count())
            }
        },
        Function::Sum => Value::Number(
            rows.iter()
                .filter_map(|r| column(r).as_f64())
                .sum::<f64>(),
        ),
        Function::Avg => {
            let numbers: Vec<f64> = rows.iter().filter_map(|r| column(r).as_f64()).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Function::Min => extremum(rows.iter().map(column), Ordering::Less),
        Function::Max => extremum(rows.iter().map(column), Ordering::Greater),
        Function::Abs => match rows.first() {
            Some(row) => column(row)
                .as_f64()
                .map(|n| Value::Number(n.abs()))
                .unwrap_or(Value::Null),
            None => {
                return Err(SqlError::semantic(format!(
                    "{} requires a current row",
                    call.signature()
                )))
            }
        },
    };

    Ok(value)
}

fn extremum<I>(values: I, wanted: Ordering) -> Value
where
    I: Iterator<Item = Value>,
{
    values
        .filter(|v| !v.is_null())
        .reduce(|best, v| {
            if compare_values(&v, &best) == wanted {
                v
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}
