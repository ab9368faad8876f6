//! In-memory ordering.

use std::cmp::Ordering;

use crate::sql::{OrderByClause, SortDirection};
use crate::value::{compare_nulls_last as compare_keys, resolve_field, Row, Value};

pub use crate::value::compare_values;

/// Stable multi-key sort. Nulls land last ascending and first descending.
pub fn sort_rows(rows: &mut [Row], order_by: &[OrderByClause], default_table: &str) {
    if order_by.is_empty() {
        return;
    }

    rows.sort_by(|a, b| {
        for clause in order_by {
            let left = resolve_field(a, clause.table.as_deref(), &clause.field, default_table)
                .unwrap_or(&Value::Null);
            let right = resolve_field(b, clause.table.as_deref(), &clause.field, default_table)
                .unwrap_or(&Value::Null);

            let ordering = match clause.direction {
                SortDirection::Asc => compare_keys(left, right),
                SortDirection::Desc => compare_keys(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[Value]) -> Vec<Row> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut row = Row::new();
                row.insert("k".to_string(), v.clone());
                row.insert("pos".to_string(), Value::from(i));
                row
            })
            .collect()
    }

    fn order(direction: SortDirection) -> Vec<OrderByClause> {
        vec![OrderByClause {
            table: None,
            field: "k".to_string(),
            direction,
        }]
    }

    fn keys(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r["k"].to_string()).collect()
    }

    #[test]
    fn test_nulls_last_ascending_first_descending() {
        let mut data = rows(&[Value::from(2i64), Value::Null, Value::from(1i64)]);
        sort_rows(&mut data, &order(SortDirection::Asc), "t");
        assert_eq!(keys(&data), vec!["1", "2", "null"]);

        sort_rows(&mut data, &order(SortDirection::Desc), "t");
        assert_eq!(keys(&data), vec!["null", "2", "1"]);
    }

    #[test]
    fn test_string_collation() {
        let mut data = rows(&[
            Value::from("banana"),
            Value::from("Apple"),
            Value::from("apple"),
            Value::from("cherry"),
        ]);
        sort_rows(&mut data, &order(SortDirection::Asc), "t");
        assert_eq!(keys(&data), vec!["apple", "Apple", "banana", "cherry"]);
    }

    #[test]
    fn test_stable_on_ties() {
        let mut data = rows(&[Value::from(1i64), Value::from(1i64), Value::from(0i64)]);
        sort_rows(&mut data, &order(SortDirection::Asc), "t");
        let positions: Vec<String> = data.iter().map(|r| r["pos"].to_string()).collect();
        assert_eq!(positions, vec!["2", "0", "1"]);
    }

    #[test]
    fn test_mixed_types_compare_by_display() {
        assert_eq!(
            compare_values(&Value::from(10i64), &Value::from("9")),
            Ordering::Less
        );
        assert_eq!(compare_values(&Value::from(10i64), &Value::from(9i64)), Ordering::Greater);
    }
}
