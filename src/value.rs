//! Scalar values and rows.
//!
//! Predicates only ever compare against strings, numbers, booleans or null, so
//! [`Value`] is a closed tagged enum rather than an arbitrary JSON tree. Rows
//! coming out of a document store are flattened into it with
//! [`row_from_json`]; nested documents become their JSON text.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// One logical record: field name (or `table.field` after a join) to value.
/// A missing key reads as [`Value::Null`].
pub type Row = HashMap<String, Value>;

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
        }
    }

    /// Ordering between two values of the same type; `None` across types or
    /// when either side is null. Used by predicate evaluation, where a range
    /// comparison between incomparable values is simply false.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Structural key: two values produce the same key iff they are equal.
    pub fn group_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        }
    }
}

/// Compare two values for equality. Null equals null.
#[inline]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    left == right
}

/// Ordering between two non-null values.
///
/// Strings compare case-insensitively first with lowercase ahead of uppercase
/// on ties, which approximates a locale collation. Numbers compare
/// numerically. Any other pairing falls back to the display form.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| y.cmp(x)),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// [`compare_values`] extended to null, which sorts after everything.
///
/// Both the in-memory sort and the reference store's index order use this, so
/// a native ordering and an in-memory one agree.
pub fn compare_nulls_last(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_values(a, b),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) if is_integral(*n) => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

#[inline]
fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Number(n) if is_integral(*n) => serializer.serialize_i64(*n as i64),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Flatten a JSON document into a row. Non-object input yields an empty row.
pub fn row_from_json(doc: &serde_json::Value) -> Row {
    match doc {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect(),
        _ => Row::new(),
    }
}

pub fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

/// Read a field from a row that may or may not carry table prefixes.
///
/// Lookup order: `table.field` when qualified, then the bare `field`, then
/// `default_table.field` for an unqualified name on a joined row.
pub fn resolve_field<'a>(
    row: &'a Row,
    table: Option<&str>,
    field: &str,
    default_table: &str,
) -> Option<&'a Value> {
    if let Some(table) = table {
        if let Some(v) = row.get(&qualify(table, field)) {
            return Some(v);
        }
    }
    if let Some(v) = row.get(field) {
        return Some(v);
    }
    match table {
        None => row.get(&qualify(default_table, field)),
        Some(_) => None,
    }
}

#[inline]
pub fn qualify(table: &str, field: &str) -> String {
    format!("{}.{}", table, field)
}
