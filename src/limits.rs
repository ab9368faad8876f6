//! Query limits and the validator that enforces them.
//!
//! Limits keep a caller from scanning a whole table by accident while still
//! letting aggregate queries see every row: an aggregate is only correct over
//! the full input, and its LIMIT bounds the result rows, not the rows scanned.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SqlError, SqlResult};
use crate::sql::SelectStatement;

/// Configuration for query execution limits.
///
/// A pure configuration value: execution never mutates it, so one instance can
/// be shared by every query on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    /// Hard cap on returned rows, and the LIMIT assigned when none is given
    pub max_rows: usize,
    /// Largest LIMIT a query may ask for
    pub max_limit: usize,
    /// Reject plain queries without a LIMIT
    pub require_limit: bool,
    /// Tables exempt from `require_limit`
    pub exempt_tables: Vec<String>,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_rows: 1_000,
            max_limit: 10_000,
            require_limit: false,
            exempt_tables: Vec::new(),
        }
    }
}

impl QueryLimits {
    /// Limits for shared/production hosts: LIMIT is mandatory.
    pub fn strict() -> Self {
        Self {
            max_rows: 500,
            max_limit: 1_000,
            require_limit: true,
            exempt_tables: Vec::new(),
        }
    }

    /// Limits for local tooling over small datasets.
    pub fn permissive() -> Self {
        Self {
            max_rows: 100_000,
            max_limit: 100_000,
            require_limit: false,
            exempt_tables: Vec::new(),
        }
    }

    pub fn with_exempt_table(mut self, table: impl Into<String>) -> Self {
        self.exempt_tables.push(table.into());
        self
    }

    pub fn is_exempt(&self, table: &str) -> bool {
        self.exempt_tables.iter().any(|t| t == table)
    }

    /// Parse limits from a TOML document. Missing keys take their defaults.
    ///
    /// ```toml
    /// max_rows = 200
    /// require_limit = true
    /// exempt_tables = ["settings"]
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

/// Check a statement against `limits`.
///
/// May assign `statement.limit` once (the `max_rows` default); that is the only
/// write the validator ever makes to the AST.
pub fn validate(statement: &mut SelectStatement, limits: &QueryLimits) -> SqlResult<()> {
    let grouped = statement.is_grouped();
    let aggregate_only = statement.is_aggregate_only();
    let unbounded_scan = !grouped && !aggregate_only;

    if limits.require_limit
        && statement.limit.is_none()
        && unbounded_scan
        && !limits.is_exempt(&statement.from)
    {
        return Err(SqlError::LimitRequired {
            table: statement.from.clone(),
            max_limit: limits.max_limit,
        });
    }

    if let Some(limit) = statement.limit {
        if limit > limits.max_limit {
            return Err(SqlError::LimitExceeded {
                limit,
                max_limit: limits.max_limit,
            });
        }
    }

    if statement.limit.is_none() && unbounded_scan {
        debug!(
            table = %statement.from,
            limit = limits.max_rows,
            "No LIMIT given, applying default"
        );
        statement.limit = Some(limits.max_rows);
    }

    Ok(())
}
