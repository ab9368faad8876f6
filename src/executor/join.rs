//! Inner join execution.
//!
//! Rows entering a join carry `table.field` keys. Merging never re-prefixes:
//! the left row keeps its keys and the right row's keys are added.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::SqlResult;
use crate::sql::JoinCondition;
use crate::storage::{DatabaseContext, IndexRange, StorageResult};
use crate::value::{qualify, Row, Value};

use super::types::{JoinPlan, JoinStrategy};
use super::QueryEngine;

/// Right rows grouped by the structural key of their join value.
type Buckets = HashMap<String, Vec<Row>>;

impl<D: DatabaseContext> QueryEngine<D> {
    pub(super) async fn execute_join(&self, left: Vec<Row>, join: &JoinPlan) -> SqlResult<Vec<Row>> {
        if let (JoinStrategy::IndexedLookup { index }, Some(cond)) =
            (&join.strategy, join.probe_condition())
        {
            match self.lookup_by_key(&left, join, cond, index).await {
                Ok(buckets) => {
                    let joined = probe(left, cond, &join.conditions, &buckets);
                    debug!(table = %join.table, rows = joined.len(), "Indexed join");
                    return Ok(joined);
                }
                Err(err) => {
                    warn!(
                        table = %join.table,
                        index = %index,
                        error = %err,
                        "Indexed join lookup failed, falling back to hash join"
                    );
                }
            }
        }

        let right: Vec<Row> = self
            .fetch(&join.table, &join.access, None, None)
            .await?
            .into_iter()
            .map(|row| prefix_row(row, &join.table))
            .collect();

        let joined = match join.probe_condition() {
            Some(cond) => {
                let buckets = bucket_rows(right, cond);
                probe(left, cond, &join.conditions, &buckets)
            }
            None => nested_loop(left, &right, &join.conditions),
        };
        debug!(table = %join.table, rows = joined.len(), "Joined");
        Ok(joined)
    }

    /// One index-scoped fetch per distinct left join value, all in flight at
    /// once. Results are bucketed by the value each right row actually holds,
    /// so completion order does not matter.
    async fn lookup_by_key(
        &self,
        left: &[Row],
        join: &JoinPlan,
        cond: &JoinCondition,
        index: &str,
    ) -> SqlResult<Buckets> {
        let left_key = qualify(&cond.left_table, &cond.left_field);
        let mut seen = HashSet::new();
        let keys: Vec<&Value> = left
            .iter()
            .filter_map(|row| row.get(&left_key))
            .filter(|v| !v.is_null() && seen.insert(v.group_key()))
            .collect();
        debug!(table = %join.table, keys = keys.len(), "Indexed join lookups");

        let fetches = keys
            .into_iter()
            .map(|key| self.fetch_key(join, cond, index, key.clone()));

        let mut rows = Vec::new();
        for result in join_all(fetches).await {
            rows.extend(result?);
        }

        let prefixed = rows
            .into_iter()
            .map(|row| prefix_row(row, &join.table))
            .collect();
        Ok(bucket_rows(prefixed, cond))
    }

    async fn fetch_key(
        &self,
        join: &JoinPlan,
        cond: &JoinCondition,
        index: &str,
        key: Value,
    ) -> StorageResult<Vec<Row>> {
        let range = IndexRange::eq(cond.right_field.clone(), key);
        let mut query = self.db.query(&join.table)?.with_index(index, &range)?;
        if let Some(filter) = &join.pushdown {
            query = query.filter(filter);
        }
        query.collect().await
    }
}

/// Rename every key to `table.key`.
pub(super) fn prefix_row(row: Row, table: &str) -> Row {
    row.into_iter()
        .map(|(k, v)| (qualify(table, &k), v))
        .collect()
}

fn bucket_rows(rows: Vec<Row>, cond: &JoinCondition) -> Buckets {
    let right_key = qualify(&cond.right_table, &cond.right_field);
    let mut buckets = Buckets::new();
    for row in rows {
        let key = match row.get(&right_key) {
            Some(v) if !v.is_null() => v.group_key(),
            _ => continue,
        };
        buckets.entry(key).or_default().push(row);
    }
    buckets
}

fn probe(left: Vec<Row>, cond: &JoinCondition, all: &[JoinCondition], buckets: &Buckets) -> Vec<Row> {
    let left_key = qualify(&cond.left_table, &cond.left_field);
    let mut out = Vec::new();

    for row in left {
        let key = match row.get(&left_key) {
            Some(v) if !v.is_null() => v.group_key(),
            _ => continue,
        };
        let Some(candidates) = buckets.get(&key) else {
            continue;
        };
        for right in candidates {
            let merged = merge(&row, right);
            if conditions_hold(&merged, all) {
                out.push(merged);
            }
        }
    }
    out
}

fn nested_loop(left: Vec<Row>, right: &[Row], all: &[JoinCondition]) -> Vec<Row> {
    let mut out = Vec::new();
    for row in &left {
        for candidate in right {
            let merged = merge(row, candidate);
            if conditions_hold(&merged, all) {
                out.push(merged);
            }
        }
    }
    out
}

fn merge(left: &Row, right: &Row) -> Row {
    let mut merged = left.clone();
    merged.extend(right.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Every equality holds. Null or missing never equals anything.
fn conditions_hold(row: &Row, conditions: &[JoinCondition]) -> bool {
    conditions.iter().all(|c| {
        let left = row.get(&qualify(&c.left_table, &c.left_field));
        let right = row.get(&qualify(&c.right_table, &c.right_field));
        matches!((left, right), (Some(l), Some(r)) if !l.is_null() && l == r)
    })
}
