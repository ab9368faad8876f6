//! Access-path and join planning.
//!
//! Planning reads only the statement and the schema snapshot. Its output,
//! [`ExecutionPlan`], is what `explain` returns and what execution follows.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{SqlError, SqlResult};
use crate::sql::{
    Comparison, ComparisonOperator, JoinClause, JoinCondition, SelectStatement, WhereClause,
    CREATION_TIME_FIELD,
};
use crate::storage::{IndexRange, RangeOp, SchemaInfo};

use super::predicate::{referenced_tables, to_filter_all};
use super::types::{AccessPath, ExecutionPlan, JoinPlan, JoinStrategy, OrderStrategy};

/// WHERE conjuncts sorted by the tables they read.
#[derive(Debug, Default)]
pub(super) struct SplitWhere<'a> {
    /// Only the FROM table; pushed into its query
    pub base: Vec<&'a WhereClause>,
    /// Only one joined table; pushed into that table's retrieval
    pub joined: HashMap<&'a str, Vec<&'a WhereClause>>,
    /// Several tables; evaluated on merged rows
    pub post_join: Vec<&'a WhereClause>,
}

pub(super) fn split_where(stmt: &SelectStatement) -> SplitWhere<'_> {
    let mut split = SplitWhere::default();
    let Some(clause) = &stmt.where_clause else {
        return split;
    };

    for conjunct in clause.conjuncts() {
        let tables = referenced_tables(conjunct, &stmt.from);
        let mut iter = tables.iter();
        match (iter.next(), iter.next()) {
            (Some(&table), None) if table == stmt.from => split.base.push(conjunct),
            (Some(&table), None) => split.joined.entry(table).or_default().push(conjunct),
            _ => split.post_join.push(conjunct),
        }
    }
    split
}

/// Fail with the first FROM or JOIN table the schema does not know.
pub(super) fn ensure_tables_exist(stmt: &SelectStatement, schema: &SchemaInfo) -> SqlResult<()> {
    match stmt.tables().find(|table| !schema.has_table(table)) {
        Some(table) => Err(SqlError::TableNotFound(table.to_string())),
        None => Ok(()),
    }
}

/// Plan the whole statement. Fails on unknown tables, an unknown FROM index,
/// or WHERE conditions the FROM index cannot serve.
pub fn plan_statement(stmt: &SelectStatement, schema: &SchemaInfo) -> SqlResult<ExecutionPlan> {
    ensure_tables_exist(stmt, schema)?;

    let split = split_where(stmt);

    let access = match &stmt.index_hint {
        Some(index) => plan_index_access(&stmt.from, index, &split.base, schema)?,
        None => AccessPath::FullScan {
            filter: to_filter_all(split.base.iter().copied()),
        },
    };

    let mut joined_tables = vec![stmt.from.as_str()];
    let mut joins = Vec::with_capacity(stmt.joins.len());
    for join in &stmt.joins {
        let conjuncts = split
            .joined
            .get(join.table.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        joins.push(plan_join(join, &joined_tables, conjuncts, schema)?);
        joined_tables.push(join.table.as_str());
    }

    let order = order_strategy(stmt, &access);
    let post_join_filter = WhereClause::and_all(split.post_join.into_iter().cloned());

    debug!(
        table = %stmt.from,
        index = ?access.index_name(),
        order = ?order,
        joins = joins.len(),
        "Planned query"
    );

    Ok(ExecutionPlan {
        table: stmt.from.clone(),
        access,
        order,
        joins,
        post_join_filter,
        limit: stmt.limit,
    })
}

/// Walk the index's fields left to right, consuming conjuncts into a range.
///
/// Per field: an `=` is consumed and the walk continues. Range conditions (at
/// most one lower and one upper bound) are consumed and end the walk; any
/// later index field with a condition is then an error. A field with no usable
/// condition is an error unless it is the index's last field.
/// Everything not consumed becomes the residual filter.
pub(super) fn plan_index_access(
    table: &str,
    index: &str,
    conjuncts: &[&WhereClause],
    schema: &SchemaInfo,
) -> SqlResult<AccessPath> {
    let fields = schema
        .index_fields(table, index)
        .ok_or_else(|| SqlError::IndexNotFound {
            table: table.to_string(),
            index: index.to_string(),
        })?;

    let mut candidates = Candidates::new(conjuncts);
    let mut range = IndexRange::new();

    for (pos, field) in fields.iter().enumerate() {
        if let Some(i) = candidates.find(field, |op| op == ComparisonOperator::Eq) {
            candidates.consume(i, &mut range);
            continue;
        }

        let lower = candidates.find(field, |op| {
            matches!(op, ComparisonOperator::Gt | ComparisonOperator::GtEq)
        });
        let upper = candidates.find(field, |op| {
            matches!(op, ComparisonOperator::Lt | ComparisonOperator::LtEq)
        });
        let has_range = lower.is_some() || upper.is_some();
        for i in [lower, upper].into_iter().flatten() {
            candidates.consume(i, &mut range);
        }

        let is_last = pos + 1 == fields.len();
        if !has_range && !is_last {
            debug!(index, field = %field, "Index prefix column unconstrained");
            return Err(SqlError::MissingPrefixCondition {
                index: index.to_string(),
                column: field.clone(),
            });
        }
        if let Some(next) = fields[pos + 1..]
            .iter()
            .find(|f| candidates.constrained(f.as_str()))
        {
            debug!(index, field = %field, next = %next, "Range before a constrained column");
            return Err(SqlError::RangeNotLast {
                index: index.to_string(),
                column: field.clone(),
            });
        }
        break;
    }

    let residual = to_filter_all(candidates.remaining());

    Ok(AccessPath::Index {
        index: index.to_string(),
        fields: fields.to_vec(),
        range,
        residual,
    })
}

/// Conjuncts offered to an index, with the ones already turned into bounds.
struct Candidates<'a> {
    conjuncts: &'a [&'a WhereClause],
    consumed: Vec<bool>,
}

impl<'a> Candidates<'a> {
    fn new(conjuncts: &'a [&'a WhereClause]) -> Self {
        Self {
            conjuncts,
            consumed: vec![false; conjuncts.len()],
        }
    }

    fn comparison(&self, i: usize) -> Option<&'a Comparison> {
        match self.conjuncts[i] {
            WhereClause::Comparison(cmp) if cmp.function.is_none() => Some(cmp),
            _ => None,
        }
    }

    fn find<F>(&self, field: &str, accept: F) -> Option<usize>
    where
        F: Fn(ComparisonOperator) -> bool,
    {
        (0..self.conjuncts.len()).find(|&i| {
            !self.consumed[i]
                && self
                    .comparison(i)
                    .is_some_and(|cmp| cmp.field == field && accept(cmp.operator))
        })
    }

    /// A field has a condition an index bound could express.
    fn constrained(&self, field: &str) -> bool {
        self.find(field, |op| op != ComparisonOperator::NotEq).is_some()
    }

    fn consume(&mut self, i: usize, range: &mut IndexRange) {
        if let Some(cmp) = self.comparison(i) {
            if let Some(op) = RangeOp::from_comparison(cmp.operator) {
                range.push(cmp.field.clone(), op, cmp.value.clone());
                self.consumed[i] = true;
            }
        }
    }

    fn remaining(&self) -> impl Iterator<Item = &'a WhereClause> + '_ {
        self.conjuncts
            .iter()
            .zip(&self.consumed)
            .filter(|(_, used)| !**used)
            .map(|(c, _)| *c)
    }
}

fn plan_join(
    join: &JoinClause,
    joined_tables: &[&str],
    conjuncts: &[&WhereClause],
    schema: &SchemaInfo,
) -> SqlResult<JoinPlan> {
    let conditions: Vec<JoinCondition> = join
        .conditions
        .iter()
        .map(|c| {
            if c.left_table == join.table && c.right_table != join.table {
                c.flipped()
            } else {
                c.clone()
            }
        })
        .collect();

    for cond in &conditions {
        for table in [&cond.left_table, &cond.right_table] {
            if *table != join.table && !joined_tables.contains(&table.as_str()) {
                return Err(SqlError::semantic(format!(
                    "Join condition references table '{}' before it is joined",
                    table
                )));
            }
        }
    }

    let pushdown = to_filter_all(conjuncts.iter().copied());
    let unnarrowed = || AccessPath::FullScan {
        filter: pushdown.clone(),
    };

    let access = match &join.index_hint {
        Some(index) => match plan_index_access(&join.table, index, conjuncts, schema) {
            Ok(access) => access,
            Err(err) => {
                warn!(
                    table = %join.table,
                    index = %index,
                    error = %err,
                    "Join index hint not applicable, reading table without it"
                );
                unnarrowed()
            }
        },
        None => unnarrowed(),
    };

    let mut plan = JoinPlan {
        table: join.table.clone(),
        access,
        pushdown,
        strategy: JoinStrategy::NestedLoop,
        conditions,
    };

    plan.strategy = match (plan.probe_condition(), &join.index_hint) {
        (None, _) => JoinStrategy::NestedLoop,
        (Some(cond), Some(index)) if plan.conditions.len() == 1 => {
            let leads_with_join_field = schema
                .index_fields(&join.table, index)
                .and_then(|fields| fields.first())
                .is_some_and(|first| *first == cond.right_field);
            if leads_with_join_field {
                JoinStrategy::IndexedLookup {
                    index: index.clone(),
                }
            } else {
                JoinStrategy::HashProbe
            }
        }
        (Some(_), _) => JoinStrategy::HashProbe,
    };

    debug!(table = %plan.table, strategy = ?plan.strategy, "Planned join");
    Ok(plan)
}

/// Native ordering needs a single ORDER BY key on the FROM table that the
/// store's own order already satisfies: creation order on a full scan, or the
/// first field of the index being used.
fn order_strategy(stmt: &SelectStatement, access: &AccessPath) -> OrderStrategy {
    let Some(first) = stmt.order_by.first() else {
        return OrderStrategy::Unordered;
    };

    let eligible = stmt.order_by.len() == 1
        && stmt.joins.is_empty()
        && !stmt.is_grouped()
        && !stmt.is_aggregate_only()
        && first.table.as_deref().map_or(true, |t| t == stmt.from);
    if !eligible {
        return OrderStrategy::InMemory;
    }

    let native = match access {
        AccessPath::FullScan { .. } => first.field == CREATION_TIME_FIELD,
        AccessPath::Index { .. } => access.first_index_field() == Some(first.field.as_str()),
    };

    if native {
        OrderStrategy::Native(first.direction)
    } else {
        OrderStrategy::InMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{parse_sql, SortDirection};
    use crate::storage::FilterExpr;
    use crate::value::Value;

    fn schema() -> SchemaInfo {
        SchemaInfo::new()
            .with_index("users", "by_status", &["status"])
            .with_index("users", "by_status_age", &["status", "age"])
            .with_index("users", "by_a_b_c", &["a", "b", "c"])
            .with_index("posts", "by_author", &["authorId"])
            .with_index("posts", "by_views", &["views"])
    }

    fn plan(sql: &str) -> SqlResult<ExecutionPlan> {
        plan_statement(&parse_sql(sql)?, &schema())
    }

    #[test]
    fn test_full_scan_pushes_whole_where() {
        let p = plan("SELECT * FROM users WHERE status = 'x' OR age > 3").unwrap();
        match p.access {
            AccessPath::FullScan { filter: Some(FilterExpr::Or(..)) } => {}
            other => panic!("unexpected access {:?}", other),
        }
        assert_eq!(p.order, OrderStrategy::Unordered);
    }

    #[test]
    fn test_index_consumes_equality_then_range() {
        let p = plan("SELECT * FROM users@by_status_age WHERE age >= 18 AND status = 'active' AND age < 65 AND name != 'x'")
            .unwrap();
        match p.access {
            AccessPath::Index { range, residual, .. } => {
                let ops: Vec<(String, RangeOp)> =
                    range.bounds.iter().map(|b| (b.field.clone(), b.op)).collect();
                assert_eq!(
                    ops,
                    vec![
                        ("status".to_string(), RangeOp::Eq),
                        ("age".to_string(), RangeOp::Gte),
                        ("age".to_string(), RangeOp::Lt),
                    ]
                );
                assert_eq!(
                    residual,
                    Some(FilterExpr::Compare {
                        field: "name".to_string(),
                        operator: ComparisonOperator::NotEq,
                        value: Value::from("x"),
                    })
                );
            }
            other => panic!("unexpected access {:?}", other),
        }
    }

    #[test]
    fn test_missing_prefix_condition() {
        let err = plan("SELECT * FROM users@by_status_age WHERE age = 3").unwrap_err();
        assert_eq!(
            err,
            SqlError::MissingPrefixCondition {
                index: "by_status_age".to_string(),
                column: "status".to_string()
            }
        );
        assert_eq!(
            err.to_string(),
            "Index 'by_status_age' requires condition on prefix column 'status'"
        );

        // Only the last index field may go unconstrained.
        assert!(plan("SELECT * FROM users@by_status_age WHERE status = 'a'").is_ok());
        assert!(plan("SELECT * FROM users@by_status").is_ok());
    }

    #[test]
    fn test_unconstrained_middle_column() {
        let err = plan("SELECT * FROM users@by_status_age").unwrap_err();
        assert_eq!(
            err,
            SqlError::MissingPrefixCondition {
                index: "by_status_age".to_string(),
                column: "status".to_string()
            }
        );

        let err = plan("SELECT * FROM users@by_a_b_c WHERE a = 1").unwrap_err();
        assert_eq!(
            err,
            SqlError::MissingPrefixCondition {
                index: "by_a_b_c".to_string(),
                column: "b".to_string()
            }
        );
        assert!(plan("SELECT * FROM users@by_a_b_c WHERE a = 1 AND b = 2").is_ok());
    }

    #[test]
    fn test_range_must_be_last() {
        let err = plan("SELECT * FROM users@by_a_b_c WHERE a > 1 AND b = 2").unwrap_err();
        assert_eq!(
            err,
            SqlError::RangeNotLast {
                index: "by_a_b_c".to_string(),
                column: "a".to_string()
            }
        );
        assert!(plan("SELECT * FROM users@by_a_b_c WHERE a = 1 AND b > 2").is_ok());
    }

    #[test]
    fn test_or_is_never_index_covered() {
        let p = plan("SELECT * FROM users@by_status WHERE status = 'a' OR status = 'b'").unwrap();
        match p.access {
            AccessPath::Index { range, residual, .. } => {
                assert!(range.is_empty());
                assert!(matches!(residual, Some(FilterExpr::Or(..))));
            }
            other => panic!("unexpected access {:?}", other),
        }
    }

    #[test]
    fn test_unknown_table_and_index() {
        assert_eq!(
            plan("SELECT * FROM orders").unwrap_err(),
            SqlError::TableNotFound("orders".to_string())
        );
        assert_eq!(
            plan("SELECT * FROM users@by_email").unwrap_err(),
            SqlError::IndexNotFound {
                table: "users".to_string(),
                index: "by_email".to_string()
            }
        );
    }

    #[test]
    fn test_native_ordering() {
        let p = plan("SELECT * FROM users ORDER BY _creationTime DESC LIMIT 5").unwrap();
        assert_eq!(p.order, OrderStrategy::Native(SortDirection::Desc));

        let p = plan("SELECT * FROM users@by_status_age WHERE status = 'a' ORDER BY status").unwrap();
        assert_eq!(p.order, OrderStrategy::Native(SortDirection::Asc));

        let p = plan("SELECT * FROM users@by_status_age WHERE status = 'a' ORDER BY age").unwrap();
        assert_eq!(p.order, OrderStrategy::InMemory);

        let p = plan("SELECT * FROM users ORDER BY name").unwrap();
        assert_eq!(p.order, OrderStrategy::InMemory);
    }

    #[test]
    fn test_where_split_across_joins() {
        let p = plan(
            "SELECT * FROM users INNER JOIN posts ON users._id = posts.authorId \
             WHERE users.age > 3 AND posts.views > 10 AND (users.vip = true OR posts.pinned = true)",
        )
        .unwrap();
        assert!(matches!(p.access, AccessPath::FullScan { filter: Some(FilterExpr::Compare { .. }) }));
        assert!(matches!(p.joins[0].pushdown, Some(FilterExpr::Compare { .. })));
        assert!(matches!(p.post_join_filter, Some(WhereClause::Or(..))));
        assert_eq!(p.joins[0].strategy, JoinStrategy::HashProbe);
    }

    #[test]
    fn test_join_strategies() {
        let p = plan("SELECT * FROM users INNER JOIN posts@by_author ON posts.authorId = users._id").unwrap();
        assert_eq!(
            p.joins[0].strategy,
            JoinStrategy::IndexedLookup {
                index: "by_author".to_string()
            }
        );
        // Normalized so the join target sits on the right.
        assert_eq!(p.joins[0].conditions[0].right_table, "posts");

        let p = plan("SELECT * FROM users INNER JOIN posts@by_views ON users._id = posts.authorId").unwrap();
        assert_eq!(p.joins[0].strategy, JoinStrategy::HashProbe);
    }

    #[test]
    fn test_join_hint_falls_back() {
        let p = plan("SELECT * FROM users INNER JOIN posts@nope ON users._id = posts.authorId").unwrap();
        assert_eq!(p.joins[0].access, AccessPath::FullScan { filter: None });
        assert_eq!(p.joins[0].strategy, JoinStrategy::HashProbe);
    }
}
