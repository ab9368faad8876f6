//! Execution engine.
//!
//! [`QueryEngine`] runs a statement against any [`DatabaseContext`]: it plans
//! an access path ([`plan_statement`]), reads the FROM table, joins, filters,
//! groups or aggregates, orders, applies LIMIT, projects and caps the result
//! at `max_rows`.

mod aggregate;
mod grouping;
mod join;
mod planner;
mod predicate;
mod projection;
mod sort;
mod types;

pub use aggregate::Function;
pub use planner::plan_statement;
pub use predicate::{evaluate, to_filter};
pub use sort::{compare_values, sort_rows};
pub use types::{
    AccessPath, ExecutionPlan, JoinPlan, JoinStrategy, OrderStrategy, QueryOutcome,
};

use tracing::debug;

use crate::error::SqlResult;
use crate::limits::{self, QueryLimits};
use crate::sql::{parse_sql, SelectStatement, SortDirection};
use crate::storage::{DatabaseContext, SchemaCache, SchemaInfo};
use crate::value::Row;

use join::prefix_row;
use projection::{check_select, project_row};

/// Query engine bound to one database context.
///
/// Owns the limits and the schema snapshot, so one engine corresponds to one
/// logical connection. Cheap to share by reference across tasks.
pub struct QueryEngine<D> {
    db: D,
    limits: QueryLimits,
    schema: SchemaCache,
}

impl<D: DatabaseContext> QueryEngine<D> {
    pub fn new(db: D) -> Self {
        Self::with_limits(db, QueryLimits::default())
    }

    pub fn with_limits(db: D, limits: QueryLimits) -> Self {
        Self {
            db,
            limits,
            schema: SchemaCache::new(),
        }
    }

    /// Use a known schema instead of asking the database for it.
    pub fn with_schema(mut self, schema: SchemaInfo) -> Self {
        self.schema = SchemaCache::preloaded(schema);
        self
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Tokenize, parse, validate and run `sql`.
    pub async fn execute(&self, sql: &str) -> SqlResult<Vec<Row>> {
        let statement = parse_sql(sql)?;
        self.execute_statement(statement).await
    }

    /// Like [`execute`](Self::execute), reporting failure as data.
    pub async fn execute_outcome(&self, sql: &str) -> QueryOutcome {
        self.execute(sql).await.into()
    }

    /// Validate and run an already parsed statement.
    pub async fn execute_statement(&self, mut statement: SelectStatement) -> SqlResult<Vec<Row>> {
        let plan = self.prepare(&mut statement).await?;
        let rows = self.run(&statement, &plan).await?;
        debug!(table = %statement.from, rows = rows.len(), "Query complete");
        Ok(rows)
    }

    /// Plan `sql` without reading any rows.
    pub async fn explain(&self, sql: &str) -> SqlResult<ExecutionPlan> {
        let mut statement = parse_sql(sql)?;
        self.prepare(&mut statement).await
    }

    async fn prepare(&self, statement: &mut SelectStatement) -> SqlResult<ExecutionPlan> {
        let schema = self.schema.get(&self.db).await?;
        planner::ensure_tables_exist(statement, &schema)?;
        limits::validate(statement, &self.limits)?;
        check_select(statement)?;
        plan_statement(statement, &schema)
    }

    async fn run(&self, stmt: &SelectStatement, plan: &ExecutionPlan) -> SqlResult<Vec<Row>> {
        let plain = !stmt.is_grouped() && !stmt.is_aggregate_only();

        // LIMIT can be handed to the store only when nothing after the read
        // can drop or reorder rows.
        let pushed_limit = match plan.order {
            OrderStrategy::Unordered | OrderStrategy::Native(_)
                if plain && plan.joins.is_empty() =>
            {
                stmt.limit
            }
            _ => None,
        };
        let native = match plan.order {
            OrderStrategy::Native(direction) => Some(direction),
            _ => None,
        };

        let mut rows = self
            .fetch(&plan.table, &plan.access, native, pushed_limit)
            .await?;
        debug!(table = %plan.table, rows = rows.len(), "Fetched rows");

        if !plan.joins.is_empty() {
            rows = rows
                .into_iter()
                .map(|row| prefix_row(row, &plan.table))
                .collect();
            for join in &plan.joins {
                rows = self.execute_join(rows, join).await?;
            }
            if let Some(filter) = &plan.post_join_filter {
                rows.retain(|row| evaluate(filter, row, &plan.table));
            }
        }

        let mut result = if stmt.is_grouped() {
            grouping::group_rows(stmt, rows)?
        } else if stmt.is_aggregate_only() {
            grouping::aggregate_all(stmt, rows)?
        } else {
            if plan.order == OrderStrategy::InMemory {
                sort_rows(&mut rows, &stmt.order_by, &stmt.from);
            }
            if let Some(limit) = stmt.limit {
                rows.truncate(limit);
            }
            rows.iter()
                .map(|row| project_row(row, &stmt.columns, &stmt.from))
                .collect()
        };

        result.truncate(self.limits.max_rows);
        Ok(result)
    }

    async fn fetch(
        &self,
        table: &str,
        access: &AccessPath,
        order: Option<SortDirection>,
        take: Option<usize>,
    ) -> SqlResult<Vec<Row>> {
        let mut query = self.db.query(table)?;
        query = match access {
            AccessPath::FullScan { filter } => match filter {
                Some(filter) => query.filter(filter),
                None => query,
            },
            AccessPath::Index {
                index,
                range,
                residual,
                ..
            } => {
                let query = query.with_index(index, range)?;
                match residual {
                    Some(filter) => query.filter(filter),
                    None => query,
                }
            }
        };
        if let Some(direction) = order {
            query = query.order(direction);
        }

        let rows = match take {
            Some(n) => query.take(n).await?,
            None => query.collect().await?,
        };
        Ok(rows)
    }
}

/// Run one statement against `db` without keeping an engine around.
pub async fn execute_select<D>(
    db: &D,
    statement: SelectStatement,
    limits: &QueryLimits,
) -> SqlResult<Vec<Row>>
where
    D: DatabaseContext + ?Sized,
{
    QueryEngine::with_limits(db, limits.clone())
        .execute_statement(statement)
        .await
}
