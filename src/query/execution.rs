//! Query compilation and terminal operations.
//!
//! Compilation is pure: it resolves joins, composes scopes, checks alias
//! references and validates preload trees. Every terminal method compiles
//! first, so any compilation error surfaces before the first statement.

use super::builder::Query;
use crate::constants::projection_labels;
use crate::database::executor::run_select;
use crate::error::{CompilationError, Result};
use crate::join_path::{AssociationPath, Hop, JoinPathCompiler};
use crate::logging::log_preload_operation;
use crate::marshal::marshal;
use crate::models::{Record, Row};
use crate::preload::{self, LeftJoinPlan, PlanContext, PreloadStrategy};
use crate::query_builder::conditions::{qualify, split_reference};
use crate::query_builder::{
    AggregateFunction, Direction, Distinct, JoinType, OrderBy, Pagination, ProjectedColumn,
    Projection, SelectCommand, WhereClause,
};
use crate::scopes::{self, ScopeBypass};
use serde_json::Value;
use tracing::debug;

/// A compiled query plus what the terminal methods need to read its rows
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub command: SelectCommand,
    /// Alias whose rows the query returns
    pub focus_alias: String,
    pub focus_class: String,
    pub focus_primary_key: String,
    /// Root alias and every joined alias
    pub aliases: Vec<String>,
    pub plan: Option<LeftJoinPlan>,
}

impl CompiledQuery {
    fn qualified_primary_key(&self) -> String {
        qualify(&self.focus_alias, &self.focus_primary_key)
    }

    fn check_reference(&self, field: &str) -> std::result::Result<(), CompilationError> {
        match split_reference(field) {
            Some((alias, _)) if !self.aliases.iter().any(|a| a == alias) => {
                Err(CompilationError::UnknownAlias {
                    alias: alias.to_string(),
                    reference: field.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Command for a scalar result: no ordering, paging or distinct
    fn scalar_command(&self, projection: Projection) -> SelectCommand {
        let mut command = self.command.clone();
        command.projection = projection;
        command.order_by.clear();
        command.pagination = None;
        command.distinct = Distinct::None;
        command
    }
}

impl Query {
    /// Compile into the statement `all()` would issue
    pub fn compile(&self) -> std::result::Result<CompiledQuery, CompilationError> {
        self.compile_with(true)
    }

    pub(crate) fn compile_with(
        &self,
        include_left_join_preload: bool,
    ) -> std::result::Result<CompiledQuery, CompilationError> {
        let state = &self.state;
        if let Some(err) = &state.deferred_error {
            return Err(err.clone());
        }

        let registry = self.engine.registry();
        let max_depth = self.engine.config().max_association_depth;
        let root = registry.class(&state.root_class)?;
        let left_join = include_left_join_preload && state.has_left_join_preload();

        if left_join && (state.limit.is_some() || state.offset.is_some()) {
            return Err(CompilationError::IncompatibleCombination(
                "left_join_preload cannot be combined with limit or offset".to_string(),
            ));
        }
        if left_join && !state.distinct_on.is_empty() {
            return Err(CompilationError::IncompatibleCombination(
                "left_join_preload cannot be combined with distinct_on".to_string(),
            ));
        }

        let mut steps = Vec::new();
        let mut focus_alias = state.root_alias.clone();
        let mut focus_class = state.root_class.clone();
        let mut root_bypass = state.bypass.clone();

        if let Some(focus) = &state.focus {
            let compiler =
                JoinPathCompiler::new(registry, &state.bypass, &state.passthrough, max_depth);
            let path = AssociationPath::from_hops(vec![Hop::aliased(
                &focus.association,
                &focus.alias,
            )]);
            let hops = compiler.compile_into(
                &state.root_class,
                &state.root_alias,
                &path,
                JoinType::Inner,
                &[],
                &mut steps,
            )?;
            if let Some(hop) = hops.last() {
                focus_alias = hop.alias.clone();
                focus_class = hop.class.clone();
            }
            // the owner row is pinned by primary key
            root_bypass = ScopeBypass::all();
        }

        let no_bypass = ScopeBypass::none();
        let compiler = JoinPathCompiler::new(registry, &no_bypass, &state.passthrough, max_depth);
        for join in state.joins.iter() {
            let path = AssociationPath::parse(&join.path)?;
            compiler.compile_into(
                &focus_class,
                &focus_alias,
                &path,
                join.join_type,
                &join.condition,
                &mut steps,
            )?;
        }

        let plan = if left_join {
            let ctx = PlanContext {
                registry,
                passthrough: &state.passthrough,
                max_depth,
            };
            Some(LeftJoinPlan::compile(
                &ctx,
                &focus_class,
                &focus_alias,
                &state.left_join_preloads,
                &mut steps,
            )?)
        } else {
            None
        };
        preload::validate(registry, &focus_class, &state.preloads)?;

        let mut where_clauses =
            scopes::compose(registry, &state.root_class, &state.root_alias, &root_bypass, &[])?
                .clauses;
        where_clauses.extend(state.wheres.iter().map(|c| c.qualified(&focus_alias)));

        let order: Vec<OrderBy> = state
            .order
            .iter()
            .map(|o| OrderBy {
                column: qualify(&focus_alias, &o.column),
                direction: o.direction,
            })
            .collect();
        let distinct_on: Vec<String> = state
            .distinct_on
            .iter()
            .map(|c| qualify(&focus_alias, c))
            .collect();

        let focus_primary_key = registry.class(&focus_class)?.primary_key.clone();
        let mut aliases = vec![state.root_alias.clone()];
        for step in &steps {
            if !aliases.contains(&step.to_alias) {
                aliases.push(step.to_alias.clone());
            }
        }

        let mut compiled = CompiledQuery {
            command: SelectCommand::new(&root.table, &state.root_alias),
            focus_alias,
            focus_class,
            focus_primary_key,
            aliases,
            plan,
        };

        for field in where_clauses.iter().flat_map(WhereClause::fields) {
            compiled.check_reference(field)?;
        }
        for field in order.iter().map(|o| o.column.as_str()).chain(distinct_on.iter().map(String::as_str)) {
            compiled.check_reference(field)?;
        }

        let command = &mut compiled.command;
        command.projection = Projection::All(compiled.focus_alias.clone());
        command.joins = steps;
        command.where_clauses = where_clauses;
        command.order_by = lead_with(order, &distinct_on);
        command.distinct = if !distinct_on.is_empty() {
            Distinct::On(distinct_on)
        } else if state.distinct {
            Distinct::All
        } else {
            Distinct::None
        };
        let pagination = Pagination {
            limit: state.limit,
            offset: state.offset,
        };
        if !pagination.is_empty() {
            command.pagination = Some(pagination);
        }
        if let Some(plan) = &compiled.plan {
            command.projection = Projection::Columns(plan.columns.clone());
            command.order_by.extend(plan.order.iter().cloned());
        }

        debug!(
            model = %state.root_class,
            alias = %state.root_alias,
            joins = command.joins.len(),
            wheres = command.where_clauses.len(),
            "compiled query"
        );
        Ok(compiled)
    }

    /// Rendered SQL of the statement `all()` would issue
    pub fn sql(&self) -> Result<String> {
        Ok(self.compile()?.command.build_sql())
    }

    /// Every matching record, preloads attached
    pub async fn all(&self) -> Result<Vec<Record>> {
        let compiled = self.compile()?;
        let rows = self.fetch(&compiled.command, "select").await?;
        let mut records = self.materialize(&compiled, rows);
        self.run_preloads(&mut records).await?;
        Ok(records)
    }

    /// First record under the query order, primary key order by default
    pub async fn first(&self) -> Result<Option<Record>> {
        let compiled = self.compile()?;
        if compiled.plan.is_some() {
            return Ok(self.all().await?.into_iter().next());
        }

        let mut command = compiled.command.clone();
        if command.order_by.is_empty() {
            command.order_by.push(OrderBy::asc(&compiled.qualified_primary_key()));
        }
        command.pagination = Some(Pagination {
            limit: Some(1),
            offset: self.state.offset,
        });
        self.fetch_one(&compiled, &command).await
    }

    /// Last record under the query order, primary key order by default
    pub async fn last(&self) -> Result<Option<Record>> {
        let compiled = self.compile()?;
        if compiled.plan.is_some() {
            return Ok(self.all().await?.pop());
        }

        let mut command = compiled.command.clone();
        for entry in command.order_by.iter_mut() {
            entry.direction = match entry.direction {
                Direction::Asc => Direction::Desc,
                Direction::Desc => Direction::Asc,
            };
        }
        command.order_by.push(OrderBy::desc(&compiled.qualified_primary_key()));
        command.pagination = Some(Pagination::limit_only(1));
        self.fetch_one(&compiled, &command).await
    }

    /// Record with primary key `id`, if it matches the query
    pub async fn find(&self, id: impl Into<Value>) -> Result<Option<Record>> {
        let compiled = self.compile()?;
        let primary_key = compiled.qualified_primary_key();
        self.clone()
            .where_clause(WhereClause::eq(&primary_key, id))
            .first()
            .await
    }

    pub async fn find_by(&self, clause: WhereClause) -> Result<Option<Record>> {
        self.clone().where_clause(clause).first().await
    }

    pub async fn exists(&self) -> Result<bool> {
        let compiled = self.compile_with(false)?;
        let primary_key = compiled.qualified_primary_key();
        let mut command = compiled.scalar_command(Projection::Columns(vec![ProjectedColumn {
            column: primary_key.clone(),
            label: primary_key,
        }]));
        command.pagination = Some(Pagination::limit_only(1));
        Ok(!self.fetch(&command, "exists").await?.is_empty())
    }

    /// Number of matching records. With joins, counts distinct primary keys.
    pub async fn count(&self) -> Result<u64> {
        let compiled = self.compile_with(false)?;
        let distinct = match self.distinct_on_columns(&compiled).into_iter().next() {
            Some(column) => Some(column),
            None if self.state.has_joins() || self.state.distinct => {
                Some(compiled.qualified_primary_key())
            }
            None => None,
        };
        let command = compiled.scalar_command(Projection::Count { distinct });
        let rows = self.fetch(&command, "count").await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(projection_labels::COUNT))
            .map(count_value)
            .unwrap_or(0))
    }

    pub async fn min(&self, column: &str) -> Result<Value> {
        self.aggregate(AggregateFunction::Min, column).await
    }

    pub async fn max(&self, column: &str) -> Result<Value> {
        self.aggregate(AggregateFunction::Max, column).await
    }

    pub async fn sum(&self, column: &str) -> Result<Value> {
        self.aggregate(AggregateFunction::Sum, column).await
    }

    pub async fn avg(&self, column: &str) -> Result<Value> {
        self.aggregate(AggregateFunction::Avg, column).await
    }

    /// Aggregate over `column` of the matching rows; NULL when none match
    pub async fn aggregate(&self, function: AggregateFunction, column: &str) -> Result<Value> {
        let compiled = self.compile_with(false)?;
        let column = qualify(&compiled.focus_alias, column);
        compiled.check_reference(&column)?;
        let command = compiled.scalar_command(Projection::Aggregate { function, column });
        let rows = self.fetch(&command, "aggregate").await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(projection_labels::AGGREGATE))
            .unwrap_or(Value::Null))
    }

    /// Raw values of `columns` per matching row, in query order
    pub async fn pluck(&self, columns: &[&str]) -> Result<Vec<Vec<Value>>> {
        let compiled = self.compile_with(false)?;
        let mut projected = Vec::with_capacity(columns.len());
        for column in columns {
            let reference = qualify(&compiled.focus_alias, column);
            compiled.check_reference(&reference)?;
            projected.push(ProjectedColumn {
                column: reference.clone(),
                label: reference,
            });
        }

        let mut command = compiled.command.clone();
        command.projection = Projection::Columns(projected.clone());
        let rows = self.fetch(&command, "pluck").await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                projected
                    .iter()
                    .map(|p| row.get(&p.label).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect())
    }

    pub async fn pluck_one(&self, column: &str) -> Result<Vec<Value>> {
        Ok(self
            .pluck(&[column])
            .await?
            .into_iter()
            .filter_map(|mut values| values.pop())
            .collect())
    }

    fn distinct_on_columns(&self, compiled: &CompiledQuery) -> Vec<String> {
        self.state
            .distinct_on
            .iter()
            .map(|c| qualify(&compiled.focus_alias, c))
            .collect()
    }

    async fn fetch(&self, command: &SelectCommand, operation: &str) -> Result<Vec<Row>> {
        Ok(run_select(
            self.engine.executor(),
            command,
            self.state.transaction.as_ref(),
            self.engine.config().log_sql,
            operation,
        )
        .await?)
    }

    async fn fetch_one(
        &self,
        compiled: &CompiledQuery,
        command: &SelectCommand,
    ) -> Result<Option<Record>> {
        let rows = self.fetch(command, "select").await?;
        let mut records = self.materialize(compiled, rows);
        records.truncate(1);
        self.run_preloads(&mut records).await?;
        Ok(records.pop())
    }

    fn materialize(&self, compiled: &CompiledQuery, rows: Vec<Row>) -> Vec<Record> {
        let registry = self.engine.registry();
        match &compiled.plan {
            Some(plan) => {
                let records = plan.reconstruct(registry, &rows);
                log_preload_operation(
                    PreloadStrategy::LeftJoin.as_str(),
                    &compiled.focus_class,
                    plan.node_count(),
                    records.len(),
                    "success",
                );
                records
            }
            None => rows
                .into_iter()
                .map(|row| marshal(registry, row, &compiled.focus_class))
                .collect(),
        }
    }

    pub(crate) async fn run_preloads(&self, records: &mut [Record]) -> Result<()> {
        let nodes = &self.state.preloads;
        if nodes.is_empty() || records.is_empty() {
            return Ok(());
        }
        let ctx = self
            .engine
            .preload_context(self.state.transaction.as_ref(), &self.state.passthrough);
        preload::preload(&ctx, records, nodes).await?;
        log_preload_operation(
            PreloadStrategy::Batched.as_str(),
            records[0].class_name(),
            nodes.iter().map(|n| n.size()).sum(),
            records.len(),
            "success",
        );
        Ok(())
    }
}

/// Put `leading` columns at the head of `order`, keeping their direction
/// when the order already names them
fn lead_with(order: Vec<OrderBy>, leading: &[String]) -> Vec<OrderBy> {
    if leading.is_empty() {
        return order;
    }
    let mut result: Vec<OrderBy> = leading
        .iter()
        .map(|column| {
            order
                .iter()
                .find(|o| o.column == *column)
                .cloned()
                .unwrap_or_else(|| OrderBy::asc(column))
        })
        .collect();
    result.extend(order.into_iter().filter(|o| !leading.contains(&o.column)));
    result
}

fn count_value(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_distinct_on_columns_lead_the_order() {
        let order = vec![OrderBy::desc("posts.score"), OrderBy::desc("posts.user_id")];
        let led = lead_with(order, &["posts.user_id".to_string()]);
        let columns: Vec<(&str, Direction)> =
            led.iter().map(|o| (o.column.as_str(), o.direction)).collect();
        assert_eq!(
            columns,
            vec![("posts.user_id", Direction::Desc), ("posts.score", Direction::Desc)]
        );
    }

    #[test]
    fn test_count_value_accepts_numeric_strings() {
        assert_eq!(count_value(&json!(3)), 3);
        assert_eq!(count_value(&json!("12")), 12);
        assert_eq!(count_value(&Value::Null), 0);
    }
}
