//! Chainable query builder.
//!
//! Builder methods never fail. An invalid argument (a malformed path, a
//! colliding preload alias) is remembered and reported by the first
//! terminal call, before any SQL is issued.

use super::state::{JoinRequest, QueryState};
use crate::database::TransactionHandle;
use crate::engine::Engine;
use crate::preload::{build_tree, merge, PreloadArg, PreloadNode};
use crate::query_builder::{JoinType, OrderBy, WhereClause};
use crate::scopes::ScopeBypass;
use serde_json::Value;
use std::sync::Arc;

/// A query against one model class
///
/// Cloning a query is cheap; a clone can be refined independently of the
/// original.
#[derive(Clone)]
pub struct Query {
    pub(crate) engine: Engine,
    pub(crate) state: QueryState,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("state", &self.state).finish()
    }
}

impl Query {
    pub(crate) fn new(engine: Engine, state: QueryState) -> Self {
        Self { engine, state }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn where_clause(mut self, clause: WhereClause) -> Self {
        Arc::make_mut(&mut self.state.wheres).push(clause);
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_clause(WhereClause::eq(column, value))
    }

    /// `column: value` pairs from a JSON object; null means IS NULL and an
    /// array means IN
    pub fn where_matching(self, pairs: &Value) -> Self {
        self.where_clause(WhereClause::matching(pairs))
    }

    pub fn and_not(self, clause: WhereClause) -> Self {
        self.where_clause(clause.negate())
    }

    pub fn and_any(self, alternatives: Vec<WhereClause>) -> Self {
        self.where_clause(WhereClause::any(alternatives))
    }

    /// Inner join along an association path such as `"posts as p.comments"`
    pub fn joins(self, path: &str) -> Self {
        self.push_join(path, JoinType::Inner, Vec::new())
    }

    pub fn inner_join(self, path: &str) -> Self {
        self.push_join(path, JoinType::Inner, Vec::new())
    }

    pub fn left_join(self, path: &str) -> Self {
        self.push_join(path, JoinType::Left, Vec::new())
    }

    /// Inner join with extra ON conditions on the last hop
    pub fn joins_with(self, path: &str, condition: Vec<WhereClause>) -> Self {
        self.push_join(path, JoinType::Inner, condition)
    }

    pub fn left_join_with(self, path: &str, condition: Vec<WhereClause>) -> Self {
        self.push_join(path, JoinType::Left, condition)
    }

    fn push_join(mut self, path: &str, join_type: JoinType, condition: Vec<WhereClause>) -> Self {
        Arc::make_mut(&mut self.state.joins).push(JoinRequest {
            path: path.to_string(),
            join_type,
            condition,
        });
        self
    }

    /// Batch-load associations onto the results, one SELECT per node
    pub fn preload<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<PreloadArg>,
    {
        let args: Vec<PreloadArg> = args.into_iter().map(Into::into).collect();
        let mut preloads = Arc::clone(&self.state.preloads);
        match merge_call(Arc::make_mut(&mut preloads), &args) {
            Ok(()) => self.state.preloads = preloads,
            Err(err) => self.state.defer(err),
        }
        self
    }

    /// Load associations in the same statement via LEFT JOINs
    pub fn left_join_preload<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<PreloadArg>,
    {
        let args: Vec<PreloadArg> = args.into_iter().map(Into::into).collect();
        let mut preloads = Arc::clone(&self.state.left_join_preloads);
        match merge_call(Arc::make_mut(&mut preloads), &args) {
            Ok(()) => self.state.left_join_preloads = preloads,
            Err(err) => self.state.defer(err),
        }
        self
    }

    /// Value for association conditions declared as passthrough
    pub fn passthrough(mut self, key: &str, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.state.passthrough).insert(key.to_string(), value.into());
        self
    }

    pub fn without_default_scope(mut self, name: &str) -> Self {
        self.state.bypass = self.state.bypass.with_name(name);
        self
    }

    pub fn without_default_scopes(mut self) -> Self {
        self.state.bypass = ScopeBypass::all();
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        Arc::make_mut(&mut self.state.order).push(order);
        self
    }

    pub fn order_asc(self, column: &str) -> Self {
        self.order(OrderBy::asc(column))
    }

    pub fn order_desc(self, column: &str) -> Self {
        self.order(OrderBy::desc(column))
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.state.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.state.offset = Some(offset);
        self
    }

    /// SELECT DISTINCT over the selected rows
    pub fn distinct(mut self) -> Self {
        self.state.distinct = true;
        self
    }

    /// Keep the first row per value of `column` under the query order
    pub fn distinct_on(mut self, column: &str) -> Self {
        Arc::make_mut(&mut self.state.distinct_on).push(column.to_string());
        self
    }

    /// Route every statement this query issues through `transaction`
    pub fn transaction(mut self, transaction: &TransactionHandle) -> Self {
        self.state.transaction = Some(transaction.clone());
        self
    }
}

/// Parse one call's arguments and merge them into an existing forest
fn merge_call(
    forest: &mut Vec<PreloadNode>,
    args: &[PreloadArg],
) -> Result<(), crate::error::CompilationError> {
    for node in build_tree(args)? {
        merge(forest, node)?;
    }
    Ok(())
}
