//! Immutable query state.
//!
//! Every builder call produces a new [`QueryState`]. Collections sit behind
//! `Arc`s so unchanged parts are shared between a query and the queries
//! derived from it; a change copies only the collection it touches.

use crate::database::TransactionHandle;
use crate::error::CompilationError;
use crate::preload::PreloadNode;
use crate::query_builder::{JoinType, OrderBy, WhereClause};
use crate::scopes::ScopeBypass;
use serde_json::{Map, Value};
use std::sync::Arc;

/// One `joins(...)` request, compiled when the query is
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub path: String,
    pub join_type: JoinType,
    /// Extra ON conditions for the last hop; bare columns refer to its alias
    pub condition: Vec<WhereClause>,
}

/// Association a query is scoped to when built by `association_query`
#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub association: String,
    pub alias: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub root_class: String,
    pub root_alias: String,
    pub focus: Option<Focus>,
    pub wheres: Arc<Vec<WhereClause>>,
    pub joins: Arc<Vec<JoinRequest>>,
    pub preloads: Arc<Vec<PreloadNode>>,
    pub left_join_preloads: Arc<Vec<PreloadNode>>,
    pub order: Arc<Vec<OrderBy>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
    pub distinct_on: Arc<Vec<String>>,
    pub bypass: ScopeBypass,
    pub passthrough: Arc<Map<String, Value>>,
    pub transaction: Option<TransactionHandle>,
    /// First error raised by a builder call, reported by the terminal call
    pub deferred_error: Option<CompilationError>,
}

impl QueryState {
    pub fn new(root_class: &str, root_alias: &str) -> Self {
        Self {
            root_class: root_class.to_string(),
            root_alias: root_alias.to_string(),
            ..Self::default()
        }
    }

    /// Remember `err` unless an earlier error is already pending
    pub fn defer(&mut self, err: CompilationError) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(err);
        }
    }

    pub fn has_left_join_preload(&self) -> bool {
        !self.left_join_preloads.is_empty()
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty() || self.focus.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_deferred_error_wins() {
        let mut state = QueryState::new("User", "users");
        state.defer(CompilationError::InvalidPath("a..b".to_string()));
        state.defer(CompilationError::AliasCollision {
            alias: "p".to_string(),
        });
        assert_eq!(
            state.deferred_error,
            Some(CompilationError::InvalidPath("a..b".to_string()))
        );
    }

    #[test]
    fn test_clones_share_unchanged_collections() {
        let mut state = QueryState::new("User", "users");
        Arc::make_mut(&mut state.wheres).push(WhereClause::eq("name", "a"));
        let mut derived = state.clone();
        Arc::make_mut(&mut derived.order).push(OrderBy::asc("name"));

        assert!(Arc::ptr_eq(&state.wheres, &derived.wheres));
        assert!(state.order.is_empty());
        assert_eq!(derived.order.len(), 1);
    }
}
