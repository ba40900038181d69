//! Offset and cursor pagination built on the query facade.

use super::builder::Query;
use crate::config::EngineConfig;
use crate::error::{CompilationError, Result};
use crate::models::Record;
use crate::query_builder::pagination::{normalize_page, page_count};
use crate::query_builder::{Condition, Direction, Operator, OrderBy, Pagination, WhereClause};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: u32,
    /// 1-indexed; `None` and `0` mean the first page
    pub page: Option<u32>,
}

impl PageRequest {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            page: None,
        }
    }

    /// First page at the configured default size
    pub fn with_config(config: &EngineConfig) -> Self {
        Self::new(config.default_page_size)
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub record_count: u64,
    pub page_count: u64,
    pub current_page: u32,
    pub results: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollRequest {
    pub page_size: u32,
    /// Primary key of the last record already seen
    pub cursor: Option<Value>,
}

impl ScrollRequest {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            cursor: None,
        }
    }

    pub fn after(mut self, cursor: Option<Value>) -> Self {
        self.cursor = cursor;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollPage {
    pub results: Vec<Record>,
    /// Primary key of the last returned record, `None` at the end of data
    pub cursor: Option<Value>,
}

impl Query {
    fn check_paginable(&self, page_size: u32) -> std::result::Result<(), CompilationError> {
        if let Some(err) = &self.state.deferred_error {
            return Err(err.clone());
        }
        if page_size == 0 {
            return Err(CompilationError::InvalidPageSize(page_size));
        }
        let conflict = if self.state.limit.is_some() {
            Some("pagination cannot be combined with an explicit limit")
        } else if self.state.offset.is_some() {
            Some("pagination cannot be combined with an explicit offset")
        } else if self.state.has_left_join_preload() {
            Some("pagination cannot be combined with left_join_preload")
        } else {
            None
        };
        match conflict {
            Some(reason) => Err(CompilationError::IncompatibleCombination(reason.to_string())),
            None => Ok(()),
        }
    }

    /// The query ordered with the primary key as final tie-break
    fn with_primary_key_order(&self) -> std::result::Result<(Query, String), CompilationError> {
        let primary_key = self.compile_with(false)?.focus_primary_key;
        let mut query = self.clone();
        if !query.state.order.iter().any(|o| o.column == primary_key) {
            query = query.order_asc(&primary_key);
        }
        Ok((query, primary_key))
    }

    /// One page of results plus the total record and page counts
    pub async fn paginate(&self, request: PageRequest) -> Result<Page> {
        self.check_paginable(request.page_size)?;
        let (ordered, _) = self.with_primary_key_order()?;

        let record_count = self.count().await?;
        let current_page = normalize_page(request.page);
        let pagination = Pagination::new(Some(current_page), request.page_size);

        let mut query = ordered;
        query.state.limit = pagination.limit;
        query.state.offset = pagination.offset;
        let results = query.all().await?;

        debug!(
            model = %self.state.root_class,
            page = current_page,
            page_size = request.page_size,
            record_count = record_count,
            "paginated query"
        );
        Ok(Page {
            record_count,
            page_count: page_count(record_count, request.page_size),
            current_page,
            results,
        })
    }

    /// Keyset pagination after `request.cursor`, under the query order
    /// with the primary key as tie-break
    pub async fn scroll_paginate(&self, request: ScrollRequest) -> Result<ScrollPage> {
        self.check_paginable(request.page_size)?;
        let (mut query, primary_key) = self.with_primary_key_order()?;

        if let Some(cursor) = &request.cursor {
            let explicit: Vec<OrderBy> = self
                .state
                .order
                .iter()
                .filter(|o| o.column != primary_key)
                .cloned()
                .collect();
            let after = if explicit.is_empty() {
                None
            } else {
                let columns: Vec<&str> = explicit.iter().map(|o| o.column.as_str()).collect();
                self.clone()
                    .where_clause(WhereClause::eq(&primary_key, cursor.clone()))
                    .pluck(&columns)
                    .await?
                    .into_iter()
                    .next()
            };
            let predicate = match after {
                Some(values) => keyset_after(&explicit, &values, &primary_key, cursor),
                None => WhereClause::simple(&primary_key, Operator::Gt, cursor.clone()),
            };
            query = query.where_clause(predicate);
        }

        query.state.limit = Some(u64::from(request.page_size) + 1);
        let mut results = query.all().await?;
        let page_size = request.page_size as usize;
        let cursor = if results.len() > page_size {
            results.truncate(page_size);
            results.last().and_then(Record::id).cloned()
        } else {
            None
        };

        debug!(
            model = %self.state.root_class,
            page_size = request.page_size,
            returned = results.len(),
            more = cursor.is_some(),
            "scrolled query"
        );
        Ok(ScrollPage { results, cursor })
    }
}

/// Rows strictly after the cursor row under `order` then primary key
/// ascending. NULLs sort last ascending and first descending.
fn keyset_after(order: &[OrderBy], values: &[Value], primary_key: &str, cursor: &Value) -> WhereClause {
    let mut alternatives = Vec::with_capacity(order.len() + 1);
    let mut equal_prefix: Vec<Condition> = Vec::new();

    for (entry, value) in order.iter().zip(values) {
        if let Some(after) = after_value(entry, value) {
            let mut conditions = equal_prefix.clone();
            conditions.push(after);
            alternatives.push(WhereClause::and(conditions));
        }
        equal_prefix.push(if value.is_null() {
            Condition::IsNull {
                field: entry.column.clone(),
            }
        } else {
            Condition::Simple {
                field: entry.column.clone(),
                operator: Operator::Eq,
                value: value.clone(),
            }
        });
    }

    equal_prefix.push(Condition::Simple {
        field: primary_key.to_string(),
        operator: Operator::Gt,
        value: cursor.clone(),
    });
    alternatives.push(WhereClause::and(equal_prefix));
    WhereClause::any(alternatives)
}

fn after_value(entry: &OrderBy, value: &Value) -> Option<Condition> {
    let field = entry.column.clone();
    match (entry.direction, value.is_null()) {
        (Direction::Asc, true) => None,
        (Direction::Asc, false) => Some(Condition::Group(WhereClause::or(vec![
            Condition::Simple {
                field: field.clone(),
                operator: Operator::Gt,
                value: value.clone(),
            },
            Condition::IsNull { field },
        ]))),
        (Direction::Desc, true) => Some(Condition::IsNotNull { field }),
        (Direction::Desc, false) => Some(Condition::Simple {
            field,
            operator: Operator::Lt,
            value: value.clone(),
        }),
    }
}
