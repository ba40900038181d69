//! In-memory implementation of the SQL execution boundary.
//!
//! Evaluates the structured command shape directly over JSON rows: joins,
//! three-valued predicates, ordering, DISTINCT / DISTINCT ON, projections,
//! COUNT and aggregates, LIMIT/OFFSET and DELETE. Raw SQL fragments are not
//! interpreted and fail like a backend error would.

use crate::database::{SqlExecutor, TransactionHandle};
use crate::error::ExecutionError;
use crate::models::{value_key, Row};
use crate::preload::compare_values;
use crate::query_builder::conditions::split_reference;
use crate::query_builder::{
    AggregateFunction, Condition, DeleteCommand, Direction, Distinct, JoinType, LogicalOperator,
    Operator, OrderBy, Projection, SelectCommand, WhereClause,
};
use crate::constants::projection_labels;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Delete,
}

/// One statement the database was asked to run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub kind: StatementKind,
    pub table: String,
    pub sql: String,
    pub transaction: Option<Uuid>,
}

/// Payload of handles issued by [`InMemoryDatabase::begin`]
#[derive(Debug)]
struct InMemoryTransaction {
    database: Uuid,
}

/// One joined result tuple; an absent alias is the NULL side of a LEFT JOIN
type Tuple = BTreeMap<String, Row>;

#[derive(Debug)]
pub struct InMemoryDatabase {
    id: Uuid,
    tables: Mutex<BTreeMap<String, Vec<Row>>>,
    log: Mutex<Vec<ExecutedStatement>>,
    failure: Mutex<Option<String>>,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tables: Mutex::new(BTreeMap::new()),
            log: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Append a row; `row` must be a JSON object
    pub fn insert(&self, table: &str, row: Value) {
        if let Value::Object(row) = row {
            self.tables
                .lock()
                .entry(table.to_string())
                .or_default()
                .push(row);
        }
    }

    pub fn insert_all(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        for row in rows {
            self.insert(table, row);
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Open a handle this database accepts
    pub fn begin(&self) -> TransactionHandle {
        TransactionHandle::new(InMemoryTransaction { database: self.id })
    }

    /// Make the next statement fail with a backend error
    pub fn fail_next(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.log.lock().clone()
    }

    pub fn select_count(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|s| s.kind == StatementKind::Select)
            .count()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn record(
        &self,
        kind: StatementKind,
        table: &str,
        sql: String,
        transaction: Option<&TransactionHandle>,
    ) -> Result<(), ExecutionError> {
        if let Some(handle) = transaction {
            match handle.downcast::<InMemoryTransaction>() {
                Some(tx) if tx.database == self.id => {}
                _ => return Err(ExecutionError::ForeignTransaction(handle.id())),
            }
        }
        self.log.lock().push(ExecutedStatement {
            kind,
            table: table.to_string(),
            sql,
            transaction: transaction.map(TransactionHandle::id),
        });

        match self.failure.lock().take() {
            Some(message) => Err(ExecutionError::Backend {
                message: message.clone(),
                source: Some(Box::new(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    message,
                ))),
            }),
            None => Ok(()),
        }
    }

    fn select(&self, command: &SelectCommand) -> Result<Vec<Row>, ExecutionError> {
        let tables = self.tables.lock();
        let scan = |table: &str| tables.get(table).cloned().unwrap_or_default();

        let mut tuples: Vec<Tuple> = scan(&command.table)
            .into_iter()
            .map(|row| BTreeMap::from([(command.alias.clone(), row)]))
            .collect();

        for step in &command.joins {
            let candidates = scan(&step.to_table);
            let mut joined = Vec::new();
            for tuple in tuples {
                let mut matched = false;
                for row in &candidates {
                    let mut extended = tuple.clone();
                    extended.insert(step.to_alias.clone(), row.clone());
                    if all_true(&step.on, &extended, &command.alias)? {
                        matched = true;
                        joined.push(extended);
                    }
                }
                if !matched && step.join_type == JoinType::Left {
                    joined.push(tuple);
                }
            }
            tuples = joined;
        }

        let mut filtered = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if all_true(&command.where_clauses, &tuple, &command.alias)? {
                filtered.push(tuple);
            }
        }
        let mut tuples = filtered;

        tuples.sort_by(|a, b| compare_tuples(a, b, &command.order_by, &command.alias));

        if let Distinct::On(columns) = &command.distinct {
            let mut seen = HashSet::new();
            tuples.retain(|tuple| {
                let key: Vec<String> = columns
                    .iter()
                    .map(|c| value_key(&resolve(tuple, c, &command.alias)))
                    .collect();
                seen.insert(key)
            });
        }

        let mut rows = match &command.projection {
            Projection::All(alias) => tuples
                .into_iter()
                .filter_map(|mut tuple| tuple.remove(alias))
                .collect(),
            Projection::Columns(columns) => tuples
                .iter()
                .map(|tuple| {
                    columns
                        .iter()
                        .map(|c| (c.label.clone(), resolve(tuple, &c.column, &command.alias)))
                        .collect::<Row>()
                })
                .collect(),
            Projection::Count { distinct } => {
                let count = match distinct {
                    None => tuples.len(),
                    Some(column) => tuples
                        .iter()
                        .map(|t| resolve(t, column, &command.alias))
                        .filter(|v| !v.is_null())
                        .map(|v| value_key(&v))
                        .collect::<HashSet<_>>()
                        .len(),
                };
                return Ok(vec![single(projection_labels::COUNT, json!(count))]);
            }
            Projection::Aggregate { function, column } => {
                let values: Vec<Value> = tuples
                    .iter()
                    .map(|t| resolve(t, column, &command.alias))
                    .filter(|v| !v.is_null())
                    .collect();
                let value = aggregate(*function, column, &values)?;
                return Ok(vec![single(projection_labels::AGGREGATE, value)]);
            }
        };

        if command.distinct == Distinct::All {
            let mut seen = HashSet::new();
            rows.retain(|row: &Row| seen.insert(Value::Object(row.clone()).to_string()));
        }

        if let Some(pagination) = command.pagination {
            let offset = pagination.offset.unwrap_or(0) as usize;
            rows = rows.into_iter().skip(offset).collect();
            if let Some(limit) = pagination.limit {
                rows.truncate(limit as usize);
            }
        }
        Ok(rows)
    }

    fn delete(&self, command: &DeleteCommand) -> Result<u64, ExecutionError> {
        let mut tables = self.tables.lock();
        let Some(rows) = tables.get_mut(&command.table) else {
            return Ok(0);
        };

        let mut kept = Vec::with_capacity(rows.len());
        let mut deleted = 0;
        for row in rows.drain(..) {
            let tuple = BTreeMap::from([(command.table.clone(), row)]);
            if all_true(&command.where_clauses, &tuple, &command.table)? {
                deleted += 1;
            } else if let Some(row) = tuple.into_values().next() {
                kept.push(row);
            }
        }
        *rows = kept;
        Ok(deleted)
    }
}

#[async_trait]
impl SqlExecutor for InMemoryDatabase {
    async fn fetch_rows(
        &self,
        command: &SelectCommand,
        transaction: Option<&TransactionHandle>,
    ) -> Result<Vec<Row>, ExecutionError> {
        self.record(
            StatementKind::Select,
            &command.table,
            command.build_sql(),
            transaction,
        )?;
        self.select(command)
    }

    async fn execute_delete(
        &self,
        command: &DeleteCommand,
        transaction: Option<&TransactionHandle>,
    ) -> Result<u64, ExecutionError> {
        self.record(
            StatementKind::Delete,
            &command.table,
            command.build_sql(),
            transaction,
        )?;
        self.delete(command)
    }
}

fn single(label: &str, value: Value) -> Row {
    let mut row = Row::new();
    row.insert(label.to_string(), value);
    row
}

/// Value of `alias.column`, or of `column` on the root alias
fn resolve(tuple: &Tuple, field: &str, root_alias: &str) -> Value {
    let (alias, column) = split_reference(field).unwrap_or((root_alias, field));
    tuple
        .get(alias)
        .and_then(|row| row.get(column))
        .cloned()
        .unwrap_or(Value::Null)
}

fn all_true(clauses: &[WhereClause], tuple: &Tuple, root_alias: &str) -> Result<bool, ExecutionError> {
    for clause in clauses {
        if evaluate_clause(clause, tuple, root_alias)? != Some(true) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn evaluate_clause(
    clause: &WhereClause,
    tuple: &Tuple,
    root_alias: &str,
) -> Result<Option<bool>, ExecutionError> {
    let mut result = Some(matches!(clause.operator, LogicalOperator::And));
    for condition in &clause.conditions {
        let value = evaluate(condition, tuple, root_alias)?;
        result = match clause.operator {
            LogicalOperator::And => match (result, value) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            LogicalOperator::Or => match (result, value) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        };
    }
    Ok(if clause.negated {
        result.map(|b| !b)
    } else {
        result
    })
}

fn evaluate(
    condition: &Condition,
    tuple: &Tuple,
    root_alias: &str,
) -> Result<Option<bool>, ExecutionError> {
    let value_of = |field: &str| resolve(tuple, field, root_alias);
    Ok(match condition {
        Condition::Simple {
            field,
            operator,
            value,
        } => {
            let left = value_of(field);
            if value.is_null() {
                Some(match operator {
                    Operator::NotEq => !left.is_null(),
                    _ => left.is_null(),
                })
            } else {
                compare(&left, *operator, value)
            }
        }
        Condition::Columns {
            left,
            operator,
            right,
        } => compare(&value_of(left), *operator, &value_of(right)),
        Condition::In { field, values } => membership(&value_of(field), values),
        Condition::NotIn { field, values } => membership(&value_of(field), values).map(|b| !b),
        Condition::Between { field, start, end } => {
            let left = value_of(field);
            match (
                compare(&left, Operator::Gte, start),
                compare(&left, Operator::Lte, end),
            ) {
                (Some(a), Some(b)) => Some(a && b),
                _ => None,
            }
        }
        Condition::IsNull { field } => Some(value_of(field).is_null()),
        Condition::IsNotNull { field } => Some(!value_of(field).is_null()),
        Condition::Group(clause) => evaluate_clause(clause, tuple, root_alias)?,
        Condition::Raw { sql } => {
            return Err(ExecutionError::backend(format!(
                "raw SQL is not supported in memory: {sql}"
            )))
        }
    })
}

fn compare(left: &Value, operator: Operator, right: &Value) -> Option<bool> {
    if left.is_null() || right.is_null() {
        return None;
    }
    let ordering = compare_values(left, right);
    Some(match operator {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::NotEq => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Like => like(&text(left), &text(right)),
        Operator::ILike => like(&text(left).to_lowercase(), &text(right).to_lowercase()),
    })
}

fn membership(left: &Value, values: &[Value]) -> Option<bool> {
    if values.is_empty() {
        return Some(false);
    }
    if left.is_null() {
        return None;
    }
    let mut unknown = false;
    for value in values {
        match compare(left, Operator::Eq, value) {
            Some(true) => return Some(true),
            Some(false) => {}
            None => unknown = true,
        }
    }
    if unknown {
        None
    } else {
        Some(false)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL LIKE with `%` and `_` wildcards
fn like(input: &str, pattern: &str) -> bool {
    fn matches(input: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => input.is_empty(),
            Some(('%', rest)) => (0..=input.len()).any(|i| matches(&input[i..], rest)),
            Some(('_', rest)) => !input.is_empty() && matches(&input[1..], rest),
            Some((c, rest)) => input.first() == Some(c) && matches(&input[1..], rest),
        }
    }
    let input: Vec<char> = input.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    matches(&input, &pattern)
}

fn compare_tuples(a: &Tuple, b: &Tuple, order: &[OrderBy], root_alias: &str) -> Ordering {
    for entry in order {
        let left = resolve(a, &entry.column, root_alias);
        let right = resolve(b, &entry.column, root_alias);
        let ordering = match entry.direction {
            Direction::Asc => compare_values(&left, &right),
            Direction::Desc => compare_values(&right, &left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn aggregate(
    function: AggregateFunction,
    column: &str,
    values: &[Value],
) -> Result<Value, ExecutionError> {
    match function {
        AggregateFunction::Min => Ok(values
            .iter()
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFunction::Max => Ok(values
            .iter()
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFunction::Sum | AggregateFunction::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let numbers: Vec<&serde_json::Number> = values
                .iter()
                .map(|v| match v {
                    Value::Number(n) => Ok(n),
                    _ => Err(ExecutionError::backend(format!(
                        "function {}() does not accept non-numeric column {column}",
                        function.to_sql().to_lowercase()
                    ))),
                })
                .collect::<Result<_, _>>()?;

            let integers: Option<Vec<i64>> = numbers.iter().map(|n| n.as_i64()).collect();
            let floats: Vec<f64> = numbers.iter().filter_map(|n| n.as_f64()).collect();
            Ok(match (function, integers) {
                (AggregateFunction::Sum, Some(integers)) => json!(integers.iter().sum::<i64>()),
                (AggregateFunction::Sum, None) => json!(floats.iter().sum::<f64>()),
                _ => json!(floats.iter().sum::<f64>() / floats.len() as f64),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::{JoinStep, ProjectedColumn};

    fn database() -> InMemoryDatabase {
        let db = InMemoryDatabase::new();
        db.insert_all(
            "users",
            vec![json!({"id": 1, "name": "ann"}), json!({"id": 2, "name": "bob"})],
        );
        db.insert_all(
            "posts",
            vec![
                json!({"id": 10, "user_id": 1, "score": 3}),
                json!({"id": 11, "user_id": 1, "score": null}),
                json!({"id": 12, "user_id": 9, "score": 5}),
            ],
        );
        db
    }

    fn posts_join(join_type: JoinType) -> JoinStep {
        JoinStep {
            from_alias: "users".to_string(),
            to_table: "posts".to_string(),
            to_alias: "posts".to_string(),
            join_type,
            on: vec![WhereClause::columns("posts.user_id", Operator::Eq, "users.id")],
            applied_scopes: Vec::new(),
            target_class: "Post".to_string(),
            association: "posts".to_string(),
        }
    }

    #[tokio::test]
    async fn test_left_join_keeps_unmatched_rows() {
        let db = database();
        let mut command = SelectCommand::new("users", "users");
        command.joins.push(posts_join(JoinType::Left));
        command.projection = Projection::Columns(vec![
            ProjectedColumn {
                column: "users.id".to_string(),
                label: "u".to_string(),
            },
            ProjectedColumn {
                column: "posts.id".to_string(),
                label: "p".to_string(),
            },
        ]);
        command.order_by = vec![OrderBy::asc("users.id"), OrderBy::asc("posts.id")];

        let rows = db.fetch_rows(&command, None).await.unwrap();
        let pairs: Vec<(Value, Value)> = rows
            .iter()
            .map(|r| (r["u"].clone(), r["p"].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (json!(1), json!(10)),
                (json!(1), json!(11)),
                (json!(2), Value::Null)
            ]
        );
    }

    #[tokio::test]
    async fn test_null_comparisons_are_unknown() {
        let db = database();
        let mut command = SelectCommand::new("posts", "posts");
        command
            .where_clauses
            .push(WhereClause::simple("posts.score", Operator::Lt, json!(10)).negate());
        // NOT (NULL < 10) is unknown, so the NULL-score row is excluded too
        assert!(db.fetch_rows(&command, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregates_skip_nulls() {
        let db = database();
        let mut command = SelectCommand::new("posts", "posts");
        command.projection = Projection::Aggregate {
            function: AggregateFunction::Avg,
            column: "posts.score".to_string(),
        };
        let rows = db.fetch_rows(&command, None).await.unwrap();
        assert_eq!(rows[0][projection_labels::AGGREGATE], json!(4.0));
    }

    #[tokio::test]
    async fn test_foreign_handles_are_rejected() {
        let db = database();
        let other = InMemoryDatabase::new();
        let command = SelectCommand::new("users", "users");

        let err = db.fetch_rows(&command, Some(&other.begin())).await.unwrap_err();
        assert!(matches!(err, ExecutionError::ForeignTransaction(_)));

        let tx = db.begin();
        db.fetch_rows(&command, Some(&tx)).await.unwrap();
        assert_eq!(db.statements().last().unwrap().transaction, Some(tx.id()));
    }

    #[tokio::test]
    async fn test_delete_removes_matching_rows() {
        let db = database();
        let command = DeleteCommand::new("posts", vec![WhereClause::eq("posts.user_id", 1)]);
        assert_eq!(db.execute_delete(&command, None).await.unwrap(), 2);
        assert_eq!(db.rows("posts").len(), 1);
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like("hello", "h%o"));
        assert!(like("hello", "_ello"));
        assert!(!like("hello", "h_o"));
    }
}
