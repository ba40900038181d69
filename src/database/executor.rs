//! SQL execution boundary.
//!
//! The engine compiles structured commands and hands them to a
//! [`SqlExecutor`]; it never talks to a connection directly. Every call
//! carries the caller's transaction handle, if any, so all round-trips of
//! one logical operation share it.

use crate::error::ExecutionError;
use crate::logging::{log_error, log_query_operation};
use crate::models::Row;
use crate::query_builder::{DeleteCommand, SelectCommand};
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Opaque transaction handle obtained from the execution layer.
///
/// The engine only forwards it; opening, committing and rolling back are
/// the execution layer's business.
#[derive(Clone)]
pub struct TransactionHandle {
    id: Uuid,
    inner: Arc<dyn Any + Send + Sync>,
}

impl TransactionHandle {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Borrow the executor-specific payload
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .finish()
    }
}

impl PartialEq for TransactionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// The external SQL execution layer
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a SELECT (plain, COUNT or aggregate) and return each result row
    /// as a JSON object keyed by projection label
    async fn fetch_rows(
        &self,
        command: &SelectCommand,
        transaction: Option<&TransactionHandle>,
    ) -> Result<Vec<Row>, ExecutionError>;

    /// Run a DELETE and return the number of affected rows
    async fn execute_delete(
        &self,
        command: &DeleteCommand,
        transaction: Option<&TransactionHandle>,
    ) -> Result<u64, ExecutionError>;
}

/// Run a SELECT through `executor`, logging the round-trip
pub(crate) async fn run_select(
    executor: &dyn SqlExecutor,
    command: &SelectCommand,
    transaction: Option<&TransactionHandle>,
    log_sql: bool,
    operation: &str,
) -> Result<Vec<Row>, ExecutionError> {
    if log_sql {
        tracing::debug!(sql = %command.build_sql(), operation = %operation, "executing select");
    }
    let start = Instant::now();
    let tx_id = transaction.map(|t| t.id().to_string());
    match executor.fetch_rows(command, transaction).await {
        Ok(rows) => {
            log_query_operation(
                operation,
                &command.table,
                rows.len(),
                start.elapsed().as_millis() as u64,
                tx_id.as_deref(),
                "success",
            );
            Ok(rows)
        }
        Err(err) => {
            log_error("executor", operation, &err.to_string(), Some(&command.table));
            Err(err)
        }
    }
}

/// Run a DELETE through `executor`, logging the round-trip
pub(crate) async fn run_delete(
    executor: &dyn SqlExecutor,
    command: &DeleteCommand,
    transaction: Option<&TransactionHandle>,
    log_sql: bool,
) -> Result<u64, ExecutionError> {
    if log_sql {
        tracing::debug!(sql = %command.build_sql(), "executing delete");
    }
    let start = Instant::now();
    let tx_id = transaction.map(|t| t.id().to_string());
    match executor.execute_delete(command, transaction).await {
        Ok(affected) => {
            log_query_operation(
                "delete",
                &command.table,
                affected as usize,
                start.elapsed().as_millis() as u64,
                tx_id.as_deref(),
                "success",
            );
            Ok(affected)
        }
        Err(err) => {
            log_error("executor", "delete", &err.to_string(), Some(&command.table));
            Err(err)
        }
    }
}
