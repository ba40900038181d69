//! PostgreSQL implementation of the execution boundary on `sqlx`.
//!
//! Every SELECT is wrapped as `SELECT row_to_json(q) FROM (...) q` so that
//! any projection shape (model columns, labeled preload columns, counts,
//! aggregates) decodes into one JSON object per row. A subquery's ORDER BY
//! does not bind the enclosing query, so ordered statements also project
//! their sort columns and the wrapper orders by them again.

use super::executor::{SqlExecutor, TransactionHandle};
use crate::constants::projection_labels::SORT_KEY;
use crate::error::ExecutionError;
use crate::models::Row;
use crate::query_builder::conditions::quote_ident;
use crate::query_builder::{DeleteCommand, SelectCommand};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

type PgTransactionSlot = Mutex<Option<Transaction<'static, Postgres>>>;

#[derive(Debug, Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, ExecutionError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a transaction and wrap it in a handle the engine can forward
    pub async fn begin(&self) -> Result<TransactionHandle, ExecutionError> {
        let transaction = self.pool.begin().await?;
        let handle = TransactionHandle::new(PgTransactionSlot::new(Some(transaction)));
        debug!(transaction = %handle.id(), "opened transaction");
        Ok(handle)
    }

    pub async fn commit(&self, handle: &TransactionHandle) -> Result<(), ExecutionError> {
        let transaction = Self::take(handle).await?;
        transaction.commit().await?;
        debug!(transaction = %handle.id(), "committed transaction");
        Ok(())
    }

    pub async fn rollback(&self, handle: &TransactionHandle) -> Result<(), ExecutionError> {
        let transaction = Self::take(handle).await?;
        transaction.rollback().await?;
        debug!(transaction = %handle.id(), "rolled back transaction");
        Ok(())
    }

    async fn take(
        handle: &TransactionHandle,
    ) -> Result<Transaction<'static, Postgres>, ExecutionError> {
        let slot = handle
            .downcast::<PgTransactionSlot>()
            .ok_or(ExecutionError::ForeignTransaction(handle.id()))?;
        slot.lock()
            .await
            .take()
            .ok_or_else(|| ExecutionError::backend("transaction already finished"))
    }

    fn slot(handle: &TransactionHandle) -> Result<&PgTransactionSlot, ExecutionError> {
        handle
            .downcast::<PgTransactionSlot>()
            .ok_or(ExecutionError::ForeignTransaction(handle.id()))
    }

    /// The statement actually sent for `command`
    fn select_sql(command: &SelectCommand) -> String {
        if !command.has_sort_keys() {
            return format!("SELECT row_to_json(q) FROM ({}) q", command.build_sql());
        }
        let outer: Vec<String> = command
            .order_by
            .iter()
            .enumerate()
            .map(|(index, order)| {
                format!(
                    "q.{} {}",
                    quote_ident(&format!("{SORT_KEY}{index}")),
                    order.direction.to_sql()
                )
            })
            .collect();
        format!(
            "SELECT row_to_json(q) FROM ({}) q ORDER BY {}",
            command.build_sql_with_sort_keys(SORT_KEY),
            outer.join(", ")
        )
    }

    fn decode(values: Vec<Value>) -> Result<Vec<Row>, ExecutionError> {
        values
            .into_iter()
            .map(|value| match value {
                Value::Object(mut row) => {
                    row.retain(|key, _| !key.starts_with(SORT_KEY));
                    Ok(row)
                }
                other => Err(ExecutionError::Decode(format!(
                    "expected a JSON object per row, got {other}"
                ))),
            })
            .collect()
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn fetch_rows(
        &self,
        command: &SelectCommand,
        transaction: Option<&TransactionHandle>,
    ) -> Result<Vec<Row>, ExecutionError> {
        let sql = Self::select_sql(command);
        let start = Instant::now();

        let values: Vec<Value> = match transaction {
            Some(handle) => {
                let mut guard = Self::slot(handle)?.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| ExecutionError::backend("transaction already finished"))?;
                sqlx::query_scalar(&sql).fetch_all(&mut **conn).await?
            }
            None => sqlx::query_scalar(&sql).fetch_all(&self.pool).await?,
        };

        debug!(
            table = %command.table,
            rows = values.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "postgres select"
        );
        Self::decode(values)
    }

    async fn execute_delete(
        &self,
        command: &DeleteCommand,
        transaction: Option<&TransactionHandle>,
    ) -> Result<u64, ExecutionError> {
        let sql = command.build_sql();
        let result = match transaction {
            Some(handle) => {
                let mut guard = Self::slot(handle)?.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| ExecutionError::backend("transaction already finished"))?;
                sqlx::query(&sql).execute(&mut **conn).await?
            }
            None => sqlx::query(&sql).execute(&self.pool).await?,
        };
        debug!(table = %command.table, rows = result.rows_affected(), "postgres delete");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::OrderBy;
    use serde_json::json;

    #[test]
    fn test_decode_rejects_non_object_rows() {
        let rows = PgExecutor::decode(vec![json!({"id": 1})]).unwrap();
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
        assert!(matches!(
            PgExecutor::decode(vec![json!(1)]),
            Err(ExecutionError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_drops_sort_keys() {
        let rows = PgExecutor::decode(vec![json!({"id": 1, "__graphload_sort_0": 1})]).unwrap();
        assert_eq!(rows[0].len(), 1);
    }

    #[test]
    fn test_ordered_select_repeats_its_order_outside() {
        let mut command = SelectCommand::new("posts", "posts");
        command.order_by.push(OrderBy::desc("posts.score"));
        assert_eq!(
            PgExecutor::select_sql(&command),
            r#"SELECT row_to_json(q) FROM (SELECT "posts".*, "posts"."score" AS "__graphload_sort_0" FROM "posts" AS "posts" ORDER BY "posts"."score" DESC) q ORDER BY q."__graphload_sort_0" DESC"#
        );

        command.order_by.clear();
        assert_eq!(
            PgExecutor::select_sql(&command),
            r#"SELECT row_to_json(q) FROM (SELECT "posts".* FROM "posts" AS "posts") q"#
        );
    }

    #[tokio::test]
    async fn test_foreign_handle_is_rejected() {
        let handle = TransactionHandle::new("not a postgres transaction");
        assert!(matches!(
            PgExecutor::take(&handle).await,
            Err(ExecutionError::ForeignTransaction(_))
        ));
    }
}
