//! Lifecycle hook dispatch boundary.
//!
//! The engine never runs hook logic itself. When a record is destroyed
//! through a path that touches associations (dependent destroy), the
//! engine calls the collaborator installed on the [`Engine`](crate::Engine).

use crate::database::TransactionHandle;
use crate::models::Record;
use async_trait::async_trait;

pub type HookError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Called once per destroyed record, after its DELETE ran
    async fn after_destroy(
        &self,
        record: &Record,
        transaction: Option<&TransactionHandle>,
    ) -> Result<(), HookError>;
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl LifecycleHooks for NoopHooks {
    async fn after_destroy(
        &self,
        _record: &Record,
        _transaction: Option<&TransactionHandle>,
    ) -> Result<(), HookError> {
        Ok(())
    }
}
