//! # Database Boundary
//!
//! The engine's only route to storage.
//!
//! - [`executor`] - the [`SqlExecutor`] trait and the opaque [`TransactionHandle`]
//! - [`postgres`] - [`PgExecutor`], the `sqlx` PostgreSQL implementation
//!
//! Tests use the in-memory implementation in
//! [`test_helpers`](crate::test_helpers).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use graphload_core::database::PgExecutor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = PgExecutor::connect("postgresql://localhost/graphload_development").await?;
//! let tx = executor.begin().await?;
//! // ... run queries with `.transaction(&tx)` ...
//! executor.commit(&tx).await?;
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod postgres;

pub use executor::{SqlExecutor, TransactionHandle};
pub use postgres::PgExecutor;
