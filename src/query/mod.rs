//! # Query Builder Facade
//!
//! The public, chainable query surface.
//!
//! - [`state`] - the immutable [`QueryState`] every builder call derives
//! - [`builder`] - [`Query`] and its `QueryState -> QueryState` methods
//! - [`execution`] - compilation and the terminal methods (`all`, `first`,
//!   `count`, `pluck`, aggregates)
//! - [`association_query`] - queries scoped to one record's association
//! - [`pagination`] - offset and cursor pagination
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use graphload_core::query_builder::WhereClause;
//! use graphload_core::Engine;
//!
//! # async fn example(engine: &Engine) -> graphload_core::Result<()> {
//! let published = engine
//!     .query("Post")
//!     .where_clause(WhereClause::eq("published", true))
//!     .preload(["comments", "user"])
//!     .order_desc("score");
//!
//! let top = published.clone().limit(10).all().await?;
//! let total = published.count().await?;
//! # let _ = (top, total);
//! # Ok(())
//! # }
//! ```

pub mod association_query;
pub mod builder;
pub mod execution;
pub mod pagination;
pub mod state;

pub use builder::Query;
pub use execution::CompiledQuery;
pub use pagination::{Page, PageRequest, ScrollPage, ScrollRequest};
pub use state::{Focus, JoinRequest, QueryState};
