//! # Preload Tree Builder & Materializer
//!
//! Eager loading of association graphs onto already-fetched records.
//!
//! ## Strategies
//!
//! - [`batched`]: one `WHERE key IN (...)` SELECT per tree node, parents
//!   before children, siblings concurrently
//! - [`left_join`]: the whole tree compiled into one statement with a LEFT
//!   JOIN per node, the graph rebuilt from the flat rows
//!
//! Both strategies key loaded associations by node alias, order each list
//! by the association's declared order (then primary key) and apply
//! declared distinct afterwards, so the same request yields the same graph
//! either way. Associations a request does not name are left untouched.

pub mod batched;
pub mod left_join;
pub mod postprocess;
pub mod tree;

pub use batched::{preload, PreloadContext};
pub use left_join::{extract_alias, LeftJoinPlan, PlanContext};
pub use postprocess::{compare_values, finalize};
pub use tree::{build_tree, merge, validate, PreloadArg, PreloadModifier, PreloadNode};

/// How a query materializes its preload tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreloadStrategy {
    #[default]
    Batched,
    LeftJoin,
}

impl PreloadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreloadStrategy::Batched => "batched",
            PreloadStrategy::LeftJoin => "left_join",
        }
    }
}
