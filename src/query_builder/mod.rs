//! # Query Builder System
//!
//! The structured command shape the engine hands to the SQL execution layer.
//!
//! ## Key Components
//!
//! - [`builder`] - `SelectCommand` / `DeleteCommand` and their SQL rendering
//! - [`conditions`] - WHERE clause building over JSON values
//! - [`joins`] - compiled join steps (INNER / LEFT)
//! - [`pagination`] - LIMIT/OFFSET arithmetic
//!
//! Commands are plain values. They can be rendered to PostgreSQL text with
//! `build_sql()` or evaluated structurally by an in-process executor.

pub mod builder;
pub mod conditions;
pub mod joins;
pub mod pagination;

pub use builder::{
    AggregateFunction, DeleteCommand, Direction, Distinct, OrderBy, ProjectedColumn, Projection,
    SelectCommand,
};
pub use conditions::{Condition, LogicalOperator, Operator, WhereClause};
pub use joins::{JoinStep, JoinType};
pub use pagination::Pagination;
