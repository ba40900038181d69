//! Query Builder Tests Module
//!
//! Rendering of the command values the engine hands to the execution
//! layer: SELECT / DELETE commands, WHERE clauses, join steps and
//! pagination.

pub mod builder;
pub mod conditions;
pub mod joins;
pub mod pagination;
