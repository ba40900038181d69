//! # Join-Path Compiler
//!
//! Turns a dotted association reference such as `"posts as p.comments"`
//! into an ordered list of [`JoinStep`](crate::query_builder::JoinStep)s.
//!
//! - [`path`] parses the reference into hops
//! - [`compiler`] resolves each hop against the registry, expanding through
//!   associations and narrowing polymorphic targets
//!
//! The default alias of a hop is its association name. Compilation is a
//! pure function of the registry and the path: the same input always gives
//! the same steps.

pub mod compiler;
pub mod path;

pub use compiler::{Budget, CompiledHop, CompiledPath, JoinPathCompiler, TargetPredicates};
pub use path::{AssociationPath, Hop};
