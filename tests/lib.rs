//! Integration tests for the structured SQL command shape.
//!
//! These exercise `graphload_core::query_builder` directly, without an
//! engine or an execution layer.

mod query_builder;
