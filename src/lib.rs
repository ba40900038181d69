#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Graphload Core
//!
//! Association resolution, join-path compilation and preload materialization
//! for a declarative relational model layer.
//!
//! ## Overview
//!
//! Model classes and their associations are registered once at boot into a
//! frozen [`ModelRegistry`](registry::ModelRegistry). Queries are immutable
//! values built through a chainable facade; every terminal call compiles the
//! query into a structured SQL command, hands it to the external execution
//! layer and marshals the rows into [`Record`](models::Record)s of the most
//! specific registered class, with requested associations preloaded.
//!
//! ## Architecture
//!
//! ```text
//! RegistryBuilder ──build──> ModelRegistry (write once, read many)
//!                                 │
//! Engine::query(class) ──> Query ─┼─> join_path  (association paths -> JoinSteps)
//!                                 ├─> scopes     (default scopes, STI filter)
//!                                 ├─> preload    (batched / left join trees)
//!                                 └─> marshal    (rows -> records)
//!                                 │
//!                          SqlExecutor (PostgreSQL via sqlx, or in memory)
//! ```
//!
//! ## Module Organization
//!
//! - [`models`] - model class descriptors and materialized records
//! - [`registry`] - association metadata registry
//! - [`scopes`] - default scope composition
//! - [`join_path`] - association path parsing and join compilation
//! - [`preload`] - preload trees and both materialization strategies
//! - [`marshal`] - STI / polymorphic row marshaling
//! - [`query`] - the query facade, terminal methods and pagination
//! - [`query_builder`] - the structured SQL command shape
//! - [`database`] - the SQL execution boundary and the PostgreSQL adapter
//! - [`hooks`] - lifecycle hook dispatch boundary
//! - [`config`] / [`logging`] / [`error`] - ambient configuration, tracing and errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphload_core::database::PgExecutor;
//! use graphload_core::models::ModelClass;
//! use graphload_core::registry::{AssociationDescriptor, RegistryBuilder};
//! use graphload_core::Engine;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .register_model(ModelClass::new("User", "users"))?
//!     .register_model(ModelClass::new("Post", "posts"))?
//!     .register("User", AssociationDescriptor::has_many("posts", "Post"))?;
//! let registry = builder.build()?;
//!
//! let executor = PgExecutor::connect("postgresql://localhost/graphload_development").await?;
//! let engine = Engine::new(registry, Arc::new(executor));
//!
//! if let Some(user) = engine.query("User").preload(["posts"]).first().await? {
//!     println!("{} posts", user.many("posts")?.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! [`test_helpers`] provides an in-memory execution layer and a fixture
//! schema, so the whole engine can be exercised without a database:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod join_path;
pub mod logging;
pub mod marshal;
pub mod models;
pub mod preload;
pub mod query;
pub mod query_builder;
pub mod registry;
pub mod scopes;
pub mod test_helpers;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{
    AssociationError, CompilationError, ConfigurationError, ExecutionError, GraphloadError, Result,
};
pub use hooks::{LifecycleHooks, NoopHooks};
pub use models::{LoadedAssociation, ModelClass, Record};
pub use preload::{PreloadArg, PreloadStrategy};
pub use query::{Page, PageRequest, Query, ScrollPage, ScrollRequest};
pub use registry::{AssociationDescriptor, ModelRegistry, RegistryBuilder};
