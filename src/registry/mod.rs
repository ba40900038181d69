//! # Association Metadata Registry
//!
//! Per-model-class tables of association descriptors, built once at boot.
//!
//! ## Overview
//!
//! ```text
//! RegistryBuilder
//! ├── register_model(ModelClass)          (tables, columns, scopes, STI)
//! ├── register(owner, AssociationDescriptor)
//! └── build() -> ModelRegistry            (through/source validation, freeze)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use graphload_core::models::ModelClass;
//! use graphload_core::registry::{AssociationDescriptor, RegistryBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .register_model(ModelClass::new("User", "users"))?
//!     .register_model(ModelClass::new("Post", "posts"))?
//!     .register("User", AssociationDescriptor::has_many("posts", "Post"))?
//!     .register("Post", AssociationDescriptor::belongs_to("user", "User"))?;
//! let registry = builder.build()?;
//!
//! assert_eq!(registry.lookup("User", "posts")?.foreign_key, "user_id");
//! # Ok(())
//! # }
//! ```

pub mod association;
pub mod builder;
pub mod inflection;
pub mod model_registry;

pub use association::{
    AssociationConditions, AssociationDescriptor, AssociationKind, ConditionValue, Dependent,
    DistinctOn,
};
pub use builder::RegistryBuilder;
pub use model_registry::ModelRegistry;
