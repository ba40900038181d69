//! # Engine Constants
//!
//! Names and limits shared by the registry, the scope composer and the
//! join-path compiler.

/// Built-in default scope names
pub mod scope_names {
    /// Single-table-inheritance discriminant filter
    pub const STI: &str = "sti";
    /// Soft-delete filter installed by `ModelClass::soft_delete`
    pub const SOFT_DELETE: &str = "soft_delete";
}

/// Default column holding the STI discriminant value
pub const DEFAULT_DISCRIMINANT_COLUMN: &str = "type";

/// Default primary key column
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Suffix appended to a singularized table name to derive a foreign key
pub const FOREIGN_KEY_SUFFIX: &str = "_id";

/// Suffix used for the type column of a polymorphic foreign key
pub const POLYMORPHIC_TYPE_SUFFIX: &str = "_type";

/// Default upper bound on join steps emitted for one association path
pub const DEFAULT_MAX_ASSOCIATION_DEPTH: usize = 12;

/// Default page size for offset and cursor pagination
pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Projection labels used for scalar results
pub mod projection_labels {
    pub const COUNT: &str = "count";
    pub const AGGREGATE: &str = "aggregate";
    /// Prefix of the ORDER BY columns re-projected for an enclosing query
    pub const SORT_KEY: &str = "__graphload_sort_";
}
