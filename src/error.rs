//! Error types for the graphload engine.
//!
//! Errors fall into four kinds: configuration errors raised while the model
//! registry is being built, compilation errors raised while a single query is
//! compiled, execution errors raised by the SQL layer, and association access
//! errors raised when reading an association that was never loaded.

use thiserror::Error;

/// Registration-time failures. Fatal at boot, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Model {model} is already registered")]
    DuplicateModel { model: String },

    #[error("Unknown model: {model}")]
    UnknownModel { model: String },

    #[error("Association {association} is already declared on {model}")]
    DuplicateAssociation { model: String, association: String },

    #[error("Unknown association {association} on {model}")]
    UnknownAssociation { model: String, association: String },

    #[error("Invalid options for association {association} on {model}: {reason}")]
    InvalidAssociationOptions {
        model: String,
        association: String,
        reason: String,
    },

    #[error(
        "Association {association} on {model} is polymorphic over {candidates:?} and requires an explicit foreign key"
    )]
    MissingForeignKey {
        model: String,
        association: String,
        candidates: Vec<String>,
    },

    #[error("STI parent {parent} of {model} is not registered")]
    UnknownStiParent { model: String, parent: String },

    #[error("Discriminant value {value} is claimed by both {first} and {second}")]
    DuplicateDiscriminant {
        value: String,
        first: String,
        second: String,
    },
}

/// Per-query failures surfaced before any SQL is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    #[error("Unknown association {association} on {model}")]
    UnknownAssociation { model: String, association: String },

    #[error("Alias {alias} is used by more than one association")]
    AliasCollision { alias: String },

    #[error("Unknown alias {alias} referenced in {reference}")]
    UnknownAlias { alias: String, reference: String },

    #[error("Association path {path} exceeds the maximum of {max} join steps")]
    DepthExceeded { path: String, max: usize },

    #[error("Incompatible query combination: {0}")]
    IncompatibleCombination(String),

    #[error("Cannot join polymorphic belongs-to {association} on {model} across {candidates:?}")]
    PolymorphicJoin {
        model: String,
        association: String,
        candidates: Vec<String>,
    },

    #[error("Association {association} requires a value for {column}")]
    MissingRequiredCondition { association: String, column: String },

    #[error("Invalid association path {0:?}")]
    InvalidPath(String),

    #[error("Invalid page size {0}")]
    InvalidPageSize(u32),

    #[error("Model {model} has no column {column}")]
    UnknownColumn { model: String, column: String },

    #[error("Registry error: {0}")]
    Registry(ConfigurationError),
}

/// Registry lookups made while compiling a query report unknown
/// associations as compilation errors
impl From<ConfigurationError> for CompilationError {
    fn from(err: ConfigurationError) -> Self {
        match err {
            ConfigurationError::UnknownAssociation { model, association } => {
                CompilationError::UnknownAssociation { model, association }
            }
            other => CompilationError::Registry(other),
        }
    }
}

/// Failures raised by the SQL execution layer, preserved as the cause.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Execution backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transaction handle {0} is not usable by this executor")]
    ForeignTransaction(uuid::Uuid),

    #[error("Row decoding error: {0}")]
    Decode(String),
}

impl ExecutionError {
    pub fn backend(message: impl Into<String>) -> Self {
        ExecutionError::Backend {
            message: message.into(),
            source: None,
        }
    }
}

/// Access to an association that was never explicitly loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssociationError {
    #[error("Association {association} on {model} has not been loaded")]
    NotLoaded { model: String, association: String },

    #[error("Association {association} on {model} is a {actual} association")]
    WrongCardinality {
        model: String,
        association: String,
        actual: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum GraphloadError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Compilation error: {0}")]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Association error: {0}")]
    Association(#[from] AssociationError),

    #[error("Lifecycle hook failed for {model}: {source}")]
    Hook {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<sqlx::Error> for GraphloadError {
    fn from(err: sqlx::Error) -> Self {
        GraphloadError::Execution(ExecutionError::Database(err))
    }
}

pub type Result<T> = std::result::Result<T, GraphloadError>;
