pub mod model_class;
pub mod record;

pub use model_class::{Column, DbType, DefaultScope, ModelClass, StiConfig, StiRole};
pub use record::{value_key, LoadedAssociation, Record, Row};
