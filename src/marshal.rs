//! # STI / Polymorphic Row Marshaling
//!
//! Turns fetched rows into [`Record`]s of the most specific registered
//! class. Marshaling is total: a discriminant that resolves to no class
//! degrades to the queried class instead of failing.

use crate::constants::DEFAULT_PRIMARY_KEY;
use crate::models::{Record, Row};
use crate::registry::{AssociationDescriptor, ModelRegistry};
use serde_json::Value;
use tracing::trace;

/// Build a record for a row fetched as `queried_class`
pub fn marshal(registry: &ModelRegistry, row: Row, queried_class: &str) -> Record {
    let class = resolve_class(registry, &row, queried_class);
    let primary_key = registry
        .class(&class)
        .map(|model| model.primary_key.clone())
        .unwrap_or_else(|_| DEFAULT_PRIMARY_KEY.to_string());
    Record::new(&class, &primary_key, row)
}

/// Most specific class for `row`: the registered class extending
/// `queried_class` that claims the row's discriminant value
pub fn resolve_class(registry: &ModelRegistry, row: &Row, queried_class: &str) -> String {
    let Ok(model) = registry.class(queried_class) else {
        return queried_class.to_string();
    };
    let Some(column) = model.discriminant_column() else {
        return queried_class.to_string();
    };
    let Some(Value::String(value)) = row.get(column) else {
        return queried_class.to_string();
    };
    if model.discriminant_value() == Some(value.as_str()) {
        return queried_class.to_string();
    }

    match registry.find_extending_class(queried_class, value) {
        Some(found) => found.name.clone(),
        None => {
            trace!(
                model = %queried_class,
                discriminant = %value,
                "unresolved discriminant, keeping queried class"
            );
            queried_class.to_string()
        }
    }
}

/// Candidate class named by the owner row's polymorphic type column
pub fn polymorphic_class(
    registry: &ModelRegistry,
    owner_row: &Row,
    descriptor: &AssociationDescriptor,
) -> Option<String> {
    let type_field = descriptor.foreign_key_type_field.as_deref()?;
    let Some(Value::String(stored)) = owner_row.get(type_field) else {
        return None;
    };
    descriptor
        .targets
        .iter()
        .find(|candidate| {
            *candidate == *stored || registry.polymorphic_type_name(candidate) == *stored
        })
        .cloned()
}
