//! Model class descriptors.
//!
//! One `ModelClass` per declared entity. Built at boot, handed to the
//! registry, and never mutated afterwards.

use crate::constants::{scope_names, DEFAULT_DISCRIMINANT_COLUMN, DEFAULT_PRIMARY_KEY};
use crate::query_builder::WhereClause;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Database type of a declared column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    Integer,
    BigInt,
    Numeric,
    Text,
    Boolean,
    Timestamp,
    Json,
    Uuid,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub db_type: DbType,
}

/// A predicate applied to every query against a model unless bypassed by name
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultScope {
    pub name: String,
    /// Clause over bare column names of the model's table
    pub clause: WhereClause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StiRole {
    Base,
    Child { parent: String, value: String },
}

/// Single-table-inheritance configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StiConfig {
    pub discriminant_column: String,
    pub role: StiRole,
}

/// Descriptor of one declared entity
#[derive(Debug, Clone, PartialEq)]
pub struct ModelClass {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<Column>,
    pub default_scopes: Vec<DefaultScope>,
    pub sti: Option<StiConfig>,
    pub serializer_keys: BTreeMap<String, String>,
}

impl ModelClass {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            columns: Vec::new(),
            default_scopes: Vec::new(),
            sti: None,
            serializer_keys: BTreeMap::new(),
        }
    }

    /// A class sharing `parent`'s table, told apart by `value` in the
    /// discriminant column. Table, primary key and discriminant column are
    /// inherited from the parent when the class is registered.
    pub fn sti_child(name: &str, parent: &str, value: &str) -> Self {
        let mut class = Self::new(name, "");
        class.sti = Some(StiConfig {
            discriminant_column: DEFAULT_DISCRIMINANT_COLUMN.to_string(),
            role: StiRole::Child {
                parent: parent.to_string(),
                value: value.to_string(),
            },
        });
        class
    }

    pub fn primary_key(mut self, column: &str) -> Self {
        self.primary_key = column.to_string();
        self
    }

    pub fn column(mut self, name: &str, db_type: DbType) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            db_type,
        });
        self
    }

    pub fn default_scope(mut self, name: &str, clause: WhereClause) -> Self {
        self.default_scopes.push(DefaultScope {
            name: name.to_string(),
            clause,
        });
        self
    }

    /// Hide rows whose `column` is set
    pub fn soft_delete(self, column: &str) -> Self {
        self.default_scope(scope_names::SOFT_DELETE, WhereClause::is_null(column))
    }

    /// Mark this class as the base of an STI family using the `type` column
    pub fn sti_base(self) -> Self {
        self.sti_base_on(DEFAULT_DISCRIMINANT_COLUMN)
    }

    pub fn sti_base_on(mut self, discriminant_column: &str) -> Self {
        self.sti = Some(StiConfig {
            discriminant_column: discriminant_column.to_string(),
            role: StiRole::Base,
        });
        self
    }

    pub fn serializer(mut self, key: &str, serializer: &str) -> Self {
        self.serializer_keys
            .insert(key.to_string(), serializer.to_string());
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == self.primary_key || self.columns.iter().any(|c| c.name == name)
    }

    /// Declared column names with the primary key first
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![self.primary_key.clone()];
        names.extend(
            self.columns
                .iter()
                .filter(|c| c.name != self.primary_key)
                .map(|c| c.name.clone()),
        );
        names
    }

    pub fn is_sti(&self) -> bool {
        self.sti.is_some()
    }

    pub fn sti_parent(&self) -> Option<&str> {
        match &self.sti {
            Some(StiConfig {
                role: StiRole::Child { parent, .. },
                ..
            }) => Some(parent),
            _ => None,
        }
    }

    pub fn discriminant_value(&self) -> Option<&str> {
        match &self.sti {
            Some(StiConfig {
                role: StiRole::Child { value, .. },
                ..
            }) => Some(value),
            _ => None,
        }
    }

    pub fn discriminant_column(&self) -> Option<&str> {
        self.sti.as_ref().map(|s| s.discriminant_column.as_str())
    }
}
