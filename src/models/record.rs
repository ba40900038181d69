//! Materialized model instances.
//!
//! Associations are held in an explicit loaded-associations map. Reading an
//! association that no load call populated is an error, never an implicit
//! fetch.

use crate::error::AssociationError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One result row keyed by column label
pub type Row = Map<String, Value>;

/// The loaded value of one association on one record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoadedAssociation {
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

impl LoadedAssociation {
    pub fn len(&self) -> usize {
        match self {
            LoadedAssociation::One(Some(_)) => 1,
            LoadedAssociation::One(None) => 0,
            LoadedAssociation::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record held, in order
    pub fn records(&self) -> Vec<&Record> {
        match self {
            LoadedAssociation::One(Some(record)) => vec![record.as_ref()],
            LoadedAssociation::One(None) => Vec::new(),
            LoadedAssociation::Many(records) => records.iter().collect(),
        }
    }

    pub(crate) fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            LoadedAssociation::One(Some(record)) => vec![record.as_mut()],
            LoadedAssociation::One(None) => Vec::new(),
            LoadedAssociation::Many(records) => records.iter_mut().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    class: String,
    primary_key: String,
    attributes: Row,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    associations: BTreeMap<String, LoadedAssociation>,
}

impl Record {
    pub fn new(class: &str, primary_key: &str, attributes: Row) -> Self {
        Self {
            class: class.to_string(),
            primary_key: primary_key.to_string(),
            attributes,
            associations: BTreeMap::new(),
        }
    }

    /// Name of the model class this row was marshaled into
    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn primary_key_column(&self) -> &str {
        &self.primary_key
    }

    pub fn id(&self) -> Option<&Value> {
        self.attributes
            .get(&self.primary_key)
            .filter(|value| !value.is_null())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn is_loaded(&self, association: &str) -> bool {
        self.associations.contains_key(association)
    }

    pub fn loaded_associations(&self) -> impl Iterator<Item = &str> {
        self.associations.keys().map(String::as_str)
    }

    pub fn association(&self, name: &str) -> Result<&LoadedAssociation, AssociationError> {
        self.associations
            .get(name)
            .ok_or_else(|| AssociationError::NotLoaded {
                model: self.class.clone(),
                association: name.to_string(),
            })
    }

    /// Records of a loaded has-many association
    pub fn many(&self, name: &str) -> Result<&[Record], AssociationError> {
        match self.association(name)? {
            LoadedAssociation::Many(records) => Ok(records),
            LoadedAssociation::One(_) => Err(AssociationError::WrongCardinality {
                model: self.class.clone(),
                association: name.to_string(),
                actual: "singular",
            }),
        }
    }

    /// Record of a loaded belongs-to / has-one association
    pub fn one(&self, name: &str) -> Result<Option<&Record>, AssociationError> {
        match self.association(name)? {
            LoadedAssociation::One(record) => Ok(record.as_deref()),
            LoadedAssociation::Many(_) => Err(AssociationError::WrongCardinality {
                model: self.class.clone(),
                association: name.to_string(),
                actual: "plural",
            }),
        }
    }

    /// Replace the loaded value of one association; others are untouched
    pub fn set_association(&mut self, name: &str, value: LoadedAssociation) {
        self.associations.insert(name.to_string(), value);
    }

    pub(crate) fn association_mut(&mut self, name: &str) -> Option<&mut LoadedAssociation> {
        self.associations.get_mut(name)
    }
}

/// Stable string key for a primary-key (or foreign-key) value
pub fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
