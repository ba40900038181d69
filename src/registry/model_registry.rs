//! # Model Registry
//!
//! Immutable, process-wide table of model classes and their associations.
//!
//! Produced once by [`RegistryBuilder::build`](super::RegistryBuilder::build)
//! and shared behind an `Arc` afterwards. Nothing here takes a lock: the
//! registry is never written after boot.
//!
//! STI is represented as a flat mapping from each class to its direct
//! children plus a parent pointer on each child. "Is this class part of an
//! STI family" is a registry lookup, not a type check.

use super::association::AssociationDescriptor;
use crate::constants::DEFAULT_MAX_ASSOCIATION_DEPTH;
use crate::error::ConfigurationError;
use crate::models::{DefaultScope, ModelClass};
use crate::query_builder::WhereClause;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    pub(super) classes: BTreeMap<String, ModelClass>,
    /// Declared associations per owner, in declaration order
    pub(super) associations: BTreeMap<String, Vec<AssociationDescriptor>>,
    /// Direct STI children per class, in registration order
    pub(super) sti_children: BTreeMap<String, Vec<String>>,
}

impl ModelRegistry {
    pub fn class(&self, name: &str) -> Result<&ModelClass, ConfigurationError> {
        self.classes
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownModel {
                model: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Find an association on `class` or, failing that, on its STI ancestors
    pub fn lookup(
        &self,
        class: &str,
        association: &str,
    ) -> Result<&AssociationDescriptor, ConfigurationError> {
        let mut current = Some(self.class(class)?);
        while let Some(model) = current {
            if let Some(descriptor) = self
                .associations
                .get(&model.name)
                .and_then(|list| list.iter().find(|d| d.name == association))
            {
                return Ok(descriptor);
            }
            current = model.sti_parent().and_then(|p| self.classes.get(p));
        }
        Err(ConfigurationError::UnknownAssociation {
            model: class.to_string(),
            association: association.to_string(),
        })
    }

    /// Own associations followed by inherited ones not shadowed by name
    pub fn associations_of(&self, class: &str) -> Vec<&AssociationDescriptor> {
        let mut found: Vec<&AssociationDescriptor> = Vec::new();
        let mut current = self.classes.get(class);
        while let Some(model) = current {
            if let Some(list) = self.associations.get(&model.name) {
                for descriptor in list {
                    if !found.iter().any(|d| d.name == descriptor.name) {
                        found.push(descriptor);
                    }
                }
            }
            current = model.sti_parent().and_then(|p| self.classes.get(p));
        }
        found
    }

    /// `class` and its STI ancestors, root first
    pub fn sti_chain(&self, class: &str) -> Vec<&ModelClass> {
        let mut chain = Vec::new();
        let mut current = self.classes.get(class);
        while let Some(model) = current {
            chain.push(model);
            current = model.sti_parent().and_then(|p| self.classes.get(p));
        }
        chain.reverse();
        chain
    }

    /// Root of the STI family, or the class itself
    pub fn sti_base(&self, class: &str) -> Result<&ModelClass, ConfigurationError> {
        let model = self.class(class)?;
        Ok(self.sti_chain(class).into_iter().next().unwrap_or(model))
    }

    pub fn sti_children(&self, class: &str) -> &[String] {
        self.sti_children
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every registered class extending `class`, depth first
    pub fn sti_descendants(&self, class: &str) -> Vec<&ModelClass> {
        let mut found = Vec::new();
        for child in self.sti_children(class) {
            if let Some(model) = self.classes.get(child) {
                found.push(model);
                found.extend(self.sti_descendants(child));
            }
        }
        found
    }

    /// Reverse-resolve a discriminant value to the class extending `base`
    /// that claims it, searching multi-level chains recursively
    pub fn find_extending_class(&self, base: &str, value: &str) -> Option<&ModelClass> {
        for child in self.sti_children(base) {
            let model = self.classes.get(child)?;
            if model.discriminant_value() == Some(value) {
                return Some(model);
            }
            if let Some(found) = self.find_extending_class(child, value) {
                return Some(found);
            }
        }
        None
    }

    /// Single `IN (...)` predicate restricting rows to `class` and its
    /// descendants, or `None` when the class is not part of an STI family
    /// or nothing narrows it
    pub fn discriminant_filter(&self, class: &str) -> Option<WhereClause> {
        let model = self.classes.get(class)?;
        let column = model.discriminant_column()?;

        let mut values: Vec<Value> = Vec::new();
        if let Some(value) = model.discriminant_value() {
            values.push(Value::String(value.to_string()));
        }
        for descendant in self.sti_descendants(class) {
            if let Some(value) = descendant.discriminant_value() {
                values.push(Value::String(value.to_string()));
            }
        }

        if values.is_empty() {
            None
        } else {
            Some(WhereClause::in_condition(column, values))
        }
    }

    /// Default scopes of the class and its ancestors, root first, one per
    /// name (a descendant's scope replaces an ancestor's of the same name)
    pub fn default_scopes(&self, class: &str) -> Vec<&DefaultScope> {
        let mut scopes: Vec<&DefaultScope> = Vec::new();
        for model in self.sti_chain(class) {
            for scope in &model.default_scopes {
                match scopes.iter().position(|s| s.name == scope.name) {
                    Some(index) => scopes[index] = scope,
                    None => scopes.push(scope),
                }
            }
        }
        scopes
    }

    /// Columns that rows of `class` (or any class sharing its table) can
    /// carry: primary key first, then ancestors, then descendants
    pub fn family_columns(&self, class: &str) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        };

        let chain = self.sti_chain(class);
        let descendants = self.sti_descendants(class);
        for model in chain.iter().chain(descendants.iter()) {
            for column in model.column_names() {
                push(&column);
            }
            if let Some(discriminant) = model.discriminant_column() {
                push(discriminant);
            }
        }
        columns
    }

    /// Name stored in a polymorphic type column for rows of `class`
    pub fn polymorphic_type_name(&self, class: &str) -> String {
        self.sti_chain(class)
            .first()
            .map(|m| m.name.clone())
            .unwrap_or_else(|| class.to_string())
    }

    /// Final target classes of an association, following through chains
    pub fn resolve_targets(
        &self,
        owner: &str,
        descriptor: &AssociationDescriptor,
    ) -> Result<Vec<String>, ConfigurationError> {
        self.resolve_targets_bounded(owner, descriptor, 0)
    }

    fn resolve_targets_bounded(
        &self,
        owner: &str,
        descriptor: &AssociationDescriptor,
        depth: usize,
    ) -> Result<Vec<String>, ConfigurationError> {
        let Some(through) = descriptor.through.as_deref() else {
            return Ok(descriptor.targets.clone());
        };

        if depth >= DEFAULT_MAX_ASSOCIATION_DEPTH {
            return Err(ConfigurationError::InvalidAssociationOptions {
                model: owner.to_string(),
                association: descriptor.name.clone(),
                reason: "through chain does not terminate".to_string(),
            });
        }

        let through_descriptor = self.lookup(owner, through)?;
        let intermediates = self.resolve_targets_bounded(owner, through_descriptor, depth + 1)?;
        let source = descriptor.source.as_deref().unwrap_or(&descriptor.name);

        let mut targets: Vec<String> = Vec::new();
        for intermediate in &intermediates {
            let Ok(source_descriptor) = self.lookup(intermediate, source) else {
                continue;
            };
            for target in self.resolve_targets_bounded(intermediate, source_descriptor, depth + 1)? {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }

        if !descriptor.targets.is_empty() {
            targets.retain(|t| descriptor.targets.contains(t));
        }
        Ok(targets)
    }
}
