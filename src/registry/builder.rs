//! Boot-time registration pass.
//!
//! All model classes are registered first, then their associations, then
//! [`RegistryBuilder::build`] validates cross-association references and
//! freezes the result. Invalid option combinations fail at `register`, not
//! at query time.

use super::association::{AssociationDescriptor, AssociationKind};
use super::inflection::{foreign_key_for_table, polymorphic_type_field, singularize};
use super::model_registry::ModelRegistry;
use crate::error::ConfigurationError;
use crate::logging::log_registry_operation;
use crate::models::{ModelClass, StiConfig, StiRole};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: ModelRegistry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model class. STI children inherit table, primary key and
    /// discriminant column from their (already registered) parent.
    pub fn register_model(
        &mut self,
        mut class: ModelClass,
    ) -> Result<&mut Self, ConfigurationError> {
        if self.registry.classes.contains_key(&class.name) {
            return Err(ConfigurationError::DuplicateModel { model: class.name });
        }

        if let Some(StiConfig {
            role: StiRole::Child { parent, value },
            ..
        }) = class.sti.clone()
        {
            let parent_class = self.registry.classes.get(&parent).ok_or_else(|| {
                ConfigurationError::UnknownStiParent {
                    model: class.name.clone(),
                    parent: parent.clone(),
                }
            })?;
            let Some(parent_sti) = parent_class.sti.clone() else {
                return Err(ConfigurationError::UnknownStiParent {
                    model: class.name.clone(),
                    parent,
                });
            };

            let base = self.registry.sti_base(&parent)?.name.clone();
            if let Some(existing) = self
                .registry
                .sti_descendants(&base)
                .into_iter()
                .find(|m| m.discriminant_value() == Some(value.as_str()))
            {
                return Err(ConfigurationError::DuplicateDiscriminant {
                    value,
                    first: existing.name.clone(),
                    second: class.name,
                });
            }

            class.table = parent_class.table.clone();
            class.primary_key = parent_class.primary_key.clone();
            class.sti = Some(StiConfig {
                discriminant_column: parent_sti.discriminant_column,
                role: StiRole::Child {
                    parent: parent.clone(),
                    value,
                },
            });
            self.registry
                .sti_children
                .entry(parent)
                .or_default()
                .push(class.name.clone());
        }

        debug!(model = %class.name, table = %class.table, "registered model class");
        self.registry.classes.insert(class.name.clone(), class);
        Ok(self)
    }

    /// Validate and register one association on `owner`, deriving the
    /// foreign key when none was given
    pub fn register(
        &mut self,
        owner: &str,
        mut descriptor: AssociationDescriptor,
    ) -> Result<&mut Self, ConfigurationError> {
        let owner_class = self.registry.class(owner)?.clone();
        descriptor.owner = owner.to_string();

        let invalid = |reason: &str| ConfigurationError::InvalidAssociationOptions {
            model: owner.to_string(),
            association: descriptor.name.clone(),
            reason: reason.to_string(),
        };

        if self
            .registry
            .associations
            .get(owner)
            .is_some_and(|list| list.iter().any(|d| d.name == descriptor.name))
        {
            return Err(ConfigurationError::DuplicateAssociation {
                model: owner.to_string(),
                association: descriptor.name.clone(),
            });
        }

        if descriptor.through.is_some() && descriptor.dependent.is_some() {
            return Err(invalid("through associations cannot declare dependent"));
        }
        if descriptor.dependent.is_some() && descriptor.conditions.has_markers() {
            return Err(invalid(
                "dependent cannot be combined with passthrough or required conditions",
            ));
        }
        if descriptor.through.is_some() && descriptor.kind == AssociationKind::BelongsTo {
            return Err(invalid("belongs-to associations cannot be routed through"));
        }
        if descriptor.through.is_some() && descriptor.polymorphic {
            return Err(invalid("through associations cannot be polymorphic"));
        }
        if descriptor.source.is_some() && descriptor.through.is_none() {
            return Err(invalid("source requires through"));
        }
        if descriptor.through.is_none() && descriptor.targets.is_empty() {
            return Err(invalid("no target class"));
        }
        if descriptor.kind != AssociationKind::BelongsTo && descriptor.targets.len() > 1 {
            return Err(invalid("has-one and has-many resolve to a single class"));
        }

        for target in &descriptor.targets {
            self.registry.class(target)?;
        }

        if descriptor.through.is_none() {
            if descriptor.foreign_key.is_empty() {
                descriptor.foreign_key = match descriptor.kind {
                    AssociationKind::BelongsTo => {
                        if descriptor.is_ambiguous_polymorphic() {
                            return Err(ConfigurationError::MissingForeignKey {
                                model: owner.to_string(),
                                association: descriptor.name.clone(),
                                candidates: descriptor.targets.clone(),
                            });
                        }
                        let target = self.registry.class(&descriptor.targets[0])?;
                        foreign_key_for_table(&target.table)
                    }
                    AssociationKind::HasOne | AssociationKind::HasMany => {
                        foreign_key_for_table(&owner_class.table)
                    }
                };
            }
            if descriptor.polymorphic && descriptor.foreign_key_type_field.is_none() {
                descriptor.foreign_key_type_field =
                    Some(polymorphic_type_field(&descriptor.foreign_key));
            }
        }

        debug!(
            model = %owner,
            association = %descriptor.name,
            kind = ?descriptor.kind,
            foreign_key = %descriptor.foreign_key,
            "registered association"
        );
        self.registry
            .associations
            .entry(owner.to_string())
            .or_default()
            .push(descriptor);
        Ok(self)
    }

    /// Resolve through/source references and freeze the registry
    pub fn build(mut self) -> Result<ModelRegistry, ConfigurationError> {
        let mut resolved_sources: Vec<(String, usize, String)> = Vec::new();

        for (owner, list) in &self.registry.associations {
            for (index, descriptor) in list.iter().enumerate() {
                let Some(through) = descriptor.through.as_deref() else {
                    continue;
                };
                let through_descriptor = self.registry.lookup(owner, through)?;
                let intermediates = self.registry.resolve_targets(owner, through_descriptor)?;

                let preferred = descriptor
                    .source
                    .clone()
                    .unwrap_or_else(|| descriptor.name.clone());
                let candidates = [preferred.clone(), singularize(&preferred)];
                let source = candidates
                    .iter()
                    .find(|name| {
                        intermediates
                            .iter()
                            .any(|class| self.registry.lookup(class, name).is_ok())
                    })
                    .cloned()
                    .ok_or_else(|| ConfigurationError::UnknownAssociation {
                        model: intermediates.first().cloned().unwrap_or_default(),
                        association: preferred,
                    })?;
                resolved_sources.push((owner.clone(), index, source));
            }
        }

        for (owner, index, source) in resolved_sources {
            if let Some(descriptor) = self
                .registry
                .associations
                .get_mut(&owner)
                .and_then(|list| list.get_mut(index))
            {
                descriptor.source = Some(source);
            }
        }

        for (owner, list) in &self.registry.associations {
            for descriptor in list {
                let targets = self.registry.resolve_targets(owner, descriptor)?;
                if targets.is_empty() {
                    return Err(ConfigurationError::InvalidAssociationOptions {
                        model: owner.clone(),
                        association: descriptor.name.clone(),
                        reason: "through chain reaches no target class".to_string(),
                    });
                }
            }
        }

        log_registry_operation(
            "build",
            self.registry.classes.len(),
            self.registry.associations.values().map(Vec::len).sum(),
            "success",
        );
        Ok(self.registry)
    }
}
