//! # Scope Composer
//!
//! Merges a model's default scopes, the STI discriminant filter and ad-hoc
//! conditions into one ordered predicate list for one table alias.
//!
//! ## Ordering
//!
//! 1. Default scopes of the class and its STI ancestors, root first
//! 2. The STI discriminant filter (`"sti"`), exactly once
//! 3. Explicit `where` / `and` / `and_not` / `and_any` clauses in call order
//!
//! Any default scope, the STI filter included, is skipped when it is named
//! in the bypass set or the bypass covers all scopes.

use crate::constants::scope_names;
use crate::error::ConfigurationError;
use crate::query_builder::WhereClause;
use crate::registry::ModelRegistry;
use std::collections::BTreeSet;
use tracing::trace;

/// Default scopes to skip for one query or association
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeBypass {
    all: bool,
    names: BTreeSet<String>,
}

impl ScopeBypass {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            all: true,
            names: BTreeSet::new(),
        }
    }

    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all: false,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.names.insert(name.to_string());
        self
    }

    pub fn union(&self, other: &ScopeBypass) -> ScopeBypass {
        Self {
            all: self.all || other.all,
            names: self.names.union(&other.names).cloned().collect(),
        }
    }

    pub fn bypasses(&self, name: &str) -> bool {
        self.all || self.names.contains(name)
    }

    pub fn is_all(&self) -> bool {
        self.all
    }
}

/// Result of composing scopes for one alias
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComposedScope {
    /// Alias-qualified clauses in application order
    pub clauses: Vec<WhereClause>,
    /// Names of the default scopes that were applied
    pub applied: Vec<String>,
}

/// Compose the predicate list for `class` rows read under `alias`
pub fn compose(
    registry: &ModelRegistry,
    class: &str,
    alias: &str,
    bypass: &ScopeBypass,
    explicit: &[WhereClause],
) -> Result<ComposedScope, ConfigurationError> {
    registry.class(class)?;
    let mut composed = ComposedScope::default();

    for scope in registry.default_scopes(class) {
        if bypass.bypasses(&scope.name) {
            continue;
        }
        composed.clauses.push(scope.clause.qualified(alias));
        composed.applied.push(scope.name.clone());
    }

    if !bypass.bypasses(scope_names::STI) {
        if let Some(filter) = registry.discriminant_filter(class) {
            composed.clauses.push(filter.qualified(alias));
            composed.applied.push(scope_names::STI.to_string());
        }
    }

    composed
        .clauses
        .extend(explicit.iter().map(|clause| clause.qualified(alias)));

    trace!(
        model = %class,
        alias = %alias,
        applied = ?composed.applied,
        "composed scopes"
    );
    Ok(composed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelClass;
    use crate::registry::RegistryBuilder;

    fn registry() -> ModelRegistry {
        let mut builder = RegistryBuilder::new();
        builder
            .register_model(
                ModelClass::new("Balloon", "balloons")
                    .sti_base()
                    .soft_delete("deleted_at"),
            )
            .unwrap()
            .register_model(ModelClass::sti_child("Latex", "Balloon", "Latex"))
            .unwrap()
            .register_model(ModelClass::sti_child("Animal", "Latex", "Animal"))
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_child_inherits_default_scopes_and_filters_once() {
        let registry = registry();
        let composed = compose(&registry, "Latex", "balloons", &ScopeBypass::none(), &[]).unwrap();
        assert_eq!(composed.applied, vec!["soft_delete", "sti"]);
        let sql: Vec<String> = composed.clauses.iter().map(WhereClause::to_sql).collect();
        assert_eq!(
            sql,
            vec![
                r#""balloons"."deleted_at" IS NULL"#.to_string(),
                r#""balloons"."type" IN ('Latex', 'Animal')"#.to_string()
            ]
        );
    }

    #[test]
    fn test_bypass_is_idempotent() {
        let registry = registry();
        let once = ScopeBypass::none().with_name("soft_delete");
        let twice = once.clone().with_name("soft_delete");
        let a = compose(&registry, "Balloon", "b", &once, &[]).unwrap();
        let b = compose(&registry, "Balloon", "b", &twice, &[]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.applied, vec!["sti"]);
    }

    #[test]
    fn test_bypass_all_keeps_explicit_conditions() {
        let registry = registry();
        let explicit = vec![WhereClause::eq("color", "red")];
        let composed = compose(&registry, "Animal", "b", &ScopeBypass::all(), &explicit).unwrap();
        assert!(composed.applied.is_empty());
        assert_eq!(composed.clauses.len(), 1);
        assert_eq!(composed.clauses[0].to_sql(), r#""b"."color" = 'red'"#);
    }
}
