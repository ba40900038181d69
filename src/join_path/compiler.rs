//! Walks association metadata and emits join steps.
//!
//! A hop over a direct association emits one step. A hop over a through
//! association first compiles the through association from the same
//! owner, then compiles the source association from the through alias.
//! Polymorphic belongs-to hops must be narrowed to a single candidate
//! before they can be joined.

use super::path::AssociationPath;
use crate::error::CompilationError;
use crate::query_builder::conditions::qualify;
use crate::query_builder::{JoinStep, JoinType, WhereClause};
use crate::registry::association::column_eq;
use crate::registry::{AssociationDescriptor, AssociationKind, ModelRegistry};
use crate::scopes::{self, ScopeBypass};
use serde_json::{Map, Value};
use tracing::debug;

/// One compiled association hop
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledHop {
    pub association: String,
    /// Alias the hop's target is visible under
    pub alias: String,
    /// Concrete class of the joined rows
    pub class: String,
    pub singular: bool,
    /// `(alias, class)` of every step this hop produced, intermediates
    /// of through associations first and the target last
    pub chain: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledPath {
    pub steps: Vec<JoinStep>,
    pub hops: Vec<CompiledHop>,
}

impl CompiledPath {
    pub fn terminal(&self) -> Option<&CompiledHop> {
        self.hops.last()
    }
}

/// Predicates an association contributes on its target alias, apart from
/// the key equality itself
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetPredicates {
    pub clauses: Vec<WhereClause>,
    pub applied_scopes: Vec<String>,
}

pub struct JoinPathCompiler<'a> {
    registry: &'a ModelRegistry,
    bypass: &'a ScopeBypass,
    passthrough: &'a Map<String, Value>,
    max_depth: usize,
}

impl<'a> JoinPathCompiler<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        bypass: &'a ScopeBypass,
        passthrough: &'a Map<String, Value>,
        max_depth: usize,
    ) -> Self {
        Self {
            registry,
            bypass,
            passthrough,
            max_depth,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        self.registry
    }

    /// Compile `path` from `root_class` into fresh join steps
    pub fn compile(
        &self,
        root_class: &str,
        root_alias: &str,
        path: &AssociationPath,
        join_type: JoinType,
        condition: &[WhereClause],
    ) -> Result<CompiledPath, CompilationError> {
        let mut steps = Vec::new();
        let hops = self.compile_into(
            root_class, root_alias, path, join_type, condition, &mut steps,
        )?;
        Ok(CompiledPath { steps, hops })
    }

    /// Compile `path`, appending to `steps`. A step identical to one
    /// already present is reused; a different step under a taken alias is
    /// an [`CompilationError::AliasCollision`]. `condition` applies to the
    /// last hop.
    pub fn compile_into(
        &self,
        root_class: &str,
        root_alias: &str,
        path: &AssociationPath,
        join_type: JoinType,
        condition: &[WhereClause],
        steps: &mut Vec<JoinStep>,
    ) -> Result<Vec<CompiledHop>, CompilationError> {
        if path.is_empty() {
            return Err(CompilationError::InvalidPath(path.to_string()));
        }

        let path_name = path.to_string();
        let mut budget = Budget::new(&path_name, self.max_depth);
        let mut from_class = root_class.to_string();
        let mut from_alias = root_alias.to_string();
        let mut hops = Vec::with_capacity(path.len());

        for (index, hop) in path.hops.iter().enumerate() {
            let extra = if index + 1 == path.len() {
                condition
            } else {
                &[]
            };
            let compiled = self.compile_hop(
                &from_class,
                &from_alias,
                root_alias,
                &hop.association,
                hop.effective_alias(),
                join_type,
                extra,
                steps,
                &mut budget,
            )?;
            from_class = compiled.class.clone();
            from_alias = compiled.alias.clone();
            hops.push(compiled);
        }

        debug!(
            root = %root_class,
            path = %path_name,
            steps = steps.len(),
            "compiled association path"
        );
        Ok(hops)
    }

    /// Compile a single association hop from `from_alias`
    #[allow(clippy::too_many_arguments)]
    pub fn compile_hop(
        &self,
        from_class: &str,
        from_alias: &str,
        root_alias: &str,
        association: &str,
        alias: &str,
        join_type: JoinType,
        condition: &[WhereClause],
        steps: &mut Vec<JoinStep>,
        budget: &mut Budget,
    ) -> Result<CompiledHop, CompilationError> {
        let descriptor = self.registry.lookup(from_class, association)?;
        let mut chain = Vec::new();
        let class = self.compile_descriptor(
            &Hop {
                from_class,
                from_alias,
                root_alias,
                alias,
                join_type,
                narrow: None,
            },
            descriptor,
            &[],
            condition,
            steps,
            &mut chain,
            budget,
            0,
        )?;

        Ok(CompiledHop {
            association: association.to_string(),
            alias: alias.to_string(),
            class,
            singular: descriptor.kind.is_singular(),
            chain,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_descriptor(
        &self,
        hop: &Hop<'_>,
        descriptor: &AssociationDescriptor,
        wrappers: &[&AssociationDescriptor],
        condition: &[WhereClause],
        steps: &mut Vec<JoinStep>,
        chain: &mut Vec<(String, String)>,
        budget: &mut Budget,
        depth: usize,
    ) -> Result<String, CompilationError> {
        if depth >= self.max_depth {
            return Err(budget.exceeded());
        }

        if let Some(through) = descriptor.through.as_deref() {
            let through_descriptor = self.registry.lookup(hop.from_class, through)?;
            let source = descriptor.source.as_deref().unwrap_or(&descriptor.name);
            let narrow = self.through_candidates(descriptor, through_descriptor, source);
            let through_alias = intermediate_alias(hop, through);

            let intermediate = self.compile_descriptor(
                &Hop {
                    alias: &through_alias,
                    narrow: narrow.as_deref(),
                    ..*hop
                },
                through_descriptor,
                &[],
                &[],
                steps,
                chain,
                budget,
                depth + 1,
            )?;

            let source_descriptor = self.registry.lookup(&intermediate, source)?;
            let mut outer: Vec<&AssociationDescriptor> = vec![descriptor];
            outer.extend_from_slice(wrappers);
            let narrow = (!descriptor.targets.is_empty()).then_some(descriptor.targets.as_slice());

            return self.compile_descriptor(
                &Hop {
                    from_class: &intermediate,
                    from_alias: &through_alias,
                    narrow,
                    ..*hop
                },
                source_descriptor,
                &outer,
                condition,
                steps,
                chain,
                budget,
                depth + 1,
            );
        }

        let target = self.concrete_target(hop.from_class, descriptor, hop.narrow)?;
        let target_model = self.registry.class(&target)?;
        let from_model = self.registry.class(hop.from_class)?;

        let mut on = vec![self.key_equality(hop, descriptor, &target)?];
        let extra: Vec<WhereClause> = condition.iter().map(|c| c.qualified(hop.alias)).collect();
        let predicates = self.target_predicates(descriptor, wrappers, &target, hop.alias, &extra)?;
        on.extend(predicates.clauses);
        on.extend(extra);

        budget.spend()?;
        let step = JoinStep {
            from_alias: hop.from_alias.to_string(),
            to_table: target_model.table.clone(),
            to_alias: hop.alias.to_string(),
            join_type: hop.join_type,
            on,
            applied_scopes: predicates.applied_scopes,
            target_class: target.clone(),
            association: descriptor.name.clone(),
        };
        push_step(steps, step, hop.root_alias)?;
        debug!(
            from = %from_model.name,
            association = %descriptor.name,
            alias = %hop.alias,
            target = %target,
            "compiled join step"
        );

        chain.push((hop.alias.to_string(), target.clone()));
        Ok(target)
    }

    /// The single class a hop joins to. An ambiguous polymorphic
    /// belongs-to needs `narrow` to pick exactly one candidate.
    pub fn concrete_target(
        &self,
        owner: &str,
        descriptor: &AssociationDescriptor,
        narrow: Option<&[String]>,
    ) -> Result<String, CompilationError> {
        if !descriptor.is_ambiguous_polymorphic() {
            return descriptor.targets.first().cloned().ok_or_else(|| {
                CompilationError::UnknownAssociation {
                    model: owner.to_string(),
                    association: descriptor.name.clone(),
                }
            });
        }

        let candidates: Vec<&String> = match narrow {
            Some(allowed) => descriptor
                .targets
                .iter()
                .filter(|c| allowed.contains(c))
                .collect(),
            None => descriptor.targets.iter().collect(),
        };
        match candidates.as_slice() {
            [single] => Ok((*single).clone()),
            _ => Err(CompilationError::PolymorphicJoin {
                model: owner.to_string(),
                association: descriptor.name.clone(),
                candidates: descriptor.targets.clone(),
            }),
        }
    }

    /// Key equality between `hop.from_alias` and `hop.alias`, with the
    /// polymorphic type check when the association has one
    fn key_equality(
        &self,
        hop: &Hop<'_>,
        descriptor: &AssociationDescriptor,
        target: &str,
    ) -> Result<WhereClause, CompilationError> {
        let from_pk = &self.registry.class(hop.from_class)?.primary_key;
        let target_pk = &self.registry.class(target)?.primary_key;
        let keys = column_eq(
            qualify(hop.alias, descriptor.target_key(target_pk)),
            qualify(hop.from_alias, descriptor.owner_key(from_pk)),
        );

        let Some(type_field) = descriptor
            .foreign_key_type_field
            .as_deref()
            .filter(|_| descriptor.polymorphic)
        else {
            return Ok(keys);
        };

        let type_check = match descriptor.kind {
            AssociationKind::BelongsTo => WhereClause::eq(
                &qualify(hop.from_alias, type_field),
                self.registry.polymorphic_type_name(target),
            ),
            AssociationKind::HasOne | AssociationKind::HasMany => WhereClause::eq(
                &qualify(hop.alias, type_field),
                self.registry.polymorphic_type_name(hop.from_class),
            ),
        };
        Ok(WhereClause::and(
            keys.conditions
                .into_iter()
                .chain(type_check.conditions)
                .collect(),
        ))
    }

    /// Association conditions (own and those of any enclosing through
    /// associations) plus the target's composed default scopes, qualified
    /// with `alias`
    pub fn target_predicates(
        &self,
        descriptor: &AssociationDescriptor,
        wrappers: &[&AssociationDescriptor],
        target: &str,
        alias: &str,
        supplied: &[WhereClause],
    ) -> Result<TargetPredicates, CompilationError> {
        let mut clauses = Vec::new();
        let mut bypass = self.bypass.union(&descriptor.without_default_scopes);

        for owner in std::iter::once(descriptor).chain(wrappers.iter().copied()) {
            for clause in
                owner
                    .conditions
                    .resolve(&owner.name, alias, self.passthrough, supplied)?
            {
                clauses.push(clause.qualified(alias));
            }
            bypass = bypass.union(&owner.without_default_scopes);
        }

        let composed = scopes::compose(self.registry, target, alias, &bypass, &[])?;
        clauses.extend(composed.clauses);
        Ok(TargetPredicates {
            clauses,
            applied_scopes: composed.applied,
        })
    }

    /// Candidates of an ambiguous polymorphic through association that
    /// carry the source association (and reach the declared target)
    fn through_candidates(
        &self,
        descriptor: &AssociationDescriptor,
        through: &AssociationDescriptor,
        source: &str,
    ) -> Option<Vec<String>> {
        if !through.is_ambiguous_polymorphic() {
            return None;
        }
        let candidates = through
            .targets
            .iter()
            .filter(|candidate| {
                let Ok(source_descriptor) = self.registry.lookup(candidate, source) else {
                    return false;
                };
                descriptor.targets.is_empty()
                    || self
                        .registry
                        .resolve_targets(candidate, source_descriptor)
                        .is_ok_and(|reached| reached.iter().any(|t| descriptor.targets.contains(t)))
            })
            .cloned()
            .collect();
        Some(candidates)
    }
}

/// Where one hop starts and what it is called
#[derive(Clone, Copy)]
struct Hop<'h> {
    from_class: &'h str,
    from_alias: &'h str,
    root_alias: &'h str,
    alias: &'h str,
    join_type: JoinType,
    narrow: Option<&'h [String]>,
}

/// Alias of the intermediate step a through association joins. From the
/// root it is the through association's name; deeper in a path it is
/// prefixed with the alias the hop starts from, so the same through
/// association reached from two different tables yields two steps.
fn intermediate_alias(hop: &Hop<'_>, through: &str) -> String {
    if hop.from_alias == hop.root_alias {
        through.to_string()
    } else {
        format!("{}_{through}", hop.from_alias)
    }
}

/// Join steps one association path may still emit
#[derive(Debug)]
pub struct Budget {
    path: String,
    max: usize,
    used: usize,
}

impl Budget {
    pub fn new(path: &str, max: usize) -> Self {
        Self {
            path: path.to_string(),
            max,
            used: 0,
        }
    }

    fn spend(&mut self) -> Result<(), CompilationError> {
        self.used += 1;
        if self.used > self.max {
            return Err(self.exceeded());
        }
        Ok(())
    }

    fn exceeded(&self) -> CompilationError {
        CompilationError::DepthExceeded {
            path: self.path.clone(),
            max: self.max,
        }
    }
}

/// Append `step` unless an identical step is already present
pub fn push_step(
    steps: &mut Vec<JoinStep>,
    step: JoinStep,
    root_alias: &str,
) -> Result<(), CompilationError> {
    if step.to_alias == root_alias {
        return Err(CompilationError::AliasCollision {
            alias: step.to_alias,
        });
    }
    match steps.iter().find(|s| s.to_alias == step.to_alias) {
        Some(existing) if existing.is_same_join(&step) => Ok(()),
        Some(_) => Err(CompilationError::AliasCollision {
            alias: step.to_alias,
        }),
        None => {
            steps.push(step);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelClass;
    use crate::registry::RegistryBuilder;

    fn registry() -> ModelRegistry {
        let mut builder = RegistryBuilder::new();
        builder
            .register_model(ModelClass::new("User", "users"))
            .unwrap()
            .register_model(ModelClass::new("Post", "posts").soft_delete("deleted_at"))
            .unwrap()
            .register_model(ModelClass::new("Comment", "comments"))
            .unwrap()
            .register_model(ModelClass::new("Rating", "ratings"))
            .unwrap();
        builder
            .register("User", AssociationDescriptor::has_many("posts", "Post"))
            .unwrap()
            .register(
                "User",
                AssociationDescriptor::has_many_through("comments", "posts"),
            )
            .unwrap()
            .register("Post", AssociationDescriptor::belongs_to("user", "User"))
            .unwrap()
            .register("Post", AssociationDescriptor::has_many("comments", "Comment"))
            .unwrap()
            .register(
                "Post",
                AssociationDescriptor::has_many("ratings", "Rating")
                    .foreign_key("rateable_id")
                    .polymorphic(),
            )
            .unwrap()
            .register(
                "Rating",
                AssociationDescriptor::belongs_to_polymorphic("rateable", &["Post", "User"])
                    .foreign_key("rateable_id"),
            )
            .unwrap();
        builder.build().unwrap()
    }

    fn compile(registry: &ModelRegistry, root: &str, alias: &str, path: &str) -> Result<CompiledPath, CompilationError> {
        let bypass = ScopeBypass::none();
        let passthrough = Map::new();
        JoinPathCompiler::new(registry, &bypass, &passthrough, 12).compile(
            root,
            alias,
            &AssociationPath::parse(path)?,
            JoinType::Inner,
            &[],
        )
    }

    #[test]
    fn test_direct_has_many_step() {
        let registry = registry();
        let compiled = compile(&registry, "User", "users", "posts as p").unwrap();
        assert_eq!(compiled.steps.len(), 1);
        assert_eq!(
            compiled.steps[0].to_sql(),
            r#"INNER JOIN "posts" AS "p" ON "p"."user_id" = "users"."id" AND "p"."deleted_at" IS NULL"#
        );
        assert_eq!(compiled.steps[0].applied_scopes, vec!["soft_delete"]);
        assert_eq!(compiled.terminal().map(|h| h.class.as_str()), Some("Post"));
    }

    #[test]
    fn test_through_uses_intermediate_alias() {
        let registry = registry();
        let compiled = compile(&registry, "User", "users", "comments").unwrap();
        let aliases: Vec<&str> = compiled.steps.iter().map(|s| s.to_alias.as_str()).collect();
        assert_eq!(aliases, vec!["posts", "comments"]);
        assert_eq!(compiled.steps[1].from_alias, "posts");
        assert_eq!(
            compiled.hops[0].chain,
            vec![
                ("posts".to_string(), "Post".to_string()),
                ("comments".to_string(), "Comment".to_string())
            ]
        );
    }

    #[test]
    fn test_polymorphic_has_many_checks_type() {
        let registry = registry();
        let compiled = compile(&registry, "Post", "posts", "ratings").unwrap();
        assert_eq!(
            compiled.steps[0].on[0].to_sql(),
            r#"("ratings"."rateable_id" = "posts"."id" AND "ratings"."rateable_type" = 'Post')"#
        );
    }

    #[test]
    fn test_ambiguous_polymorphic_belongs_to_cannot_be_joined() {
        let registry = registry();
        assert!(matches!(
            compile(&registry, "Rating", "ratings", "rateable"),
            Err(CompilationError::PolymorphicJoin { .. })
        ));
    }

    #[test]
    fn test_depth_bound() {
        let registry = registry();
        let bypass = ScopeBypass::none();
        let passthrough = Map::new();
        let compiler = JoinPathCompiler::new(&registry, &bypass, &passthrough, 2);
        let result = compiler.compile(
            "Post",
            "p",
            &AssociationPath::parse("user.posts.comments").unwrap(),
            JoinType::Inner,
            &[],
        );
        assert!(matches!(result, Err(CompilationError::DepthExceeded { max: 2, .. })));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let registry = registry();
        let first = compile(&registry, "User", "users", "posts.comments").unwrap();
        let second = compile(&registry, "User", "users", "posts.comments").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_alias_collision_and_dedupe() {
        let registry = registry();
        let bypass = ScopeBypass::none();
        let passthrough = Map::new();
        let compiler = JoinPathCompiler::new(&registry, &bypass, &passthrough, 12);
        let mut steps = Vec::new();
        compiler
            .compile_into("User", "users", &AssociationPath::parse("posts").unwrap(), JoinType::Inner, &[], &mut steps)
            .unwrap();
        compiler
            .compile_into("User", "users", &AssociationPath::parse("posts.comments").unwrap(), JoinType::Inner, &[], &mut steps)
            .unwrap();
        assert_eq!(steps.len(), 2);

        let err = compiler
            .compile_into("User", "users", &AssociationPath::parse("posts.comments as posts").unwrap(), JoinType::Inner, &[], &mut steps)
            .unwrap_err();
        assert_eq!(err, CompilationError::AliasCollision { alias: "posts".to_string() });
    }

    #[test]
    fn test_through_reached_again_deeper_in_the_path() {
        let registry = registry();
        let compiled = compile(&registry, "User", "users", "posts.user.comments").unwrap();
        let joins: Vec<(&str, &str)> = compiled
            .steps
            .iter()
            .map(|s| (s.from_alias.as_str(), s.to_alias.as_str()))
            .collect();
        assert_eq!(
            joins,
            vec![
                ("users", "posts"),
                ("posts", "user"),
                ("user", "user_posts"),
                ("user_posts", "comments"),
            ]
        );
        assert_eq!(
            compiled.steps[2].to_sql(),
            r#"INNER JOIN "posts" AS "user_posts" ON "user_posts"."user_id" = "user"."id" AND "user_posts"."deleted_at" IS NULL"#
        );
    }

    #[test]
    fn test_unknown_association() {
        let registry = registry();
        assert!(matches!(
            compile(&registry, "User", "users", "pets"),
            Err(CompilationError::UnknownAssociation { .. })
        ));
    }
}
