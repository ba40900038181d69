//! Association descriptors.
//!
//! One descriptor per declared relationship on a model. Descriptors are
//! built with the constructors and chained setters below, validated by
//! [`RegistryBuilder::register`](super::RegistryBuilder::register), and read
//! on every query that touches the association.

use crate::error::CompilationError;
use crate::query_builder::{Condition, Direction, OrderBy, WhereClause};
use crate::scopes::ScopeBypass;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
}

impl AssociationKind {
    pub fn is_singular(&self) -> bool {
        !matches!(self, AssociationKind::HasMany)
    }
}

/// Value side of a declared association condition
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Value(Value),
    /// Filled from the query's passthrough map when the query is compiled
    Passthrough,
    /// Must be supplied by the caller's join condition
    Required,
}

impl ConditionValue {
    pub fn is_marker(&self) -> bool {
        !matches!(self, ConditionValue::Value(_))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssociationConditions {
    pub and: Vec<(String, ConditionValue)>,
    pub and_not: Vec<(String, ConditionValue)>,
    pub and_any: Vec<Vec<(String, Value)>>,
}

impl AssociationConditions {
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.and_not.is_empty() && self.and_any.is_empty()
    }

    pub fn has_markers(&self) -> bool {
        self.and
            .iter()
            .chain(self.and_not.iter())
            .any(|(_, value)| value.is_marker())
    }

    /// Resolve into clauses over bare column names.
    ///
    /// `supplied` are the caller's extra join conditions (already qualified
    /// with `alias`); a `Required` column is satisfied when one of them
    /// references it.
    pub fn resolve(
        &self,
        association: &str,
        alias: &str,
        passthrough: &Map<String, Value>,
        supplied: &[WhereClause],
    ) -> Result<Vec<WhereClause>, CompilationError> {
        let mut clauses = Vec::new();

        for (negated, pairs) in [(false, &self.and), (true, &self.and_not)] {
            for (column, value) in pairs {
                let value = match value {
                    ConditionValue::Value(value) => value.clone(),
                    ConditionValue::Passthrough => passthrough.get(column).cloned().ok_or_else(|| {
                        CompilationError::MissingRequiredCondition {
                            association: association.to_string(),
                            column: column.clone(),
                        }
                    })?,
                    ConditionValue::Required => {
                        let qualified = format!("{alias}.{column}");
                        let satisfied = supplied
                            .iter()
                            .any(|clause| clause.fields().iter().any(|f| *f == qualified));
                        if !satisfied {
                            return Err(CompilationError::MissingRequiredCondition {
                                association: association.to_string(),
                                column: column.clone(),
                            });
                        }
                        continue;
                    }
                };
                let clause = WhereClause::matching(&Value::Object(
                    std::iter::once((column.clone(), value)).collect(),
                ));
                clauses.push(if negated { clause.negate() } else { clause });
            }
        }

        if !self.and_any.is_empty() {
            let alternatives = self
                .and_any
                .iter()
                .map(|pairs| {
                    WhereClause::matching(&Value::Object(pairs.iter().cloned().collect()))
                })
                .collect();
            clauses.push(WhereClause::any(alternatives));
        }

        Ok(clauses)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependent {
    Destroy,
}

/// How duplicate child rows collapse before attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistinctOn {
    PrimaryKey,
    Column(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationDescriptor {
    /// Name (and default alias) of the association
    pub name: String,
    /// Owning model class; set on registration
    pub owner: String,
    pub kind: AssociationKind,
    /// Candidate target classes; more than one only for polymorphic belongs-to
    pub targets: Vec<String>,
    /// Explicit or derived foreign key. Empty for through associations.
    pub foreign_key: String,
    pub foreign_key_type_field: Option<String>,
    pub primary_key_override: Option<String>,
    pub polymorphic: bool,
    pub through: Option<String>,
    pub source: Option<String>,
    pub conditions: AssociationConditions,
    pub order: Vec<OrderBy>,
    pub distinct: Option<DistinctOn>,
    pub without_default_scopes: ScopeBypass,
    pub dependent: Option<Dependent>,
}

impl AssociationDescriptor {
    fn new(name: &str, kind: AssociationKind, targets: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            owner: String::new(),
            kind,
            targets,
            foreign_key: String::new(),
            foreign_key_type_field: None,
            primary_key_override: None,
            polymorphic: false,
            through: None,
            source: None,
            conditions: AssociationConditions::default(),
            order: Vec::new(),
            distinct: None,
            without_default_scopes: ScopeBypass::none(),
            dependent: None,
        }
    }

    pub fn belongs_to(name: &str, target: &str) -> Self {
        Self::new(name, AssociationKind::BelongsTo, vec![target.to_string()])
    }

    /// Belongs-to whose target class is named by a type column on the owner
    pub fn belongs_to_polymorphic(name: &str, candidates: &[&str]) -> Self {
        let mut descriptor = Self::new(
            name,
            AssociationKind::BelongsTo,
            candidates.iter().map(|c| c.to_string()).collect(),
        );
        descriptor.polymorphic = true;
        descriptor
    }

    pub fn has_one(name: &str, target: &str) -> Self {
        Self::new(name, AssociationKind::HasOne, vec![target.to_string()])
    }

    pub fn has_many(name: &str, target: &str) -> Self {
        Self::new(name, AssociationKind::HasMany, vec![target.to_string()])
    }

    /// Has-many routed through another association; the target is derived
    /// from the source association
    pub fn has_many_through(name: &str, through: &str) -> Self {
        let mut descriptor = Self::new(name, AssociationKind::HasMany, Vec::new());
        descriptor.through = Some(through.to_string());
        descriptor
    }

    pub fn has_one_through(name: &str, through: &str) -> Self {
        let mut descriptor = Self::new(name, AssociationKind::HasOne, Vec::new());
        descriptor.through = Some(through.to_string());
        descriptor
    }

    pub fn foreign_key(mut self, column: &str) -> Self {
        self.foreign_key = column.to_string();
        self
    }

    /// Target-side type column for a polymorphic has-one / has-many
    pub fn polymorphic(mut self) -> Self {
        self.polymorphic = true;
        self
    }

    pub fn foreign_key_type_field(mut self, column: &str) -> Self {
        self.foreign_key_type_field = Some(column.to_string());
        self
    }

    pub fn primary_key_override(mut self, column: &str) -> Self {
        self.primary_key_override = Some(column.to_string());
        self
    }

    pub fn through(mut self, association: &str) -> Self {
        self.through = Some(association.to_string());
        self
    }

    pub fn source(mut self, association: &str) -> Self {
        self.source = Some(association.to_string());
        self
    }

    /// Narrow a through association whose source is a polymorphic
    /// belongs-to to one concrete target class
    pub fn source_type(mut self, class: &str) -> Self {
        self.targets = vec![class.to_string()];
        self
    }

    pub fn and_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .and
            .push((column.to_string(), ConditionValue::Value(value.into())));
        self
    }

    pub fn and_not_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .and_not
            .push((column.to_string(), ConditionValue::Value(value.into())));
        self
    }

    pub fn and_any(mut self, alternatives: Vec<Vec<(&str, Value)>>) -> Self {
        for pairs in alternatives {
            self.conditions.and_any.push(
                pairs
                    .into_iter()
                    .map(|(column, value)| (column.to_string(), value))
                    .collect(),
            );
        }
        self
    }

    pub fn and_passthrough(mut self, column: &str) -> Self {
        self.conditions
            .and
            .push((column.to_string(), ConditionValue::Passthrough));
        self
    }

    pub fn and_required(mut self, column: &str) -> Self {
        self.conditions
            .and
            .push((column.to_string(), ConditionValue::Required));
        self
    }

    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order.push(OrderBy {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = Some(DistinctOn::PrimaryKey);
        self
    }

    pub fn distinct_on(mut self, column: &str) -> Self {
        self.distinct = Some(DistinctOn::Column(column.to_string()));
        self
    }

    pub fn without_default_scope(mut self, name: &str) -> Self {
        self.without_default_scopes = self.without_default_scopes.with_name(name);
        self
    }

    pub fn without_default_scopes(mut self) -> Self {
        self.without_default_scopes = ScopeBypass::all();
        self
    }

    pub fn dependent_destroy(mut self) -> Self {
        self.dependent = Some(Dependent::Destroy);
        self
    }

    pub fn is_through(&self) -> bool {
        self.through.is_some()
    }

    /// Polymorphic belongs-to over more than one candidate
    pub fn is_ambiguous_polymorphic(&self) -> bool {
        self.polymorphic && self.kind == AssociationKind::BelongsTo && self.targets.len() > 1
    }

    /// Column on the owner side the join compares against
    pub fn owner_key<'a>(&'a self, owner_primary_key: &'a str) -> &'a str {
        match self.kind {
            AssociationKind::BelongsTo => &self.foreign_key,
            _ => self.primary_key_override.as_deref().unwrap_or(owner_primary_key),
        }
    }

    /// Column on the target side the join compares against
    pub fn target_key<'a>(&'a self, target_primary_key: &'a str) -> &'a str {
        match self.kind {
            AssociationKind::BelongsTo => self
                .primary_key_override
                .as_deref()
                .unwrap_or(target_primary_key),
            _ => &self.foreign_key,
        }
    }

    /// Association order as conditions over `alias`
    pub fn order_for(&self, alias: &str) -> Vec<OrderBy> {
        self.order
            .iter()
            .map(|o| OrderBy {
                column: crate::query_builder::conditions::qualify(alias, &o.column),
                direction: o.direction,
            })
            .collect()
    }
}

/// Condition shorthand used by join compilation
pub(crate) fn column_eq(left: String, right: String) -> WhereClause {
    WhereClause::from(Condition::Columns {
        left,
        operator: crate::query_builder::Operator::Eq,
        right,
    })
}
