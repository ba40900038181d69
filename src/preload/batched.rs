//! Batched preload: one SELECT per tree node.
//!
//! Each node's rows are fetched with `WHERE key IN (...)` over the keys of
//! the current parent set, children are loaded onto the de-duplicated
//! fetched rows, and the results are attached to their parents. Siblings
//! are fetched concurrently; a node's children always wait for the node.

use super::postprocess::{distinct_records, finalize};
use super::tree::PreloadNode;
use crate::database::executor::run_select;
use crate::database::{SqlExecutor, TransactionHandle};
use crate::error::{CompilationError, GraphloadError};
use crate::join_path::JoinPathCompiler;
use crate::marshal::{marshal, polymorphic_class};
use crate::models::{value_key, LoadedAssociation, Record};
use crate::query_builder::conditions::qualify;
use crate::query_builder::{OrderBy, SelectCommand, WhereClause};
use crate::registry::{AssociationDescriptor, AssociationKind, DistinctOn, ModelRegistry};
use crate::scopes::ScopeBypass;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Everything a preload pass needs besides the records themselves
pub struct PreloadContext<'c> {
    pub registry: &'c ModelRegistry,
    pub executor: &'c dyn SqlExecutor,
    pub transaction: Option<&'c TransactionHandle>,
    pub passthrough: &'c Map<String, Value>,
    pub max_depth: usize,
    pub log_sql: bool,
}

/// Extra filtering a preload node applies to its own rows
#[derive(Clone, Copy)]
struct NodeFilter<'f> {
    and: &'f [WhereClause],
    omit: &'f ScopeBypass,
}

type Grouped = Vec<Vec<Record>>;

/// Load every node onto `records`, replacing only the loaded associations
/// the nodes name
pub fn preload<'f>(
    ctx: &'f PreloadContext<'_>,
    records: &'f mut [Record],
    nodes: &'f [PreloadNode],
) -> BoxFuture<'f, Result<(), GraphloadError>> {
    async move {
        if records.is_empty() || nodes.is_empty() {
            return Ok(());
        }

        let fetched = {
            let parents: &[Record] = records;
            try_join_all(nodes.iter().map(|node| fetch_node(ctx, parents, node))).await?
        };

        for (node, lists) in nodes.iter().zip(fetched) {
            for (record, list) in records.iter_mut().zip(lists) {
                let singular = ctx
                    .registry
                    .lookup(record.class_name(), &node.association)
                    .map(|d| d.kind.is_singular())
                    .unwrap_or(false);
                let value = if singular {
                    LoadedAssociation::One(list.into_iter().next().map(Box::new))
                } else {
                    LoadedAssociation::Many(list)
                };
                record.set_association(&node.alias, value);
            }
        }
        Ok(())
    }
    .boxed()
}

/// Fetch one node for every parent, children of the node included
fn fetch_node<'f>(
    ctx: &'f PreloadContext<'_>,
    parents: &'f [Record],
    node: &'f PreloadNode,
) -> BoxFuture<'f, Result<Grouped, GraphloadError>> {
    async move {
        let mut per_parent: Grouped = vec![Vec::new(); parents.len()];
        let filter = NodeFilter {
            and: &node.modifier.and,
            omit: &node.modifier.omit,
        };

        for (descriptor, indices) in group_by_descriptor(ctx.registry, parents, &node.association)? {
            let lists = fetch_association(ctx, parents, &indices, descriptor, filter, &[], None).await?;
            for (index, list) in indices.into_iter().zip(lists) {
                let mut list = finalize(list, &descriptor.order, descriptor.distinct.as_ref());
                if node.distinct_on_primary_key {
                    list = distinct_records(list, &DistinctOn::PrimaryKey);
                }
                per_parent[index] = list;
            }
        }

        if !node.children.is_empty() {
            let (mut unique, positions) = dedupe(&per_parent);
            preload(ctx, &mut unique, &node.children).await?;
            for list in per_parent.iter_mut() {
                for record in list.iter_mut() {
                    if let Some(&position) = positions.get(&identity(record)) {
                        *record = unique[position].clone();
                    }
                }
            }
        }

        Ok(per_parent)
    }
    .boxed()
}

/// Rows of `descriptor` for each parent in `indices`, in fetch order
fn fetch_association<'f>(
    ctx: &'f PreloadContext<'_>,
    parents: &'f [Record],
    indices: &'f [usize],
    descriptor: &'f AssociationDescriptor,
    filter: NodeFilter<'f>,
    wrappers: &'f [&'f AssociationDescriptor],
    narrow: Option<&'f [String]>,
) -> BoxFuture<'f, Result<Grouped, GraphloadError>> {
    async move {
        if let Some(through) = descriptor.through.as_deref() {
            return fetch_through(ctx, parents, indices, descriptor, through, filter, wrappers).await;
        }
        match descriptor.kind {
            AssociationKind::BelongsTo => {
                fetch_belongs_to(ctx, parents, indices, descriptor, filter, wrappers, narrow).await
            }
            AssociationKind::HasOne | AssociationKind::HasMany => {
                fetch_has(ctx, parents, indices, descriptor, filter, wrappers).await
            }
        }
    }
    .boxed()
}

async fn fetch_through(
    ctx: &PreloadContext<'_>,
    parents: &[Record],
    indices: &[usize],
    descriptor: &AssociationDescriptor,
    through: &str,
    filter: NodeFilter<'_>,
    wrappers: &[&AssociationDescriptor],
) -> Result<Grouped, GraphloadError> {
    let through_descriptor = ctx
        .registry
        .lookup(&descriptor.owner, through)
        .map_err(CompilationError::from)?;
    let no_bypass = ScopeBypass::none();
    let unfiltered = NodeFilter {
        and: &[],
        omit: &no_bypass,
    };
    let intermediates =
        fetch_association(ctx, parents, indices, through_descriptor, unfiltered, &[], None).await?;

    let (mids, positions) = dedupe(&intermediates);
    let source = descriptor.source.as_deref().unwrap_or(&descriptor.name);
    let mut outer: Vec<&AssociationDescriptor> = vec![descriptor];
    outer.extend_from_slice(wrappers);
    let narrow = (!descriptor.targets.is_empty()).then_some(descriptor.targets.as_slice());

    let mut per_mid: Grouped = vec![Vec::new(); mids.len()];
    for (source_descriptor, mid_indices) in group_by_source(ctx.registry, &mids, source) {
        let lists = fetch_association(
            ctx,
            &mids,
            &mid_indices,
            source_descriptor,
            filter,
            &outer,
            narrow,
        )
        .await?;
        for (index, list) in mid_indices.into_iter().zip(lists) {
            per_mid[index] = list;
        }
    }

    Ok(intermediates
        .iter()
        .map(|list| {
            list.iter()
                .filter_map(|mid| positions.get(&identity(mid)))
                .flat_map(|&position| per_mid[position].iter().cloned())
                .collect()
        })
        .collect())
}

async fn fetch_belongs_to(
    ctx: &PreloadContext<'_>,
    parents: &[Record],
    indices: &[usize],
    descriptor: &AssociationDescriptor,
    filter: NodeFilter<'_>,
    wrappers: &[&AssociationDescriptor],
    narrow: Option<&[String]>,
) -> Result<Grouped, GraphloadError> {
    let mut result: Grouped = vec![Vec::new(); indices.len()];

    // Parents grouped by the class their foreign key points at
    let mut by_target: Vec<(String, Vec<(usize, Value)>)> = Vec::new();
    for (position, &index) in indices.iter().enumerate() {
        let parent = &parents[index];
        let Some(key) = parent.get(&descriptor.foreign_key).filter(|v| !v.is_null()) else {
            continue;
        };
        let target = if descriptor.polymorphic {
            polymorphic_class(ctx.registry, parent.attributes(), descriptor)
        } else {
            descriptor.targets.first().cloned()
        };
        let Some(target) = target.filter(|t| narrow.map_or(true, |allowed| allowed.contains(t)))
        else {
            continue;
        };
        match by_target.iter_mut().find(|(class, _)| *class == target) {
            Some((_, keys)) => keys.push((position, key.clone())),
            None => by_target.push((target, vec![(position, key.clone())])),
        }
    }

    for (target, keyed) in by_target {
        let target_pk = ctx.registry.class(&target).map_err(CompilationError::from)?.primary_key.clone();
        let key_column = descriptor.target_key(&target_pk).to_string();
        let keys: Vec<Value> = keyed.iter().map(|(_, key)| key.clone()).collect();
        let rows = fetch_rows(ctx, descriptor, wrappers, &target, &key_column, keys, None, filter).await?;

        let by_key = index_by(&rows, &key_column);
        for (position, key) in keyed {
            if let Some(matches) = by_key.get(&value_key(&key)) {
                result[position] = matches.iter().map(|&i| rows[i].clone()).collect();
            }
        }
    }
    Ok(result)
}

async fn fetch_has(
    ctx: &PreloadContext<'_>,
    parents: &[Record],
    indices: &[usize],
    descriptor: &AssociationDescriptor,
    filter: NodeFilter<'_>,
    wrappers: &[&AssociationDescriptor],
) -> Result<Grouped, GraphloadError> {
    let mut result: Grouped = vec![Vec::new(); indices.len()];
    let target = JoinPathCompiler::new(ctx.registry, filter.omit, ctx.passthrough, ctx.max_depth)
        .concrete_target(&descriptor.owner, descriptor, None)?;

    let mut keyed: Vec<(usize, Value)> = Vec::new();
    for (position, &index) in indices.iter().enumerate() {
        let parent = &parents[index];
        let owner_key = descriptor.owner_key(parent.primary_key_column());
        if let Some(key) = parent.get(owner_key).filter(|v| !v.is_null()) {
            keyed.push((position, key.clone()));
        }
    }
    if keyed.is_empty() {
        return Ok(result);
    }

    let type_check = descriptor
        .foreign_key_type_field
        .as_deref()
        .filter(|_| descriptor.polymorphic)
        .map(|field| {
            (
                field.to_string(),
                ctx.registry.polymorphic_type_name(&descriptor.owner),
            )
        });
    let keys: Vec<Value> = keyed.iter().map(|(_, key)| key.clone()).collect();
    let rows = fetch_rows(
        ctx,
        descriptor,
        wrappers,
        &target,
        &descriptor.foreign_key,
        keys,
        type_check,
        filter,
    )
    .await?;

    let by_key = index_by(&rows, &descriptor.foreign_key);
    for (position, key) in keyed {
        if let Some(matches) = by_key.get(&value_key(&key)) {
            result[position] = matches.iter().map(|&i| rows[i].clone()).collect();
        }
    }
    Ok(result)
}

/// One `WHERE key IN (...)` SELECT over the target table
#[allow(clippy::too_many_arguments)]
async fn fetch_rows(
    ctx: &PreloadContext<'_>,
    descriptor: &AssociationDescriptor,
    wrappers: &[&AssociationDescriptor],
    target: &str,
    key_column: &str,
    keys: Vec<Value>,
    type_check: Option<(String, String)>,
    filter: NodeFilter<'_>,
) -> Result<Vec<Record>, GraphloadError> {
    let model = ctx.registry.class(target).map_err(CompilationError::from)?;
    let alias = model.table.as_str();

    let mut unique_keys: Vec<Value> = Vec::new();
    for key in keys {
        if !unique_keys.iter().any(|k| value_key(k) == value_key(&key)) {
            unique_keys.push(key);
        }
    }

    let supplied: Vec<WhereClause> = filter.and.iter().map(|c| c.qualified(alias)).collect();
    let compiler = JoinPathCompiler::new(ctx.registry, filter.omit, ctx.passthrough, ctx.max_depth);
    let predicates = compiler.target_predicates(descriptor, wrappers, target, alias, &supplied)?;

    let mut command = SelectCommand::new(&model.table, alias);
    command
        .where_clauses
        .push(WhereClause::in_condition(&qualify(alias, key_column), unique_keys));
    if let Some((field, type_name)) = type_check {
        command
            .where_clauses
            .push(WhereClause::eq(&qualify(alias, &field), type_name));
    }
    command.where_clauses.extend(predicates.clauses);
    command.where_clauses.extend(supplied);
    command.order_by = descriptor.order_for(alias);
    command
        .order_by
        .push(OrderBy::asc(&qualify(alias, &model.primary_key)));

    let rows = run_select(ctx.executor, &command, ctx.transaction, ctx.log_sql, "preload").await?;
    Ok(rows
        .into_iter()
        .map(|row| marshal(ctx.registry, row, target))
        .collect())
}

fn group_by_descriptor<'r>(
    registry: &'r ModelRegistry,
    parents: &[Record],
    association: &str,
) -> Result<Vec<(&'r AssociationDescriptor, Vec<usize>)>, CompilationError> {
    let mut groups: Vec<(&AssociationDescriptor, Vec<usize>)> = Vec::new();
    for (index, parent) in parents.iter().enumerate() {
        let descriptor = registry.lookup(parent.class_name(), association)?;
        match groups
            .iter_mut()
            .find(|(known, _)| std::ptr::eq(*known, descriptor))
        {
            Some((_, indices)) => indices.push(index),
            None => groups.push((descriptor, vec![index])),
        }
    }
    Ok(groups)
}

/// Intermediate records grouped by their source descriptor; records whose
/// class has no such association are skipped
fn group_by_source<'r>(
    registry: &'r ModelRegistry,
    mids: &[Record],
    source: &str,
) -> Vec<(&'r AssociationDescriptor, Vec<usize>)> {
    let mut groups: Vec<(&AssociationDescriptor, Vec<usize>)> = Vec::new();
    for (index, mid) in mids.iter().enumerate() {
        let Ok(descriptor) = registry.lookup(mid.class_name(), source) else {
            continue;
        };
        match groups
            .iter_mut()
            .find(|(known, _)| std::ptr::eq(*known, descriptor))
        {
            Some((_, indices)) => indices.push(index),
            None => groups.push((descriptor, vec![index])),
        }
    }
    groups
}

fn identity(record: &Record) -> (String, String) {
    (
        record.class_name().to_string(),
        record.id().map(value_key).unwrap_or_default(),
    )
}

/// Unique records across all lists, first occurrence wins
fn dedupe(lists: &[Vec<Record>]) -> (Vec<Record>, HashMap<(String, String), usize>) {
    let mut unique = Vec::new();
    let mut positions = HashMap::new();
    for record in lists.iter().flatten() {
        positions.entry(identity(record)).or_insert_with(|| {
            unique.push(record.clone());
            unique.len() - 1
        });
    }
    (unique, positions)
}

fn index_by(records: &[Record], column: &str) -> HashMap<String, Vec<usize>> {
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (position, record) in records.iter().enumerate() {
        if let Some(value) = record.get(column).filter(|v| !v.is_null()) {
            index.entry(value_key(value)).or_default().push(position);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(class: &str, id: i64) -> Record {
        Record::new(class, "id", json!({"id": id}).as_object().cloned().unwrap())
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence_per_class_and_key() {
        let lists = vec![
            vec![record("Post", 1), record("Post", 2)],
            vec![record("Post", 2), record("User", 2)],
        ];
        let (unique, positions) = dedupe(&lists);
        assert_eq!(unique.len(), 3);
        assert_eq!(positions[&("User".to_string(), "2".to_string())], 2);
    }

    #[test]
    fn test_index_by_skips_null_keys() {
        let rows = vec![
            Record::new("Comment", "id", json!({"id": 1, "post_id": 7}).as_object().cloned().unwrap()),
            Record::new("Comment", "id", json!({"id": 3, "post_id": null}).as_object().cloned().unwrap()),
        ];
        let index = index_by(&rows, "post_id");
        assert_eq!(index.len(), 1);
        assert_eq!(index["7"], vec![0]);
    }
}
