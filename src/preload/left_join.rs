//! Left-join preload: the whole tree in one SELECT.
//!
//! Every node becomes one LEFT JOIN (through associations expand into
//! their intermediate joins) appended to the query's own joins. Columns
//! come back labeled `alias.column`; the object graph is rebuilt by walking
//! the rows, creating each entity once per `(node, primary key)` and
//! linking it to its parent. A NULL target key means the parent has no
//! row for that node.

use super::postprocess::{distinct_records, finalize};
use super::tree::PreloadNode;
use crate::error::CompilationError;
use crate::join_path::{Budget, JoinPathCompiler};
use crate::marshal::marshal;
use crate::models::{value_key, LoadedAssociation, Record, Row};
use crate::query_builder::conditions::qualify;
use crate::query_builder::{JoinStep, JoinType, OrderBy, ProjectedColumn};
use crate::registry::{DistinctOn, ModelRegistry};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct PlannedNode {
    alias: String,
    class: String,
    primary_key: String,
    singular: bool,
    /// `(alias, primary key)` of every joined step of this node
    chain: Vec<(String, String)>,
    order: Vec<OrderBy>,
    distinct: Option<DistinctOn>,
    distinct_on_primary_key: bool,
    children: Vec<usize>,
}

/// Compiled shape of one left-join preload
#[derive(Debug, Clone)]
pub struct LeftJoinPlan {
    root_alias: String,
    root_class: String,
    root_primary_key: String,
    nodes: Vec<PlannedNode>,
    top: Vec<usize>,
    /// Projection covering the root and every joined alias
    pub columns: Vec<ProjectedColumn>,
    /// Root primary key, then each node's declared order and keys
    pub order: Vec<OrderBy>,
}

/// Settings shared by every node of one plan
pub struct PlanContext<'c> {
    pub registry: &'c ModelRegistry,
    pub passthrough: &'c Map<String, Value>,
    pub max_depth: usize,
}

impl LeftJoinPlan {
    /// Compile `nodes` from the root, appending their joins to `steps`
    pub fn compile(
        ctx: &PlanContext<'_>,
        root_class: &str,
        root_alias: &str,
        nodes: &[PreloadNode],
        steps: &mut Vec<JoinStep>,
    ) -> Result<Self, CompilationError> {
        let root = ctx.registry.class(root_class)?;
        let mut plan = Self {
            root_alias: root_alias.to_string(),
            root_class: root_class.to_string(),
            root_primary_key: root.primary_key.clone(),
            nodes: Vec::new(),
            top: Vec::new(),
            columns: labeled(root_alias, &ctx.registry.family_columns(root_class)),
            order: vec![OrderBy::asc(&qualify(root_alias, &root.primary_key))],
        };

        for node in nodes {
            let index = plan.add_node(ctx, root_class, root_alias, node, steps)?;
            plan.top.push(index);
        }
        Ok(plan)
    }

    fn add_node(
        &mut self,
        ctx: &PlanContext<'_>,
        from_class: &str,
        from_alias: &str,
        node: &PreloadNode,
        steps: &mut Vec<JoinStep>,
    ) -> Result<usize, CompilationError> {
        let descriptor = ctx.registry.lookup(from_class, &node.association)?;
        let compiler = JoinPathCompiler::new(
            ctx.registry,
            &node.modifier.omit,
            ctx.passthrough,
            ctx.max_depth,
        );
        let mut budget = Budget::new(&node.alias, ctx.max_depth);
        let hop = compiler.compile_hop(
            from_class,
            from_alias,
            &self.root_alias,
            &node.association,
            &node.alias,
            JoinType::Left,
            &node.modifier.and,
            steps,
            &mut budget,
        )?;

        let mut chain = Vec::with_capacity(hop.chain.len());
        for (alias, class) in &hop.chain {
            let primary_key = ctx.registry.class(class)?.primary_key.clone();
            if *alias == hop.alias {
                self.columns
                    .extend(labeled(alias, &ctx.registry.family_columns(class)));
            } else {
                self.columns.extend(labeled(alias, std::slice::from_ref(&primary_key)));
            }
            chain.push((alias.clone(), primary_key));
        }

        let order = descriptor.order_for(&hop.alias);
        self.order.extend(order.iter().cloned());
        self.order.extend(
            chain
                .iter()
                .map(|(alias, pk)| OrderBy::asc(&qualify(alias, pk))),
        );

        let index = self.nodes.len();
        self.nodes.push(PlannedNode {
            alias: hop.alias.clone(),
            class: hop.class.clone(),
            primary_key: ctx.registry.class(&hop.class)?.primary_key.clone(),
            singular: hop.singular,
            chain,
            order,
            distinct: descriptor.distinct.clone(),
            distinct_on_primary_key: node.distinct_on_primary_key,
            children: Vec::new(),
        });

        for child in &node.children {
            let child_index = self.add_node(ctx, &hop.class, &hop.alias, child, steps)?;
            self.nodes[index].children.push(child_index);
        }
        Ok(index)
    }

    /// Rebuild root records, with every node attached, from the flat rows
    pub fn reconstruct(&self, registry: &ModelRegistry, rows: &[Row]) -> Vec<Record> {
        let mut graph = Graph::default();
        let mut roots: Vec<(String, Record)> = Vec::new();

        for row in rows {
            let attributes = extract_alias(row, &self.root_alias);
            let Some(root_key) = attributes
                .get(&self.root_primary_key)
                .filter(|v| !v.is_null())
                .map(value_key)
            else {
                continue;
            };
            if !roots.iter().any(|(key, _)| *key == root_key) {
                roots.push((
                    root_key.clone(),
                    marshal(registry, attributes, &self.root_class),
                ));
            }
            for &index in &self.top {
                self.walk(registry, index, &root_key, row, &mut graph);
            }
        }

        roots
            .into_iter()
            .map(|(key, mut record)| {
                for &index in &self.top {
                    self.attach(index, &key, &mut record, &graph);
                }
                record
            })
            .collect()
    }

    fn walk(
        &self,
        registry: &ModelRegistry,
        index: usize,
        parent_key: &str,
        row: &Row,
        graph: &mut Graph,
    ) {
        let node = &self.nodes[index];
        let links = graph
            .links
            .entry((index, parent_key.to_string()))
            .or_default();

        let attributes = extract_alias(row, &node.alias);
        let Some(entity_key) = attributes
            .get(&node.primary_key)
            .filter(|v| !v.is_null())
            .map(value_key)
        else {
            return;
        };

        let chain_key: Vec<String> = node
            .chain
            .iter()
            .map(|(alias, pk)| {
                row.get(&format!("{alias}.{pk}"))
                    .map(value_key)
                    .unwrap_or_default()
            })
            .collect();
        if !links.iter().any(|(known, _)| *known == chain_key) {
            links.push((chain_key, entity_key.clone()));
        }
        graph
            .entities
            .entry((index, entity_key.clone()))
            .or_insert_with(|| marshal(registry, attributes, &node.class));

        for &child in &node.children {
            self.walk(registry, child, &entity_key, row, graph);
        }
    }

    fn attach(&self, index: usize, parent_key: &str, parent: &mut Record, graph: &Graph) {
        let node = &self.nodes[index];
        let mut records: Vec<Record> = graph
            .links
            .get(&(index, parent_key.to_string()))
            .map(|links| {
                links
                    .iter()
                    .filter_map(|(_, key)| {
                        let mut record = graph.entities.get(&(index, key.clone()))?.clone();
                        for &child in &node.children {
                            self.attach(child, key, &mut record, graph);
                        }
                        Some(record)
                    })
                    .collect()
            })
            .unwrap_or_default();

        records = finalize(records, &node.order, node.distinct.as_ref());
        if node.distinct_on_primary_key {
            records = distinct_records(records, &DistinctOn::PrimaryKey);
        }

        let value = if node.singular {
            LoadedAssociation::One(records.into_iter().next().map(Box::new))
        } else {
            LoadedAssociation::Many(records)
        };
        parent.set_association(&node.alias, value);
    }

    /// Number of tree nodes compiled into this plan
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Default)]
struct Graph {
    /// Child links per `(node, parent key)`, unique by joined key chain
    links: HashMap<(usize, String), Vec<(Vec<String>, String)>>,
    entities: HashMap<(usize, String), Record>,
}

fn labeled(alias: &str, columns: &[String]) -> Vec<ProjectedColumn> {
    columns
        .iter()
        .map(|column| ProjectedColumn {
            column: qualify(alias, column),
            label: format!("{alias}.{column}"),
        })
        .collect()
}

/// Columns labeled `alias.column`, keyed by bare column name
pub fn extract_alias(row: &Row, alias: &str) -> Row {
    row.iter()
        .filter_map(|(label, value)| {
            let column = label.strip_prefix(alias)?.strip_prefix('.')?;
            Some((column.to_string(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DbType, ModelClass};
    use crate::preload::tree::{build_tree, PreloadArg};
    use crate::registry::{AssociationDescriptor, RegistryBuilder};
    use serde_json::json;

    fn registry() -> ModelRegistry {
        let mut builder = RegistryBuilder::new();
        builder
            .register_model(ModelClass::new("User", "users").column("name", DbType::Text))
            .unwrap()
            .register_model(
                ModelClass::new("Post", "posts")
                    .column("user_id", DbType::BigInt)
                    .column("title", DbType::Text),
            )
            .unwrap();
        builder
            .register(
                "User",
                AssociationDescriptor::has_many("posts", "Post")
                    .order("title", crate::query_builder::Direction::Asc),
            )
            .unwrap()
            .register("Post", AssociationDescriptor::belongs_to("user", "User"))
            .unwrap();
        builder.build().unwrap()
    }

    fn plan(registry: &ModelRegistry, args: &[PreloadArg]) -> (LeftJoinPlan, Vec<JoinStep>) {
        let nodes = build_tree(args).unwrap();
        let passthrough = Map::new();
        let ctx = PlanContext {
            registry,
            passthrough: &passthrough,
            max_depth: 12,
        };
        let mut steps = Vec::new();
        let plan = LeftJoinPlan::compile(&ctx, "User", "users", &nodes, &mut steps).unwrap();
        (plan, steps)
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_projection_and_order_cover_every_alias() {
        let registry = registry();
        let (plan, steps) = plan(&registry, &[PreloadArg::new("posts")]);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].join_type, JoinType::Left);
        let labels: Vec<&str> = plan.columns.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["users.id", "users.name", "posts.id", "posts.user_id", "posts.title"]
        );
        let order: Vec<&str> = plan.order.iter().map(|o| o.column.as_str()).collect();
        assert_eq!(order, vec!["users.id", "posts.title", "posts.id"]);
    }

    #[test]
    fn test_reconstruct_links_rows_and_treats_null_as_absent() {
        let registry = registry();
        let (plan, _) = plan(&registry, &[PreloadArg::new("posts.user")]);
        let rows = vec![
            row(json!({"users.id": 1, "users.name": "a", "posts.id": 11, "posts.user_id": 1, "posts.title": "b", "user.id": 1, "user.name": "a"})),
            row(json!({"users.id": 1, "users.name": "a", "posts.id": 10, "posts.user_id": 1, "posts.title": "a", "user.id": 1, "user.name": "a"})),
            row(json!({"users.id": 2, "users.name": "z", "posts.id": null, "posts.user_id": null, "posts.title": null, "user.id": null, "user.name": null})),
        ];
        let users = plan.reconstruct(&registry, &rows);
        assert_eq!(users.len(), 2);

        let posts = users[0].many("posts").unwrap();
        let ids: Vec<&Value> = posts.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec![&json!(10), &json!(11)]);
        assert_eq!(
            posts[0].one("user").unwrap().and_then(Record::id),
            Some(&json!(1))
        );
        assert!(users[1].many("posts").unwrap().is_empty());
    }

    #[test]
    fn test_extract_alias_requires_exact_prefix() {
        let row = row(json!({"posts.id": 1, "posts_x.id": 2, "post.id": 3}));
        let extracted = extract_alias(&row, "posts");
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted["id"], json!(1));
    }
}
