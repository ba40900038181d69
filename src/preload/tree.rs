//! Preload request parsing.
//!
//! Callers describe what to load with [`PreloadArg`]s: a plain name, an
//! aliased name (`"posts as p"`), a dotted chain (`"posts.comments"`) or a
//! name with nested children and a modifier. [`build_tree`] turns one call's
//! arguments into a [`PreloadNode`] forest.

use crate::error::CompilationError;
use crate::join_path::Hop;
use crate::query_builder::WhereClause;
use crate::registry::ModelRegistry;
use crate::scopes::ScopeBypass;

/// Per-node override of what the association loads
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreloadModifier {
    /// Extra conditions on the node's rows, over bare or alias-qualified columns
    pub and: Vec<WhereClause>,
    /// Default scopes omitted for this node
    pub omit: ScopeBypass,
}

impl PreloadModifier {
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.omit == ScopeBypass::none()
    }
}

/// One argument of a `preload(...)` call
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadArg {
    pub path: String,
    pub children: Vec<PreloadArg>,
    pub modifier: PreloadModifier,
    pub distinct: bool,
}

impl PreloadArg {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            children: Vec::new(),
            modifier: PreloadModifier::default(),
            distinct: false,
        }
    }

    /// Nest `child` under the last hop of this argument
    pub fn with(mut self, child: impl Into<PreloadArg>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn and(mut self, clause: WhereClause) -> Self {
        self.modifier.and.push(clause);
        self
    }

    pub fn omit_default_scope(mut self, name: &str) -> Self {
        self.modifier.omit = self.modifier.omit.with_name(name);
        self
    }

    pub fn omit_default_scopes(mut self) -> Self {
        self.modifier.omit = ScopeBypass::all();
        self
    }

    /// Collapse duplicate rows of this node by primary key
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

impl From<&str> for PreloadArg {
    fn from(path: &str) -> Self {
        PreloadArg::new(path)
    }
}

impl From<String> for PreloadArg {
    fn from(path: String) -> Self {
        PreloadArg::new(&path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreloadNode {
    pub association: String,
    pub alias: String,
    pub children: Vec<PreloadNode>,
    pub modifier: PreloadModifier,
    pub distinct_on_primary_key: bool,
}

impl PreloadNode {
    fn leaf(hop: &Hop) -> Self {
        Self {
            association: hop.association.clone(),
            alias: hop.effective_alias().to_string(),
            children: Vec::new(),
            modifier: PreloadModifier::default(),
            distinct_on_primary_key: false,
        }
    }

    /// Nodes in this subtree, self included
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(PreloadNode::size).sum::<usize>()
    }
}

/// Parse one call's arguments into a forest. Siblings naming the same
/// association under the same alias merge; siblings sharing an alias
/// otherwise collide.
pub fn build_tree(args: &[PreloadArg]) -> Result<Vec<PreloadNode>, CompilationError> {
    let mut forest = Vec::new();
    for arg in args {
        merge(&mut forest, node_from_arg(arg)?)?;
    }
    Ok(forest)
}

/// Merge `node` into `siblings`, combining children of matching nodes
pub fn merge(siblings: &mut Vec<PreloadNode>, node: PreloadNode) -> Result<(), CompilationError> {
    let Some(existing) = siblings.iter_mut().find(|s| s.alias == node.alias) else {
        siblings.push(node);
        return Ok(());
    };

    let compatible = existing.association == node.association
        && (node.modifier.is_empty()
            || existing.modifier.is_empty()
            || existing.modifier == node.modifier);
    if !compatible {
        return Err(CompilationError::AliasCollision { alias: node.alias });
    }

    if existing.modifier.is_empty() {
        existing.modifier = node.modifier;
    }
    existing.distinct_on_primary_key |= node.distinct_on_primary_key;
    for child in node.children {
        merge(&mut existing.children, child)?;
    }
    Ok(())
}

fn node_from_arg(arg: &PreloadArg) -> Result<PreloadNode, CompilationError> {
    let hops = arg
        .path
        .split('.')
        .map(Hop::parse)
        .collect::<Result<Vec<_>, _>>()?;
    let Some((last, ancestors)) = hops.split_last() else {
        return Err(CompilationError::InvalidPath(arg.path.clone()));
    };

    let mut node = PreloadNode::leaf(last);
    node.modifier = arg.modifier.clone();
    node.distinct_on_primary_key = arg.distinct;
    for child in &arg.children {
        merge(&mut node.children, node_from_arg(child)?)?;
    }

    for hop in ancestors.iter().rev() {
        let mut parent = PreloadNode::leaf(hop);
        parent.children.push(node);
        node = parent;
    }
    Ok(node)
}

/// Check every node names a registered association, starting from
/// `class`. Polymorphic nodes are checked against each candidate.
pub fn validate(
    registry: &ModelRegistry,
    class: &str,
    nodes: &[PreloadNode],
) -> Result<(), CompilationError> {
    for node in nodes {
        let descriptor = registry.lookup(class, &node.association)?;
        for target in registry.resolve_targets(class, descriptor)? {
            validate(registry, &target, &node.children)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dotted_paths_nest_and_merge() {
        let forest = build_tree(&[
            PreloadArg::new("posts.comments"),
            PreloadArg::new("posts.user"),
            PreloadArg::new("ratings"),
        ])
        .unwrap();
        assert_eq!(forest.len(), 2);
        let children: Vec<&str> = forest[0].children.iter().map(|c| c.alias.as_str()).collect();
        assert_eq!(children, vec!["comments", "user"]);
        assert_eq!(forest[0].size(), 3);
    }

    #[test]
    fn test_sibling_alias_collision() {
        let err = build_tree(&[PreloadArg::new("posts as p"), PreloadArg::new("comments as p")])
            .unwrap_err();
        assert_eq!(err, CompilationError::AliasCollision { alias: "p".to_string() });

        let nested = PreloadArg::new("posts")
            .with("comments as c")
            .with("user as c");
        assert!(build_tree(&[nested]).is_err());
    }

    #[test]
    fn test_modifiers_and_explicit_children() {
        let arg = PreloadArg::new("posts as p")
            .and(WhereClause::eq("published", true))
            .omit_default_scope("soft_delete")
            .with(PreloadArg::new("comments").distinct());
        let forest = build_tree(&[arg]).unwrap();
        assert_eq!(forest[0].association, "posts");
        assert_eq!(forest[0].alias, "p");
        assert_eq!(forest[0].modifier.and.len(), 1);
        assert!(forest[0].modifier.omit.bypasses("soft_delete"));
        assert!(forest[0].children[0].distinct_on_primary_key);
    }

    #[test]
    fn test_conflicting_modifiers_collide() {
        let a = PreloadArg::new("posts").and(WhereClause::eq("published", true));
        let b = PreloadArg::new("posts").and(WhereClause::eq("published", false));
        assert!(build_tree(&[a, b]).is_err());
    }
}
