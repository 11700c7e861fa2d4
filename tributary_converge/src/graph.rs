// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency graph compiled from trait declarations.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tributary_dirty::intern::Interner;
use tributary_dirty::{DenseGraph, DenseKey, InternId};

use crate::decl::{DeriveFn, EqualsFn, KeyFn, TraitDecl, TraitSet, TransformFn};
use crate::error::BuildError;
use crate::path::FieldPath;
use crate::state::StateSchema;

/// Sub-fields of a source snapshot object.
pub const SNAPSHOT_FIELDS: [&str; 4] = ["status", "keyHash", "data", "error"];

/// Dense id of a derived node, assigned in declaration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Returns the id as a `usize` index.
    #[inline]
    #[must_use]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl DenseKey for NodeId {
    #[inline]
    fn index(self) -> u32 {
        self.0
    }

    #[inline]
    fn from_index(index: u32) -> Self {
        Self(index)
    }
}

/// Kind of derived node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Pure function of its dependencies.
    Computed,
    /// Backed by an external resource.
    Source,
    /// Copy of another field.
    Link,
}

impl NodeKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Computed => "computed",
            Self::Source => "source",
            Self::Link => "link",
        }
    }
}

#[derive(Clone)]
pub(crate) enum NodeEval {
    Computed {
        get: DeriveFn,
        equals: Option<EqualsFn>,
    },
    Link {
        transform: Option<TransformFn>,
    },
    Source {
        resource: String,
        key: KeyFn,
    },
}

/// One derived field.
#[derive(Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    label: String,
    target: FieldPath,
    reads: Vec<FieldPath>,
    scope: Option<FieldPath>,
    pub(crate) eval: NodeEval,
}

impl Node {
    /// Dense id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node kind.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// `kind:path` label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Field the node writes (canonical).
    #[must_use]
    pub fn target(&self) -> &FieldPath {
        &self.target
    }

    /// Declared dependency paths, as written.
    #[must_use]
    pub fn reads(&self) -> &[FieldPath] {
        &self.reads
    }

    /// List the node is evaluated over, for item-level nodes.
    #[must_use]
    pub fn scope(&self) -> Option<&FieldPath> {
        self.scope.as_ref()
    }

    /// Resource id, for source nodes.
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        match &self.eval {
            NodeEval::Source { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("reads", &self.reads)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Stable hash of a graph's structure (SHA-256, lowercase hex).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StaticDigest(String);

impl StaticDigest {
    /// Hex string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StaticDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable dependency graph of one module definition.
///
/// Built once from a [`TraitSet`] and shared read-only (behind an `Arc`) by
/// every instance of the module. Building the same declarations against the
/// same schema always yields the same node ids, edges and digest.
///
/// - `edges` are the declared `(dependency path, node)` pairs.
/// - The reverse adjacency maps each canonical dependency path to the nodes
///   that read it.
/// - The node graph links a reading node to every node whose target
///   overlaps one of its reads; it is what ordering and closure walk.
///
/// ```
/// use serde_json::json;
/// use tributary_converge::{Computed, DependencyGraph, StateSchema, TraitSet};
///
/// let schema = StateSchema::from_value(&json!({ "a": 1, "b": 2 }));
/// let traits = TraitSet::new()
///     .computed("sum", Computed::new(["a", "b"], |v| json!(v[0].as_i64().unwrap_or(0) + v[1].as_i64().unwrap_or(0))))
///     .computed("double", Computed::new(["sum"], |v| json!(v[0].as_i64().unwrap_or(0) * 2)));
///
/// let graph = DependencyGraph::build(&traits, &schema).unwrap();
/// assert_eq!(graph.node_count(), 2);
/// assert_eq!(graph.depth(), 2);
/// assert_eq!(graph.reverse_adjacency(&"a".parse().unwrap()).len(), 1);
/// ```
pub struct DependencyGraph {
    nodes: Vec<Node>,
    edges: Vec<(FieldPath, NodeId)>,
    paths: Interner<FieldPath>,
    sorted_paths: BTreeMap<FieldPath, InternId>,
    reverse: Vec<Vec<NodeId>>,
    node_graph: DenseGraph<NodeId>,
    depth: usize,
    digest: StaticDigest,
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("depth", &self.depth)
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}

fn parse_path(target: &str, text: &str) -> Result<FieldPath, BuildError> {
    FieldPath::parse(text).map_err(|source| BuildError::InvalidPath {
        target: target.to_owned(),
        source,
    })
}

impl DependencyGraph {
    /// Compiles `traits` against `schema`.
    ///
    /// Declared targets extend the schema, so derived fields may depend on
    /// each other. Source targets also register their snapshot sub-fields.
    pub fn build(traits: &TraitSet, schema: &StateSchema) -> Result<Self, BuildError> {
        let mut known = schema.clone();
        let mut targets = Vec::with_capacity(traits.len());
        let mut seen = HashSet::new();
        for (target, decl) in traits.iter() {
            let path = parse_path(target, target)?.canonical();
            if path.is_root() {
                return Err(BuildError::RootTarget);
            }
            if path.item_depth() > 1 {
                return Err(BuildError::NestedListScope(path));
            }
            if !seen.insert(path.clone()) {
                return Err(BuildError::DuplicateTarget(path));
            }
            known.insert(&path);
            if matches!(decl, TraitDecl::Source(_)) {
                for field in SNAPSHOT_FIELDS {
                    known.insert(&path.child(field));
                }
            }
            targets.push(path);
        }

        let mut nodes = Vec::with_capacity(targets.len());
        for (i, ((raw_target, decl), target)) in traits.iter().zip(targets).enumerate() {
            let id = NodeId(u32::try_from(i).expect("too many trait declarations for NodeId (u32)"));
            let (kind, eval) = match decl {
                TraitDecl::Computed(c) => (
                    NodeKind::Computed,
                    NodeEval::Computed {
                        get: c.get.clone(),
                        equals: c.equals.clone(),
                    },
                ),
                TraitDecl::Link(l) => (
                    NodeKind::Link,
                    NodeEval::Link {
                        transform: l.transform.clone(),
                    },
                ),
                TraitDecl::Source(s) => (
                    NodeKind::Source,
                    NodeEval::Source {
                        resource: s.resource.clone(),
                        key: s.key.clone(),
                    },
                ),
            };
            let label = format!("{}:{}", kind.as_str(), target);
            let scope = target.list_scope();

            let mut reads = Vec::new();
            for dep in decl.deps() {
                let dep = parse_path(raw_target, dep)?;
                if dep.item_depth() > 1 {
                    return Err(BuildError::NestedListScope(dep));
                }
                if dep.item_depth() == 1 && dep.list_scope() != scope {
                    return Err(BuildError::ForeignItemDependency { node: label, dep });
                }
                if !known.contains(&dep) {
                    return Err(BuildError::UnresolvedDependency { node: label, dep });
                }
                reads.push(dep);
            }

            nodes.push(Node {
                id,
                kind,
                label,
                target,
                reads,
                scope,
                eval,
            });
        }

        let mut paths = Interner::new();
        let mut sorted_paths = BTreeMap::new();
        let mut reverse: Vec<Vec<NodeId>> = Vec::new();
        let mut edges = Vec::new();
        for node in &nodes {
            for dep in &node.reads {
                let canonical = dep.canonical();
                let path_id = paths.intern(canonical.clone());
                sorted_paths.insert(canonical, path_id);
                if reverse.len() <= path_id.as_usize() {
                    reverse.resize_with(path_id.as_usize() + 1, Vec::new);
                }
                let readers = &mut reverse[path_id.as_usize()];
                if !readers.contains(&node.id) {
                    readers.push(node.id);
                }
                edges.push((dep.clone(), node.id));
            }
        }

        let mut node_graph = DenseGraph::with_keys(nodes.len());
        for reader in &nodes {
            for dep in &reader.reads {
                // A node never depends on its own write.
                for writer in nodes
                    .iter()
                    .filter(|w| w.id != reader.id && w.target.overlaps(dep))
                {
                    node_graph.add_edge(reader.id, writer.id);
                }
            }
        }

        let depth = node_graph.depth();
        let digest = digest_of(&nodes);
        tracing::debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            depth,
            digest = %digest,
            "built dependency graph"
        );

        Ok(Self {
            nodes,
            edges,
            paths,
            sorted_paths,
            reverse,
            node_graph,
            depth,
            digest,
        })
    }

    /// All nodes, in id order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The node with `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.as_usize()]
    }

    /// Number of derived nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterates every node id.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(Node::id)
    }

    /// Declared `(dependency, node)` edges in declaration order.
    #[must_use]
    pub fn edges(&self) -> &[(FieldPath, NodeId)] {
        &self.edges
    }

    /// Nodes that declared exactly `path` (canonicalized) as a dependency.
    #[must_use]
    pub fn reverse_adjacency(&self, path: &FieldPath) -> &[NodeId] {
        self.paths
            .lookup(&path.canonical())
            .and_then(|id| self.reverse.get(id.as_usize()))
            .map_or(&[], Vec::as_slice)
    }

    /// Calls `f` for every node with a dependency that overlaps `written`:
    /// dependencies on `written` itself, on any ancestor (the list or object
    /// containing it), or on any descendant. A node may be reported more
    /// than once.
    pub fn for_each_reader(&self, written: &FieldPath, mut f: impl FnMut(NodeId)) {
        let canonical = written.canonical();
        for len in 0..=canonical.len() {
            if let Some(id) = self.paths.lookup(&canonical.prefix(len)) {
                self.reverse[id.as_usize()].iter().copied().for_each(&mut f);
            }
        }
        for (path, id) in self.sorted_paths.range(canonical.clone()..) {
            if !path.starts_with(&canonical) {
                break;
            }
            if path.len() > canonical.len() {
                self.reverse[id.as_usize()].iter().copied().for_each(&mut f);
            }
        }
    }

    /// Node-level dependency graph (reader depends on writer).
    #[must_use]
    pub fn node_graph(&self) -> &DenseGraph<NodeId> {
        &self.node_graph
    }

    /// Longest dependency chain; bounds fixed-point passes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Structural digest used as the plan-cache key.
    #[must_use]
    pub fn digest(&self) -> &StaticDigest {
        &self.digest
    }
}

fn digest_of(nodes: &[Node]) -> StaticDigest {
    let mut hasher = Sha256::new();
    for node in nodes {
        hasher.update(node.label.as_bytes());
        hasher.update(b"<-");
        for (i, dep) in node.reads.iter().enumerate() {
            if i > 0 {
                hasher.update(b",");
            }
            hasher.update(dep.to_string().as_bytes());
        }
        if let Some(resource) = node.resource() {
            hasher.update(b"@");
            hasher.update(resource.as_bytes());
        }
        hasher.update(b"\n");
    }
    StaticDigest(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{Computed, Link, Source};
    use serde_json::{Value, json};

    fn p(text: &str) -> FieldPath {
        FieldPath::parse(text).unwrap()
    }

    fn first(values: &[&Value]) -> Value {
        values[0].clone()
    }

    fn cart() -> (TraitSet, StateSchema) {
        let schema = StateSchema::from_value(&json!({
            "items": [{ "price": 1, "qty": 1 }],
            "coupon": null,
            "userId": 1
        }));
        let traits = TraitSet::new()
            .computed("items[].total", Computed::new(["items[].price", "items[].qty"], first))
            .computed("summary.total", Computed::new(["items"], first))
            .link("summary.display", Link::new("summary.total"))
            .source("user", Source::new("users", ["userId"], |v| Some(v[0].clone())))
            .computed("greeting", Computed::new(["user.data"], first));
        (traits, schema)
    }

    #[test]
    fn builds_nodes_in_declaration_order() {
        let (traits, schema) = cart();
        let graph = DependencyGraph::build(&traits, &schema).unwrap();
        let labels: Vec<_> = graph.nodes().iter().map(Node::label).collect();
        assert_eq!(
            labels,
            [
                "computed:items[].total",
                "computed:summary.total",
                "link:summary.display",
                "source:user",
                "computed:greeting"
            ]
        );
        assert_eq!(graph.node(NodeId(0)).scope(), Some(&p("items")));
        assert_eq!(graph.node(NodeId(3)).resource(), Some("users"));
        assert_eq!(graph.edges().len(), 6);
    }

    #[test]
    fn item_writes_reach_list_aggregate() {
        let (traits, schema) = cart();
        let graph = DependencyGraph::build(&traits, &schema).unwrap();
        // summary.total reads `items`, which contains items[].total.
        assert_eq!(graph.node_graph().dependencies(NodeId(1)), &[NodeId(0)]);

        let mut readers = Vec::new();
        graph.for_each_reader(&p("items.3.price"), |n| readers.push(n));
        readers.sort_unstable();
        readers.dedup();
        assert_eq!(readers, vec![NodeId(0), NodeId(1)]);
    }

    #[test]
    fn writing_a_parent_reaches_child_readers() {
        let (traits, schema) = cart();
        let graph = DependencyGraph::build(&traits, &schema).unwrap();
        let mut readers = Vec::new();
        graph.for_each_reader(&p("user"), |n| readers.push(n));
        assert_eq!(readers, vec![NodeId(4)]);
    }

    #[test]
    fn unresolved_dependency_is_a_build_error() {
        let schema = StateSchema::from_value(&json!({ "a": 1 }));
        let traits = TraitSet::new().computed("b", Computed::new(["missing"], first));
        let err = DependencyGraph::build(&traits, &schema).unwrap_err();
        assert_eq!(
            err,
            BuildError::UnresolvedDependency {
                node: "computed:b".into(),
                dep: p("missing")
            }
        );
    }

    #[test]
    fn rejects_duplicates_and_foreign_items() {
        let schema = StateSchema::from_value(&json!({ "a": 1, "xs": [{ "v": 1 }] }));
        let dup = TraitSet::new()
            .computed("b", Computed::new(["a"], first))
            .link("b", Link::new("a"));
        assert_eq!(
            DependencyGraph::build(&dup, &schema).unwrap_err(),
            BuildError::DuplicateTarget(p("b"))
        );

        let foreign = TraitSet::new().computed("total", Computed::new(["xs[].v"], first));
        assert!(matches!(
            DependencyGraph::build(&foreign, &schema),
            Err(BuildError::ForeignItemDependency { .. })
        ));
    }

    #[test]
    fn rebuild_is_identical() {
        let (traits, schema) = cart();
        let a = DependencyGraph::build(&traits, &schema).unwrap();
        let b = DependencyGraph::build(&traits, &schema).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.edges(), b.edges());
        assert_eq!(a.depth(), b.depth());
        assert_eq!(a.digest().as_str().len(), 64);
    }

    #[test]
    fn reading_an_ancestor_of_the_target_is_not_a_self_edge() {
        let schema = StateSchema::from_value(&json!({ "form": { "name": "" } }));
        let traits = TraitSet::new().computed("form.valid", Computed::new(["form"], first));
        let graph = DependencyGraph::build(&traits, &schema).unwrap();
        assert!(graph.node_graph().dependents(NodeId(0)).is_empty());
        assert_eq!(graph.node_graph().edge_count(), 0);
        assert_eq!(graph.depth(), 1);
    }

    #[test]
    fn cycles_are_representable() {
        let schema = StateSchema::from_value(&json!({}));
        let traits = TraitSet::new()
            .computed("x", Computed::new(["y"], first))
            .computed("y", Computed::new(["x"], first));
        let graph = DependencyGraph::build(&traits, &schema).unwrap();
        assert_eq!(graph.node_graph().dependents(NodeId(0)), &[NodeId(1)]);
        assert_eq!(graph.node_graph().dependents(NodeId(1)), &[NodeId(0)]);
        assert_eq!(graph.depth(), 2);
    }
}
