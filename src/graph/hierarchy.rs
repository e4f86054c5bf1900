//! Hierarchy graph - inheritance relationships across all layers
//!
//! Built breadth-first from the project units. Parents are followed into
//! library and runtime layers when they resolve; parents that resolve
//! nowhere are kept as dangling edges. A unit that fails to decode is
//! recorded against its own name and does not abort the build.

use super::edge::{EdgeKind, HierarchyEdge};
use crate::codec::{access, TypeHierarchy, UnitDecl, OBJECT};
use crate::layer::LayerKind;
use crate::workspace::Workspace;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Instant;

/// Method signature as seen by the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodSig {
    pub name: String,
    pub descriptor: String,
    pub access: u16,
}

impl MethodSig {
    /// Concrete, non-static, non-private instance method
    pub fn is_overridable_target(&self) -> bool {
        self.access & (access::STATIC | access::PRIVATE | access::ABSTRACT) == 0
            && self.name != "<init>"
            && self.name != "<clinit>"
    }
}

/// A decoded type in the hierarchy.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyNode {
    pub name: String,
    pub access: u16,
    /// Kind of the layer the type resolved from
    pub layer: LayerKind,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<MethodSig>,
}

impl HierarchyNode {
    fn from_decl(decl: &UnitDecl, layer: LayerKind) -> Self {
        Self {
            name: decl.name.clone(),
            access: decl.access,
            layer,
            super_name: decl.super_name.clone(),
            interfaces: decl.interfaces.clone(),
            methods: decl
                .methods
                .iter()
                .map(|m| MethodSig {
                    name: m.name.clone(),
                    descriptor: m.descriptor.clone(),
                    access: m.access,
                })
                .collect(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    /// Superclass first, then interfaces
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.super_name.as_deref().into_iter().chain(self.interfaces.iter().map(String::as_str))
    }

    /// The method with this name and descriptor, if declared here
    pub fn declares(&self, name: &str, descriptor: &str) -> Option<&MethodSig> {
        self.methods.iter().find(|m| m.name == name && m.descriptor == descriptor)
    }
}

/// Inheritance graph over every type reachable from the project units.
#[derive(Debug, Default)]
pub struct HierarchyGraph {
    nodes: HashMap<String, HierarchyNode>,
    /// Reverse index: parent → direct children
    children: HashMap<String, BTreeSet<String>>,
    dangling: Vec<HierarchyEdge>,
    failures: HashMap<String, Error>,
    edge_count: usize,
}

impl HierarchyGraph {
    pub(crate) fn build(workspace: &Workspace) -> Self {
        let started = Instant::now();
        let mut graph = Self::default();

        let mut queue: VecDeque<String> = workspace.all_unit_names().into_iter().collect();
        let mut seen: HashSet<String> = queue.iter().cloned().collect();

        while let Some(name) = queue.pop_front() {
            let Some(unit) = workspace.resolve_unit(&name) else {
                continue;
            };
            let layer = workspace
                .resolve_containing_layer(&name)
                .map(|l| l.kind())
                .unwrap_or(LayerKind::Runtime);

            let decl = match workspace.codec().decode(unit) {
                Ok(decl) => decl,
                Err(e) => {
                    tracing::warn!("Failed to decode {} for the hierarchy: {}", name, e);
                    graph.failures.insert(name, e);
                    continue;
                }
            };

            let super_edge = decl.super_name.iter().map(|s| (s, EdgeKind::Extends));
            let interface_edges = decl.interfaces.iter().map(|i| (i, EdgeKind::Implements));
            for (parent, kind) in super_edge.chain(interface_edges) {
                graph.edge_count += 1;
                graph.children.entry(parent.clone()).or_default().insert(name.clone());

                if seen.contains(parent) {
                    continue;
                }
                if workspace.has_unit(parent) {
                    seen.insert(parent.clone());
                    queue.push_back(parent.clone());
                } else {
                    graph.dangling.push(HierarchyEdge::new(name.as_str(), parent.as_str(), kind));
                }
            }

            graph.nodes.insert(name, HierarchyNode::from_decl(&decl, layer));
        }

        tracing::debug!(
            "Built hierarchy graph: {} types, {} edges, {} dangling, {} failures in {:?}",
            graph.nodes.len(),
            graph.edge_count,
            graph.dangling.len(),
            graph.failures.len(),
            started.elapsed()
        );
        graph
    }

    fn check(&self, name: &str) -> Result<()> {
        match self.failures.get(name) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    // ========== Node access ==========

    pub fn node(&self, name: &str) -> Option<&HierarchyNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.values()
    }

    /// The recorded decode failure of a type, if any
    pub fn decode_failure(&self, name: &str) -> Option<&Error> {
        self.failures.get(name)
    }

    pub fn decode_failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.failures.iter().map(|(k, v)| (k.as_str(), v))
    }

    // ========== Traversal ==========

    /// Declared supertypes of a type (empty for unknown names)
    pub fn direct_parents(&self, name: &str) -> Vec<&str> {
        self.nodes.get(name).map(|n| n.parents().collect()).unwrap_or_default()
    }

    /// Types that directly extend or implement `name`
    pub fn direct_children(&self, name: &str) -> Vec<&str> {
        self.children
            .get(name)
            .map(|c| c.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every supertype reachable upwards from `name`, excluding `name`.
    ///
    /// Dangling parents are included but not traversed. Fails if `name`
    /// itself could not be decoded; unknown names yield an empty set.
    pub fn all_parents(&self, name: &str) -> Result<BTreeSet<String>> {
        self.check(name)?;
        Ok(self.reach(name, |n| self.direct_parents(n)))
    }

    /// Every subtype reachable downwards from `name`, excluding `name`.
    pub fn all_children(&self, name: &str) -> Result<BTreeSet<String>> {
        self.check(name)?;
        Ok(self.reach(name, |n| self.direct_children(n)))
    }

    fn reach<'a>(&'a self, start: &str, next: impl Fn(&str) -> Vec<&'a str>) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut stack = next(start);
        while let Some(current) = stack.pop() {
            if current == start || !result.insert(current.to_string()) {
                continue;
            }
            stack.extend(next(current));
        }
        result
    }

    /// Whether `child` is `parent` or inherits from it
    pub fn is_subtype_of(&self, child: &str, parent: &str) -> bool {
        child == parent
            || self
                .all_parents(child)
                .map(|parents| parents.contains(parent))
                .unwrap_or(false)
    }

    /// The connected group of project types linked by inheritance.
    ///
    /// Runtime types are neither included nor traversed, so unrelated
    /// classes are not joined through `java/lang/Object`.
    pub fn family(&self, name: &str) -> Result<BTreeSet<String>> {
        self.check(name)?;
        let mut family = BTreeSet::new();
        let mut stack = vec![name];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if node.layer == LayerKind::Runtime || !family.insert(current.to_string()) {
                continue;
            }
            stack.extend(self.direct_parents(current));
            stack.extend(self.direct_children(current));
        }
        Ok(family)
    }

    /// Superclass chain starting at `name` (inclusive), stopping at unknown types
    pub fn superclass_chain(&self, name: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(name);
        while let Some(node) = current {
            if chain.contains(&node.name.as_str()) {
                break;
            }
            chain.push(node.name.as_str());
            current = node.super_name.as_deref().and_then(|s| self.nodes.get(s));
        }
        chain
    }

    /// Find the type declaring `name + descriptor` as seen from `owner`.
    ///
    /// The superclass chain is searched first, then the interfaces of every
    /// type on it, breadth-first.
    pub fn resolve_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<String> {
        let chain = self.superclass_chain(owner);
        if let Some(found) = chain
            .iter()
            .find(|c| self.nodes.get(**c).is_some_and(|n| n.declares(name, descriptor).is_some()))
        {
            return Some(found.to_string());
        }

        let mut visited = HashSet::new();
        let mut queue: VecDeque<&str> = chain
            .iter()
            .filter_map(|c| self.nodes.get(*c))
            .flat_map(|n| n.interfaces.iter().map(String::as_str))
            .collect();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            if node.declares(name, descriptor).is_some() {
                return Some(current.to_string());
            }
            queue.extend(node.interfaces.iter().map(String::as_str));
        }
        None
    }

    // ========== Dangling references ==========

    /// Edges whose parent resolves in no layer
    pub fn dangling_edges(&self) -> &[HierarchyEdge] {
        &self.dangling
    }

    /// Declared parents of `name` that resolve nowhere
    pub fn dangling_parents_of(&self, name: &str) -> Vec<&str> {
        self.dangling
            .iter()
            .filter(|e| e.child == name)
            .map(|e| e.parent.as_str())
            .collect()
    }

    /// Whether `name` is referenced as a parent but resolves nowhere
    pub fn is_dangling(&self, name: &str) -> bool {
        self.dangling.iter().any(|e| e.parent == name)
    }

    /// Get statistics about the graph
    pub fn stats(&self) -> HierarchyStats {
        let runtime_types = self.nodes.values().filter(|n| n.layer == LayerKind::Runtime).count();
        HierarchyStats {
            types: self.nodes.len(),
            project_types: self.nodes.values().filter(|n| n.layer != LayerKind::Runtime).count(),
            runtime_types,
            edges: self.edge_count,
            dangling_edges: self.dangling.len(),
            decode_failures: self.failures.len(),
        }
    }
}

impl TypeHierarchy for HierarchyGraph {
    fn common_super_class(&self, a: &str, b: &str) -> Option<String> {
        if a == b {
            return Some(a.to_string());
        }
        let (na, nb) = (self.nodes.get(a)?, self.nodes.get(b)?);
        if na.is_interface() || nb.is_interface() {
            return Some(OBJECT.to_string());
        }
        let chain_a = self.superclass_chain(a);
        let common = self
            .superclass_chain(b)
            .into_iter()
            .find(|c| chain_a.contains(c))
            .unwrap_or(OBJECT);
        Some(common.to_string())
    }

    fn is_interface(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(HierarchyNode::is_interface)
    }
}

/// Statistics about a hierarchy graph
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyStats {
    pub types: usize,
    pub project_types: usize,
    pub runtime_types: usize,
    pub edges: usize,
    pub dangling_edges: usize,
    pub decode_failures: usize,
}

impl std::fmt::Display for HierarchyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Hierarchy Graph Statistics:")?;
        writeln!(f, "  Types: {} (project: {}, runtime: {})", self.types, self.project_types, self.runtime_types)?;
        writeln!(f, "  Edges: {} (dangling: {})", self.edges, self.dangling_edges)?;
        writeln!(f, "  Decode failures: {}", self.decode_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::insn::op;
    use crate::codec::ClassBuilder;
    use crate::testing::{class_bytes, interface_bytes, workspace};
    use std::collections::HashSet;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn with_method(name: &str, super_name: &str, interfaces: &[&str], method: &str) -> Vec<u8> {
        let mut builder = ClassBuilder::new(name).super_class(super_name);
        for i in interfaces {
            builder = builder.interface(i);
        }
        builder
            .method(access::PUBLIC, method, "()V", |code| code.insn(op::RETURN))
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn test_parents_and_children_across_layers() {
        let ws = workspace(vec![
            class_bytes("com/example/A", Some(OBJECT), &[]),
            class_bytes("com/example/B", Some("com/example/A"), &[]),
        ]);
        let graph = ws.hierarchy_graph();

        assert_eq!(graph.all_parents("com/example/B").unwrap(), set(&["com/example/A", OBJECT]));
        assert_eq!(graph.all_children("com/example/A").unwrap(), set(&["com/example/B"]));
        assert_eq!(graph.all_children(OBJECT).unwrap(), set(&["com/example/A", "com/example/B"]));
        assert_eq!(graph.node(OBJECT).unwrap().layer, LayerKind::Runtime);
        assert_eq!(graph.node("com/example/A").unwrap().layer, LayerKind::Primary);

        assert!(graph.all_parents("com/example/Missing").unwrap().is_empty());
        assert!(graph.all_children("com/example/Missing").unwrap().is_empty());
    }

    #[test]
    fn test_removed_parent_becomes_dangling() {
        let mut ws = workspace(vec![
            class_bytes("com/example/A", Some(OBJECT), &[]),
            class_bytes("com/example/B", Some("com/example/A"), &[]),
        ]);
        assert!(ws.hierarchy_graph().dangling_edges().is_empty());

        ws.primary_mut().remove_unit("com/example/A");
        ws.on_primary_definition_changes(HashSet::from(["com/example/A".to_string()]));

        let graph = ws.hierarchy_graph();
        assert!(graph.is_dangling("com/example/A"));
        assert_eq!(graph.dangling_parents_of("com/example/B"), vec!["com/example/A"]);
        assert_eq!(graph.dangling_edges()[0].kind, EdgeKind::Extends);
        assert_eq!(graph.all_parents("com/example/B").unwrap(), set(&["com/example/A"]));
    }

    #[test]
    fn test_cycles_terminate() {
        let ws = workspace(vec![
            class_bytes("com/example/A", Some("com/example/B"), &[]),
            class_bytes("com/example/B", Some("com/example/A"), &[]),
        ]);
        let graph = ws.hierarchy_graph();
        assert_eq!(graph.all_parents("com/example/A").unwrap(), set(&["com/example/B"]));
        assert_eq!(graph.all_children("com/example/A").unwrap(), set(&["com/example/B"]));
        assert_eq!(graph.superclass_chain("com/example/A").len(), 2);
    }

    #[test]
    fn test_decode_failure_is_node_scoped() {
        let mut ws = workspace(vec![class_bytes("com/example/A", Some(OBJECT), &[])]);
        ws.primary_mut().put_unit("com/example/Broken", vec![0xCA, 0xFE]);
        ws.invalidate_graphs();

        let graph = ws.hierarchy_graph();
        assert!(graph.all_parents("com/example/Broken").unwrap_err().is_decode());
        assert!(graph.all_children("com/example/Broken").unwrap_err().is_decode());
        assert!(graph.decode_failure("com/example/Broken").is_some());
        assert_eq!(graph.all_parents("com/example/A").unwrap(), set(&[OBJECT]));
        assert_eq!(graph.stats().decode_failures, 1);
    }

    #[test]
    fn test_resolve_method_prefers_superclass_chain() {
        let ws = workspace(vec![
            interface_bytes("com/example/Task", &[]),
            with_method("com/example/Base", OBJECT, &[], "run"),
            class_bytes("com/example/Derived", Some("com/example/Base"), &["com/example/Task"]),
            ClassBuilder::interface_type("com/example/Named")
                .method(access::PUBLIC, "name", "()V", |code| code.insn(op::RETURN))
                .to_bytes()
                .unwrap(),
            class_bytes("com/example/Impl", Some(OBJECT), &["com/example/Named"]),
        ]);
        let graph = ws.hierarchy_graph();

        assert_eq!(graph.resolve_method("com/example/Derived", "run", "()V").as_deref(), Some("com/example/Base"));
        assert_eq!(graph.resolve_method("com/example/Impl", "name", "()V").as_deref(), Some("com/example/Named"));
        assert_eq!(graph.resolve_method("com/example/Impl", "missing", "()V"), None);
        assert!(graph.is_subtype_of("com/example/Derived", "com/example/Task"));
        assert!(!graph.is_subtype_of("com/example/Base", "com/example/Task"));
    }

    #[test]
    fn test_common_super_class() {
        let ws = workspace(vec![
            class_bytes("com/example/Shape", Some(OBJECT), &[]),
            class_bytes("com/example/Circle", Some("com/example/Shape"), &[]),
            class_bytes("com/example/Square", Some("com/example/Shape"), &[]),
            interface_bytes("com/example/Drawable", &[]),
        ]);
        let graph = ws.hierarchy_graph();
        assert_eq!(
            graph.common_super_class("com/example/Circle", "com/example/Square").as_deref(),
            Some("com/example/Shape")
        );
        assert_eq!(
            graph.common_super_class("com/example/Circle", "com/example/Drawable").as_deref(),
            Some(OBJECT)
        );
        assert_eq!(graph.common_super_class("com/example/Circle", "com/example/Unknown"), None);
        assert!(graph.is_interface("com/example/Drawable"));
    }

    #[test]
    fn test_family_stops_at_runtime_types() {
        let ws = workspace(vec![
            interface_bytes("com/example/Shape", &[]),
            class_bytes("com/example/Circle", Some(OBJECT), &["com/example/Shape"]),
            class_bytes("com/example/Square", Some(OBJECT), &["com/example/Shape"]),
            class_bytes("com/example/Unrelated", Some(OBJECT), &[]),
        ]);
        let graph = ws.hierarchy_graph();
        assert_eq!(
            graph.family("com/example/Circle").unwrap(),
            set(&["com/example/Circle", "com/example/Shape", "com/example/Square"])
        );
    }
}
