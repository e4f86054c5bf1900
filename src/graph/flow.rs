//! Flow graph - call edges between project methods
//!
//! Every method of every project unit gets a [`FlowNode`] holding its
//! outgoing calls. Virtual and interface invocations fan out to every
//! override declared by a subtype of the static owner. Basic-block graphs
//! are built per node on first request.

use super::blocks::BlockGraph;
use super::edge::{CallEdge, Dispatch, DynamicSite};
use super::hierarchy::HierarchyGraph;
use super::MethodRef;
use crate::codec::{ExceptionHandler, Instruction, Invocation, Operand, UnitDecl, OBJECT};
use crate::workspace::Workspace;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use std::time::Instant;

/// A method in the flow graph.
#[derive(Debug)]
pub struct FlowNode {
    method: MethodRef,
    access: u16,
    calls: Vec<CallEdge>,
    dynamic_sites: Vec<DynamicSite>,
    instructions: Vec<Instruction>,
    handlers: Vec<ExceptionHandler>,
    blocks: OnceLock<BlockGraph>,
}

impl FlowNode {
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    pub fn access(&self) -> u16 {
        self.access
    }

    /// Outgoing call edges in code order
    pub fn calls(&self) -> &[CallEdge] {
        &self.calls
    }

    pub fn dynamic_sites(&self) -> &[DynamicSite] {
        &self.dynamic_sites
    }

    /// Whether the method has code
    pub fn has_body(&self) -> bool {
        !self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The method's basic-block graph, built on first call
    pub fn blocks(&self) -> &BlockGraph {
        self.blocks
            .get_or_init(|| BlockGraph::build(&self.instructions, &self.handlers))
    }
}

/// Call graph over all project methods.
#[derive(Debug, Default)]
pub struct FlowGraph {
    nodes: HashMap<MethodRef, FlowNode>,
    by_owner: HashMap<String, Vec<MethodRef>>,
    callers: HashMap<MethodRef, Vec<CallEdge>>,
    failures: HashMap<String, Error>,
}

impl FlowGraph {
    pub(crate) fn build(workspace: &Workspace, hierarchy: &HierarchyGraph) -> Self {
        let started = Instant::now();
        let mut graph = Self::default();

        for name in workspace.all_unit_names() {
            let Some(unit) = workspace.resolve_unit(&name) else {
                continue;
            };
            let result = workspace
                .codec()
                .decode(unit)
                .and_then(|decl| method_nodes(&decl, hierarchy));
            match result {
                Ok(nodes) => {
                    let mut owned = Vec::with_capacity(nodes.len());
                    for node in nodes {
                        for call in &node.calls {
                            graph.callers.entry(call.callee.clone()).or_default().push(call.clone());
                        }
                        owned.push(node.method.clone());
                        graph.nodes.insert(node.method.clone(), node);
                    }
                    owned.sort();
                    graph.by_owner.insert(name, owned);
                }
                Err(e) => {
                    tracing::warn!("Failed to decode {} for the flow graph: {}", name, e);
                    graph.failures.insert(name, e);
                }
            }
        }

        tracing::debug!(
            "Built flow graph: {} methods, {} call edges, {} failures in {:?}",
            graph.nodes.len(),
            graph.callers.values().map(Vec::len).sum::<usize>(),
            graph.failures.len(),
            started.elapsed()
        );
        graph
    }

    /// Look up a method's node.
    ///
    /// Fails only if the owner unit could not be decoded.
    pub fn flow_for(&self, owner: &str, name: &str, descriptor: &str) -> Result<Option<&FlowNode>> {
        if let Some(e) = self.failures.get(owner) {
            return Err(e.clone());
        }
        Ok(self.nodes.get(&MethodRef::new(owner, name, descriptor)))
    }

    pub fn node(&self, method: &MethodRef) -> Option<&FlowNode> {
        self.nodes.get(method)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    /// Incoming call edges of a method
    pub fn callers_of(&self, method: &MethodRef) -> &[CallEdge] {
        self.callers.get(method).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Methods declared by a project unit, sorted
    pub fn methods_of(&self, owner: &str) -> Vec<&FlowNode> {
        self.by_owner
            .get(owner)
            .map(|refs| refs.iter().filter_map(|m| self.nodes.get(m)).collect())
            .unwrap_or_default()
    }

    /// All `invokedynamic` sites in the project
    pub fn dynamic_sites(&self) -> impl Iterator<Item = &DynamicSite> {
        self.nodes.values().flat_map(|n| n.dynamic_sites.iter())
    }

    pub fn decode_failure(&self, owner: &str) -> Option<&Error> {
        self.failures.get(owner)
    }

    /// Get statistics about the graph
    pub fn stats(&self) -> FlowStats {
        let edges = self.nodes.values().flat_map(|n| n.calls.iter());
        let (mut direct, mut overrides, mut unresolved) = (0, 0, 0);
        for edge in edges {
            match edge.dispatch {
                Dispatch::Direct => direct += 1,
                Dispatch::Override => overrides += 1,
            }
            if edge.is_dangling() {
                unresolved += 1;
            }
        }
        FlowStats {
            methods: self.nodes.len(),
            direct_edges: direct,
            override_edges: overrides,
            unresolved_edges: unresolved,
            dynamic_sites: self.dynamic_sites().count(),
            decode_failures: self.failures.len(),
        }
    }
}

fn method_nodes(decl: &UnitDecl, hierarchy: &HierarchyGraph) -> Result<Vec<FlowNode>> {
    let mut nodes = Vec::with_capacity(decl.methods.len());
    for method in &decl.methods {
        let me = MethodRef::new(&decl.name, &method.name, &method.descriptor);
        let (instructions, handlers) = match &method.body {
            Some(body) => (decl.instructions(body)?, body.handlers.clone()),
            None => (Vec::new(), Vec::new()),
        };

        let mut calls = Vec::new();
        let mut dynamic_sites = Vec::new();
        for insn in &instructions {
            match &insn.operand {
                Operand::Invoke(call) => calls.extend(call_edges(&me, insn.offset, call, hierarchy)),
                Operand::Dynamic { name, descriptor } => dynamic_sites.push(DynamicSite {
                    caller: me.clone(),
                    name: name.clone(),
                    descriptor: descriptor.clone(),
                    offset: insn.offset,
                }),
                _ => {}
            }
        }

        nodes.push(FlowNode {
            method: me,
            access: method.access,
            calls,
            dynamic_sites,
            instructions,
            handlers,
            blocks: OnceLock::new(),
        });
    }
    Ok(nodes)
}

fn call_edges(caller: &MethodRef, offset: u32, call: &Invocation, hierarchy: &HierarchyGraph) -> Vec<CallEdge> {
    // Array receivers (`[I.clone()`) dispatch through Object.
    let owner = if call.owner.starts_with('[') { OBJECT } else { call.owner.as_str() };
    let declaring = hierarchy.resolve_method(owner, &call.name, &call.descriptor);
    let edge = |callee: MethodRef, dispatch: Dispatch, resolved: bool| CallEdge {
        caller: caller.clone(),
        callee,
        kind: call.kind,
        dispatch,
        offset,
        resolved,
    };

    let mut edges = vec![edge(
        MethodRef::new(declaring.as_deref().unwrap_or(owner), &call.name, &call.descriptor),
        Dispatch::Direct,
        declaring.is_some(),
    )];

    if call.kind.is_dispatched() {
        // Every concrete receiver type dispatches to whatever it declares or inherits.
        let mut receivers = hierarchy.all_children(owner).unwrap_or_default();
        receivers.insert(owner.to_string());
        let mut targets = BTreeSet::new();
        for receiver in &receivers {
            if hierarchy.node(receiver).is_none_or(|n| n.is_interface()) {
                continue;
            }
            let Some(target) = hierarchy.resolve_method(receiver, &call.name, &call.descriptor) else {
                continue;
            };
            let concrete = hierarchy
                .node(&target)
                .and_then(|n| n.declares(&call.name, &call.descriptor))
                .is_some_and(|m| m.is_overridable_target());
            if concrete && declaring.as_deref() != Some(target.as_str()) {
                targets.insert(target);
            }
        }
        for target in targets {
            edges.push(edge(
                MethodRef::new(target, &call.name, &call.descriptor),
                Dispatch::Override,
                true,
            ));
        }
    }
    edges
}

/// Statistics about a flow graph
#[derive(Debug, Clone, Serialize)]
pub struct FlowStats {
    pub methods: usize,
    pub direct_edges: usize,
    pub override_edges: usize,
    pub unresolved_edges: usize,
    pub dynamic_sites: usize,
    pub decode_failures: usize,
}

impl std::fmt::Display for FlowStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Flow Graph Statistics:")?;
        writeln!(f, "  Methods: {}", self.methods)?;
        writeln!(
            f,
            "  Call edges: {} (override: {}, unresolved: {})",
            self.direct_edges + self.override_edges,
            self.override_edges,
            self.unresolved_edges
        )?;
        writeln!(f, "  Dynamic call sites: {}", self.dynamic_sites)?;
        writeln!(f, "  Decode failures: {}", self.decode_failures)
    }
}
