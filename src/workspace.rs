//! Workspace - the composition root
//!
//! A workspace stacks one primary layer over an ordered list of library
//! layers, with the shared runtime classpath as the last fallback. Names
//! resolve against that stack in order and the first match wins.
//!
//! The hierarchy and flow graphs are built on first request and cached.
//! Any library-order change or a non-empty definition change batch drops
//! both caches; graphs already handed out stay readable but stale.

use crate::bridge::{ParseOutcome, SourceParser, WorkspaceTypeSolver};
use crate::codec::{ClassFileCodec, TypeHierarchy, UnitCodec, UnitDecl, WriterFlags};
use crate::graph::{FlowGraph, HierarchyGraph};
use crate::layer::{LayerKind, ResourceLayer, RuntimeClasspath};
use crate::snapshot::default_snapshot_path;
use crate::tracker::DefinitionChangeTracker;
use crate::unit::Unit;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

enum CellState<T> {
    Absent,
    Built(Arc<T>),
}

/// A lazily built, explicitly invalidated graph slot.
///
/// Building happens under the lock, so a cell is built at most once per
/// invalidation.
pub(crate) struct GraphCell<T> {
    state: Mutex<CellState<T>>,
    label: &'static str,
}

impl<T> GraphCell<T> {
    fn new(label: &'static str) -> Self {
        Self {
            state: Mutex::new(CellState::Absent),
            label,
        }
    }

    fn get_or_build(&self, build: impl FnOnce() -> T) -> Arc<T> {
        let mut state = self.state.lock();
        match &*state {
            CellState::Built(graph) => {
                tracing::trace!("Reusing cached {} graph", self.label);
                Arc::clone(graph)
            }
            CellState::Absent => {
                let graph = Arc::new(build());
                *state = CellState::Built(Arc::clone(&graph));
                graph
            }
        }
    }

    fn invalidate(&self) {
        *self.state.lock() = CellState::Absent;
    }

    fn is_built(&self) -> bool {
        matches!(*self.state.lock(), CellState::Built(_))
    }
}

/// Layered view over a primary layer, libraries and the runtime classpath.
pub struct Workspace {
    primary: ResourceLayer,
    libraries: Vec<ResourceLayer>,
    runtime: Arc<RuntimeClasspath>,
    codec: Arc<dyn UnitCodec>,
    writer_flags: WriterFlags,
    hierarchy: GraphCell<HierarchyGraph>,
    flow: GraphCell<FlowGraph>,
    tracker: DefinitionChangeTracker,
}

impl Workspace {
    /// Create a new workspace over the process-wide runtime classpath.
    ///
    /// The primary layer is marked `Primary` and every library `Library`,
    /// whatever kind they were loaded with.
    pub fn new(mut primary: ResourceLayer, libraries: Vec<ResourceLayer>) -> Self {
        primary.set_kind(LayerKind::Primary);
        let libraries = libraries
            .into_iter()
            .map(|mut layer| {
                layer.set_kind(LayerKind::Library);
                layer
            })
            .collect();

        Self {
            primary,
            libraries,
            runtime: RuntimeClasspath::shared(),
            codec: Arc::new(ClassFileCodec),
            writer_flags: WriterFlags::default(),
            hierarchy: GraphCell::new("hierarchy"),
            flow: GraphCell::new("flow"),
            tracker: DefinitionChangeTracker::new(default_snapshot_path()),
        }
    }

    /// Use a specific runtime classpath instead of the shared one
    pub fn with_runtime(mut self, runtime: Arc<RuntimeClasspath>) -> Self {
        self.runtime = runtime;
        self.invalidate_graphs();
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn UnitCodec>) -> Self {
        self.codec = codec;
        self.invalidate_graphs();
        self
    }

    pub fn with_writer_flags(mut self, flags: WriterFlags) -> Self {
        self.writer_flags = flags;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tracker.set_snapshot_path(path);
        self
    }

    /// Take the layers back out, e.g. to hand them to another workspace
    pub fn into_layers(self) -> (ResourceLayer, Vec<ResourceLayer>) {
        (self.primary, self.libraries)
    }

    // ========== Layers ==========

    pub fn primary(&self) -> &ResourceLayer {
        &self.primary
    }

    /// Mutable access to the primary layer.
    ///
    /// Edits are not seen by cached graphs until
    /// [`on_primary_definition_changes`](Self::on_primary_definition_changes)
    /// reports them.
    pub fn primary_mut(&mut self) -> &mut ResourceLayer {
        &mut self.primary
    }

    pub fn libraries(&self) -> &[ResourceLayer] {
        &self.libraries
    }

    pub fn runtime(&self) -> &Arc<RuntimeClasspath> {
        &self.runtime
    }

    pub fn codec(&self) -> &dyn UnitCodec {
        self.codec.as_ref()
    }

    pub fn writer_flags(&self) -> WriterFlags {
        self.writer_flags
    }

    /// Primary then libraries in order
    fn project_layers(&self) -> impl Iterator<Item = &ResourceLayer> {
        std::iter::once(&self.primary).chain(self.libraries.iter())
    }

    /// Full resolution order, runtime last
    pub fn layers(&self) -> impl Iterator<Item = &ResourceLayer> {
        self.project_layers().chain(std::iter::once(self.runtime.layer()))
    }

    /// Append a library at the lowest project precedence
    pub fn add_library(&mut self, mut layer: ResourceLayer) {
        layer.set_kind(LayerKind::Library);
        tracing::debug!("Adding library '{}'", layer.name());
        self.libraries.push(layer);
        self.invalidate_graphs();
    }

    /// Remove a library by name
    pub fn remove_library(&mut self, name: &str) -> Result<ResourceLayer> {
        let index = self
            .libraries
            .iter()
            .position(|l| l.name() == name)
            .ok_or_else(|| Error::LayerNotFound(name.to_string()))?;
        let layer = self.libraries.remove(index);
        self.invalidate_graphs();
        Ok(layer)
    }

    /// Move a library from one position to another
    pub fn move_library(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.libraries.len();
        if from >= len || to >= len {
            return Err(Error::LayerNotFound(format!("library index {} -> {} (have {})", from, to, len)));
        }
        let layer = self.libraries.remove(from);
        self.libraries.insert(to, layer);
        self.invalidate_graphs();
        Ok(())
    }

    // ========== Resolution ==========

    /// The highest-precedence unit with this name
    pub fn resolve_unit(&self, name: &str) -> Option<&Unit> {
        self.layers().find_map(|layer| layer.unit(name))
    }

    /// The layer that `resolve_unit` would take the unit from
    pub fn resolve_containing_layer(&self, name: &str) -> Option<&ResourceLayer> {
        self.layers().find(|layer| layer.contains_unit(name))
    }

    pub fn has_unit(&self, name: &str) -> bool {
        self.layers().any(|layer| layer.contains_unit(name))
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.layers().any(|layer| layer.contains_resource(name))
    }

    /// The highest-precedence resource with this name
    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.layers().find_map(|layer| layer.resource(name))
    }

    /// Names of all primary and library units (runtime excluded)
    pub fn all_unit_names(&self) -> BTreeSet<String> {
        self.project_layers()
            .flat_map(|layer| layer.unit_names())
            .map(str::to_string)
            .collect()
    }

    pub fn primary_unit_names(&self) -> BTreeSet<String> {
        self.primary.unit_names().map(str::to_string).collect()
    }

    pub fn library_unit_names(&self) -> BTreeSet<String> {
        self.libraries
            .iter()
            .flat_map(|layer| layer.unit_names())
            .map(str::to_string)
            .collect()
    }

    /// Attached source text, primary first then libraries
    pub fn source(&self, name: &str) -> Option<&str> {
        self.project_layers().find_map(|layer| layer.source(name))
    }

    // ========== Codec ==========

    /// Resolve and decode a unit
    pub fn decode_unit(&self, name: &str) -> Result<Option<UnitDecl>> {
        self.resolve_unit(name).map(|unit| self.codec.decode(unit)).transpose()
    }

    /// Nearest common superclass, as needed by frame-computing writers
    pub fn common_super_class(&self, a: &str, b: &str) -> Option<String> {
        self.hierarchy_graph().common_super_class(a, b)
    }

    /// Encode with the configured writer flags
    pub fn encode_unit(&self, decl: &UnitDecl) -> Result<Vec<u8>> {
        self.encode_unit_with(decl, self.writer_flags)
    }

    pub fn encode_unit_with(&self, decl: &UnitDecl, flags: WriterFlags) -> Result<Vec<u8>> {
        let hierarchy = self.hierarchy_graph();
        self.codec.encode(decl, flags, hierarchy.as_ref())
    }

    // ========== Graphs ==========

    pub fn hierarchy_graph(&self) -> Arc<HierarchyGraph> {
        self.hierarchy.get_or_build(|| HierarchyGraph::build(self))
    }

    /// The flow graph; builds the hierarchy first if needed
    pub fn flow_graph(&self) -> Arc<FlowGraph> {
        let hierarchy = self.hierarchy_graph();
        self.flow.get_or_build(|| FlowGraph::build(self, &hierarchy))
    }

    /// Drop both cached graphs
    pub fn invalidate_graphs(&self) {
        self.hierarchy.invalidate();
        self.flow.invalidate();
        tracing::debug!("Invalidated cached graphs");
    }

    pub fn is_hierarchy_built(&self) -> bool {
        self.hierarchy.is_built()
    }

    pub fn is_flow_built(&self) -> bool {
        self.flow.is_built()
    }

    // ========== Change tracking ==========

    /// Report edited primary units.
    ///
    /// Replaces the recorded batch, drops both graph caches when the batch
    /// is non-empty, and queues a background snapshot of the primary layer.
    pub fn on_primary_definition_changes(&mut self, changed: HashSet<String>) {
        if self.tracker.record(changed) {
            self.invalidate_graphs();
        }
        self.tracker.request_export(self.primary.units().cloned().collect());
    }

    /// The most recent change batch
    pub fn changed_names(&self) -> &HashSet<String> {
        self.tracker.changed_names()
    }

    pub fn snapshot_path(&self) -> &Path {
        self.tracker.snapshot_path()
    }

    pub fn set_snapshot_path(&mut self, path: impl Into<PathBuf>) {
        self.tracker.set_snapshot_path(path);
    }

    /// Wait for queued snapshot exports; false on timeout
    pub fn wait_for_snapshot(&self, timeout: Duration) -> bool {
        self.tracker.wait_idle(timeout)
    }

    pub fn tracker(&self) -> &DefinitionChangeTracker {
        &self.tracker
    }

    // ========== Sources ==========

    /// Run a parser over every attached source with a workspace-backed solver
    pub fn analyze_sources<P: SourceParser>(&self, parser: &P) -> Vec<(String, ParseOutcome<P::Tree>)> {
        let solver = WorkspaceTypeSolver::new(self);
        let mut names: Vec<(&str, &str)> = Vec::new();
        for layer in self.project_layers() {
            for (name, text) in layer.sources() {
                if !names.iter().any(|(n, _)| *n == name) {
                    names.push((name, text));
                }
            }
        }
        names.sort_by(|a, b| a.0.cmp(b.0));
        names
            .into_iter()
            .map(|(name, text)| (name.to_string(), parser.parse(name, text, &solver)))
            .collect()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("primary", &self.primary.name())
            .field("libraries", &self.libraries.iter().map(|l| l.name()).collect::<Vec<_>>())
            .field("hierarchy_built", &self.is_hierarchy_built())
            .field("flow_built", &self.is_flow_built())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FlatHierarchy, OBJECT};
    use crate::snapshot::read_archive;
    use crate::testing::{class_bytes, layer, runtime, workspace, workspace_with_libraries};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn test_primary_shadows_libraries() {
        let ws = workspace_with_libraries(
            vec![class_bytes("com/example/Foo", Some(OBJECT), &[])],
            vec![
                vec![class_bytes("com/example/Foo", Some("com/example/Base"), &[])],
                vec![class_bytes("com/example/Bar", Some(OBJECT), &[])],
            ],
        );

        assert_eq!(ws.resolve_containing_layer("com/example/Foo").unwrap().kind(), LayerKind::Primary);
        assert_eq!(ws.resolve_containing_layer("com/example/Bar").unwrap().name(), "lib1");
        assert_eq!(ws.resolve_containing_layer(OBJECT).unwrap().kind(), LayerKind::Runtime);
        assert!(ws.resolve_unit("com/example/Nowhere").is_none());

        let decl = ws.decode_unit("com/example/Foo").unwrap().unwrap();
        assert_eq!(decl.super_name.as_deref(), Some(OBJECT));
    }

    #[test]
    fn test_library_collisions_resolve_by_order() {
        let mut ws = workspace_with_libraries(
            vec![],
            vec![
                vec![class_bytes("com/example/Dup", Some(OBJECT), &[])],
                vec![class_bytes("com/example/Dup", Some("com/example/Other"), &[])],
            ],
        );
        assert_eq!(ws.resolve_containing_layer("com/example/Dup").unwrap().name(), "lib0");

        ws.move_library(1, 0).unwrap();
        assert_eq!(ws.resolve_containing_layer("com/example/Dup").unwrap().name(), "lib1");
        assert!(ws.move_library(0, 5).is_err());

        let removed = ws.remove_library("lib1").unwrap();
        assert_eq!(removed.name(), "lib1");
        assert!(matches!(ws.remove_library("lib1"), Err(Error::LayerNotFound(_))));
    }

    #[test]
    fn test_library_changes_drop_cached_graphs() {
        let mut ws = workspace_with_libraries(
            vec![class_bytes("com/example/App", Some("com/example/Dup"), &[])],
            vec![vec![class_bytes("com/example/Dup", Some(OBJECT), &[])]],
        );
        let extra = layer("extra", LayerKind::Library, vec![class_bytes("com/example/Dup", Some("com/example/Other"), &[])]);

        let before = ws.hierarchy_graph();
        ws.flow_graph();
        ws.add_library(extra);
        assert!(!ws.is_hierarchy_built() && !ws.is_flow_built());
        assert!(!before.all_parents("com/example/App").unwrap().contains("com/example/Other"));

        ws.hierarchy_graph();
        ws.move_library(1, 0).unwrap();
        assert!(!ws.is_hierarchy_built());
        assert!(ws.hierarchy_graph().all_parents("com/example/App").unwrap().contains("com/example/Other"));

        assert!(ws.move_library(0, 9).is_err());
        assert!(ws.is_hierarchy_built());

        ws.flow_graph();
        ws.remove_library("extra").unwrap();
        assert!(!ws.is_hierarchy_built() && !ws.is_flow_built());
        assert!(!ws.hierarchy_graph().all_parents("com/example/App").unwrap().contains("com/example/Other"));
    }

    #[test]
    fn test_has_unit_matches_resolve_unit() {
        let ws = workspace_with_libraries(
            vec![class_bytes("com/example/A", Some(OBJECT), &[])],
            vec![vec![class_bytes("com/example/B", Some(OBJECT), &[])]],
        );
        for name in ["com/example/A", "com/example/B", OBJECT, "com/example/C", ""] {
            assert_eq!(ws.has_unit(name), ws.resolve_unit(name).is_some(), "{}", name);
        }
        let names = ws.all_unit_names();
        assert!(names.contains("com/example/A") && names.contains("com/example/B"));
        assert!(!names.contains(OBJECT));
    }

    #[test]
    fn test_resources_resolve_in_layer_order() {
        let mut primary = layer("app", LayerKind::Primary, vec![]);
        primary.insert_resource("config.properties", b"primary".to_vec());
        let mut lib = layer("lib", LayerKind::Library, vec![]);
        lib.insert_resource("config.properties", b"library".to_vec());
        lib.insert_resource("lib.txt", b"only".to_vec());

        let ws = Workspace::new(primary, vec![lib]).with_runtime(runtime());
        assert_eq!(ws.resource("config.properties"), Some(&b"primary"[..]));
        assert_eq!(ws.resource("lib.txt"), Some(&b"only"[..]));
        assert!(ws.has_resource("lib.txt"));
        assert!(!ws.has_resource("missing"));
        assert_eq!(ws.libraries()[0].kind(), LayerKind::Library);
    }

    #[test]
    fn test_graphs_are_cached_until_invalidated() {
        let ws = workspace(vec![class_bytes("com/example/A", Some(OBJECT), &[])]);
        assert!(!ws.is_hierarchy_built());

        let first = ws.hierarchy_graph();
        let second = ws.hierarchy_graph();
        assert!(Arc::ptr_eq(&first, &second));

        let flow = ws.flow_graph();
        assert!(Arc::ptr_eq(&flow, &ws.flow_graph()));

        ws.invalidate_graphs();
        assert!(!ws.is_hierarchy_built() && !ws.is_flow_built());
        assert!(!Arc::ptr_eq(&first, &ws.hierarchy_graph()));
        // Stale handles stay readable
        assert!(first.contains("com/example/A"));
    }

    #[test]
    fn test_definition_change_invalidates_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.jar");
        let mut ws = workspace(vec![class_bytes("com/example/Foo", Some(OBJECT), &[])]).with_snapshot_path(&path);
        let before = ws.hierarchy_graph();
        assert_eq!(before.direct_parents("com/example/Foo"), vec![OBJECT]);

        ws.primary_mut()
            .put_unit("com/example/Foo", class_bytes("com/example/Foo", Some("com/example/Gone"), &[]));
        ws.on_primary_definition_changes(HashSet::from(["com/example/Foo".to_string()]));
        assert_eq!(ws.changed_names(), &HashSet::from(["com/example/Foo".to_string()]));

        let after = ws.hierarchy_graph();
        assert_eq!(after.direct_parents("com/example/Foo"), vec!["com/example/Gone"]);
        assert_eq!(before.direct_parents("com/example/Foo"), vec![OBJECT]);

        assert!(ws.wait_for_snapshot(WAIT));
        let snapshot = read_archive(&path).unwrap();
        assert_eq!(
            snapshot.unit("com/example/Foo").unwrap(),
            ws.primary().unit("com/example/Foo").unwrap()
        );

        ws.on_primary_definition_changes(HashSet::new());
        assert!(ws.changed_names().is_empty());
    }

    #[test]
    fn test_empty_batch_keeps_caches() {
        let dir = tempfile::tempdir().unwrap();
        let mut ws = workspace(vec![class_bytes("com/example/A", Some(OBJECT), &[])])
            .with_snapshot_path(dir.path().join("primary.jar"));
        let graph = ws.hierarchy_graph();
        ws.on_primary_definition_changes(HashSet::new());
        assert!(Arc::ptr_eq(&graph, &ws.hierarchy_graph()));
        assert!(ws.wait_for_snapshot(WAIT));
        assert!(dir.path().join("primary.jar").exists());
    }

    #[test]
    fn test_runtime_is_loaded_lazily_and_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let rt = Arc::new(RuntimeClasspath::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            layer("rt", LayerKind::Runtime, vec![class_bytes(OBJECT, None, &[])])
        }));

        let ws = Workspace::new(layer("app", LayerKind::Library, vec![]), vec![]).with_runtime(Arc::clone(&rt));
        assert_eq!(ws.primary().kind(), LayerKind::Primary);
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        let other = Workspace::new(layer("app2", LayerKind::Primary, vec![]), vec![]).with_runtime(rt);
        assert!(ws.has_unit(OBJECT));
        assert!(other.has_unit(OBJECT));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_encode_uses_configured_flags() {
        let ws = workspace(vec![class_bytes("com/example/A", Some(OBJECT), &[])]);
        let decl = ws.decode_unit("com/example/A").unwrap().unwrap();
        let bytes = ws.encode_unit(&decl).unwrap();
        assert_eq!(bytes, ws.resolve_unit("com/example/A").unwrap().bytes());

        let frames = ws.with_writer_flags(WriterFlags::ComputeFrames);
        assert!(matches!(frames.encode_unit(&decl), Err(Error::Unsupported(_))));
        assert_eq!(FlatHierarchy.common_super_class("a", "b").as_deref(), Some(OBJECT));
    }

    #[test]
    fn test_layers_move_between_workspaces() {
        let ws = workspace(vec![class_bytes("com/example/A", Some(OBJECT), &[])]);
        let (primary, libraries) = ws.into_layers();
        let next = Workspace::new(primary, libraries).with_runtime(runtime());
        assert!(next.has_unit("com/example/A"));
        assert_eq!(next.common_super_class("com/example/A", OBJECT).as_deref(), Some(OBJECT));
    }
}
