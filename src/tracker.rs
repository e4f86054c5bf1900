//! Definition change tracking
//!
//! Records the most recent batch of edited primary units and owns the
//! snapshot exporter that backs those edits up. Batches replace each other;
//! they are never merged.

use crate::snapshot::SnapshotExporter;
use crate::unit::Unit;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug)]
pub struct DefinitionChangeTracker {
    changed: HashSet<String>,
    exporter: SnapshotExporter,
}

impl DefinitionChangeTracker {
    /// Create a new tracker exporting to `snapshot_path`
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            changed: HashSet::new(),
            exporter: SnapshotExporter::new(snapshot_path),
        }
    }

    /// Replace the recorded batch. Returns true if caches must be invalidated.
    pub fn record(&mut self, changed: HashSet<String>) -> bool {
        self.changed = changed;
        !self.changed.is_empty()
    }

    /// The most recent batch (initially empty)
    pub fn changed_names(&self) -> &HashSet<String> {
        &self.changed
    }

    pub fn request_export(&self, units: Vec<Unit>) {
        tracing::debug!("Requesting snapshot of {} primary units", units.len());
        self.exporter.request(units);
    }

    pub fn snapshot_path(&self) -> &Path {
        self.exporter.path()
    }

    pub fn set_snapshot_path(&mut self, path: impl Into<PathBuf>) {
        self.exporter.set_path(path);
    }

    pub fn exporter(&self) -> &SnapshotExporter {
        &self.exporter
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.exporter.wait_idle(timeout)
    }
}
