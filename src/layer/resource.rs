//! Resource layer storage

use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Role of a layer in a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    /// The editable target of the workspace
    Primary,
    /// Read-only reference content
    Library,
    /// Host runtime classes, queried only as a fallback
    Runtime,
}

impl LayerKind {
    /// Get the string representation of the layer kind
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Primary => "primary",
            LayerKind::Library => "library",
            LayerKind::Runtime => "runtime",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named collection of units and auxiliary resources.
#[derive(Debug, Clone)]
pub struct ResourceLayer {
    name: String,
    kind: LayerKind,
    /// Units by internal name
    units: HashMap<String, Unit>,
    /// Non-class resources by entry name
    resources: HashMap<String, Arc<[u8]>>,
    /// Attached source text by unit name
    sources: HashMap<String, String>,
}

impl ResourceLayer {
    /// Create an empty layer
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            units: HashMap::new(),
            resources: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Create an empty library layer
    pub fn library(name: impl Into<String>) -> Self {
        Self::new(name, LayerKind::Library)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn is_primary(&self) -> bool {
        self.kind == LayerKind::Primary
    }

    pub(crate) fn set_kind(&mut self, kind: LayerKind) {
        self.kind = kind;
    }

    // ========== Units ==========

    /// Get a unit by internal name
    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.get(name)
    }

    pub fn contains_unit(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Insert or replace a unit, returning the previous one
    pub fn insert_unit(&mut self, unit: Unit) -> Option<Unit> {
        self.units.insert(unit.name().to_string(), unit)
    }

    /// Insert a unit from raw bytes
    pub fn put_unit(&mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Option<Unit> {
        self.insert_unit(Unit::new(name, bytes))
    }

    pub fn remove_unit(&mut self, name: &str) -> Option<Unit> {
        self.units.remove(name)
    }

    /// Iterate over unit names
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Iterate over units
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    // ========== Resources ==========

    /// Get raw resource bytes by entry name
    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources.get(name).map(|bytes| &bytes[..])
    }

    pub fn contains_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    pub fn insert_resource(&mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Option<Arc<[u8]>> {
        self.resources.insert(name.into(), bytes.into())
    }

    pub fn remove_resource(&mut self, name: &str) -> Option<Arc<[u8]>> {
        self.resources.remove(name)
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    // ========== Sources ==========

    /// Attach source text to a unit name
    pub fn attach_source(&mut self, unit_name: impl Into<String>, text: impl Into<String>) {
        self.sources.insert(unit_name.into(), text.into());
    }

    pub fn source(&self, unit_name: &str) -> Option<&str> {
        self.sources.get(unit_name).map(String::as_str)
    }

    pub fn sources(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sources.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.resources.is_empty()
    }
}
