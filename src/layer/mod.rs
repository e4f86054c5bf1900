//! Resource layers
//!
//! A layer is a named collection of units and auxiliary resources. A
//! workspace stacks one primary layer over an ordered list of library
//! layers, with the shared runtime classpath as the last fallback.

pub mod resource;
pub mod loader;
pub mod classpath;

pub use resource::{LayerKind, ResourceLayer};
pub use loader::{load_archive_bytes, load_layer, load_path};
pub use classpath::RuntimeClasspath;
