//! Shared fixtures for unit tests

use crate::codec::reader::peek_class_name;
use crate::codec::ClassBuilder;
use crate::layer::{LayerKind, ResourceLayer, RuntimeClasspath};
use crate::workspace::Workspace;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bytes of an empty class; `None` as superclass means no superclass at all
pub fn class_bytes(name: &str, super_name: Option<&str>, interfaces: &[&str]) -> Vec<u8> {
    let mut builder = match super_name {
        Some(parent) => ClassBuilder::new(name).super_class(parent),
        None => ClassBuilder::new(name).no_super(),
    };
    for interface in interfaces {
        builder = builder.interface(interface);
    }
    builder.to_bytes().unwrap()
}

pub fn interface_bytes(name: &str, parents: &[&str]) -> Vec<u8> {
    let mut builder = ClassBuilder::interface_type(name);
    for parent in parents {
        builder = builder.interface(parent);
    }
    builder.to_bytes().unwrap()
}

/// A layer holding the given classes under their declared names
pub fn layer(name: &str, kind: LayerKind, classes: Vec<Vec<u8>>) -> ResourceLayer {
    let mut layer = ResourceLayer::new(name, kind);
    for bytes in classes {
        let unit_name = peek_class_name(&bytes).unwrap();
        layer.put_unit(unit_name, bytes);
    }
    layer
}

/// A small stand-in for the host runtime
pub fn runtime() -> Arc<RuntimeClasspath> {
    Arc::new(RuntimeClasspath::from_layer(layer(
        "runtime",
        LayerKind::Runtime,
        vec![
            class_bytes("java/lang/Object", None, &[]),
            interface_bytes("java/lang/Runnable", &[]),
            interface_bytes("java/io/Serializable", &[]),
        ],
    )))
}

fn snapshot_path() -> std::path::PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    std::env::temp_dir().join("jarscope-tests").join(format!(
        "{}-{}.jar",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

/// A workspace over one primary layer and the fake runtime
pub fn workspace(primary: Vec<Vec<u8>>) -> Workspace {
    workspace_with_libraries(primary, Vec::new())
}

/// Libraries are named `lib0`, `lib1`, ... in order
pub fn workspace_with_libraries(primary: Vec<Vec<u8>>, libraries: Vec<Vec<Vec<u8>>>) -> Workspace {
    let libraries = libraries
        .into_iter()
        .enumerate()
        .map(|(i, classes)| layer(&format!("lib{}", i), LayerKind::Library, classes))
        .collect();
    Workspace::new(layer("app", LayerKind::Primary, primary), libraries)
        .with_runtime(runtime())
        .with_snapshot_path(snapshot_path())
}
