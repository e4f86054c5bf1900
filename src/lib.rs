//! # Jarscope - layered class workspace analysis
//!
//! Resolves compiled JVM classes across an ordered stack of resource layers
//! and derives two analysis graphs over them.
//!
//! Jarscope provides:
//! - Layered name resolution (primary → libraries → runtime classpath)
//! - A lazily built inheritance graph with dangling-reference tracking
//! - A lazily built call-flow graph with virtual-dispatch fan-out and
//!   per-method basic-block graphs
//! - Change tracking with coarse cache invalidation and a background
//!   recovery snapshot of the primary layer
//! - A type-solver bridge for source-level symbol resolution

pub mod unit;
pub mod layer;
pub mod codec;
pub mod graph;
pub mod workspace;
pub mod tracker;
pub mod snapshot;
pub mod bridge;
pub mod config;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use unit::Unit;
pub use layer::{LayerKind, ResourceLayer, RuntimeClasspath};
pub use codec::{ClassFileCodec, UnitCodec, UnitDecl, WriterFlags};
pub use graph::{FlowGraph, HierarchyGraph, MethodRef};
pub use workspace::Workspace;
pub use bridge::{TypeSolver, WorkspaceTypeSolver};

/// Result type alias for Jarscope operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Jarscope operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),
}

impl Error {
    /// Build a decode failure for the named unit
    pub fn decode(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Decode {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a node-scoped decode failure
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Decode { name, reason } => Error::decode(name.clone(), reason.clone()),
            Error::Encode(msg) => Error::Encode(msg.clone()),
            Error::Unsupported(msg) => Error::Unsupported(msg.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
            Error::Archive(e) => Error::Snapshot(e.to_string()),
            Error::Snapshot(msg) => Error::Snapshot(msg.clone()),
            Error::InvalidName(msg) => Error::InvalidName(msg.clone()),
            Error::LayerNotFound(msg) => Error::LayerNotFound(msg.clone()),
        }
    }
}
