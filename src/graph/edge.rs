//! Edge types - relationships recorded by the analysis graphs
//!
//! Type relationships reduce to two kinds:
//! - `Extends`: class → superclass
//! - `Implements`: class or interface → interface
//!
//! Call relationships carry the invocation kind and how the target was
//! reached: statically (`Direct`) or through a subtype override (`Override`).

use super::MethodRef;
use crate::codec::InvokeKind;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Inheritance edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Class extends its superclass
    Extends,
    /// Type implements (or, for interfaces, extends) an interface
    Implements,
}

impl EdgeKind {
    /// Get the string representation of the edge kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Extends => "extends",
            EdgeKind::Implements => "implements",
        }
    }

    /// Get all edge kinds
    pub fn all() -> &'static [EdgeKind] {
        &[EdgeKind::Extends, EdgeKind::Implements]
    }
}

impl FromStr for EdgeKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "extends" | "extend" | "super" => Ok(EdgeKind::Extends),
            "implements" | "implement" | "interface" => Ok(EdgeKind::Implements),
            _ => Err(crate::Error::InvalidName(format!("Unknown edge kind: {}", s))),
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed child → parent edge in the hierarchy graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub child: String,
    pub parent: String,
    pub kind: EdgeKind,
}

impl HierarchyEdge {
    /// Create a new edge
    pub fn new(child: impl Into<String>, parent: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
            kind,
        }
    }
}

/// How a call edge's target was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// The statically named target (or its inherited declaration)
    Direct,
    /// A subtype override reachable through virtual dispatch
    Override,
}

impl Dispatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dispatch::Direct => "direct",
            Dispatch::Override => "override",
        }
    }
}

impl std::fmt::Display for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A caller → callee edge in the flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: MethodRef,
    pub callee: MethodRef,
    pub kind: InvokeKind,
    pub dispatch: Dispatch,
    /// Code offset of the invocation in the caller
    pub offset: u32,
    /// False when no declaration of the callee could be found
    pub resolved: bool,
}

impl CallEdge {
    /// Check if the target was found in the workspace
    pub fn is_dangling(&self) -> bool {
        !self.resolved
    }
}

impl PartialEq for CallEdge {
    fn eq(&self, other: &Self) -> bool {
        self.caller == other.caller
            && self.callee == other.callee
            && self.dispatch == other.dispatch
            && self.offset == other.offset
    }
}

impl Eq for CallEdge {}

impl std::hash::Hash for CallEdge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.caller.hash(state);
        self.callee.hash(state);
        self.dispatch.hash(state);
        self.offset.hash(state);
    }
}

/// An `invokedynamic` call site; its target is only known at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSite {
    pub caller: MethodRef,
    pub name: String,
    pub descriptor: String,
    pub offset: u32,
}
