//! Analysis graphs
//!
//! Both graphs are built by the workspace on first request and cached until
//! the next invalidation. The hierarchy graph is always built first; the
//! flow graph consults it to fan virtual calls out to overrides.

pub mod edge;
pub mod hierarchy;
pub mod flow;
pub mod blocks;

pub use blocks::{BasicBlock, BlockEdge, BlockEdgeKind, BlockGraph};
pub use edge::{CallEdge, Dispatch, DynamicSite, EdgeKind, HierarchyEdge};
pub use flow::{FlowGraph, FlowNode, FlowStats};
pub use hierarchy::{HierarchyGraph, HierarchyNode, HierarchyStats, MethodSig};

use crate::unit::to_internal_name;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifies a method by owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodRef {
    /// Create a new method reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// Parses `owner.name(descriptor)`. The owner may use dots or slashes.
impl FromStr for MethodRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidName(format!("expected owner.name(descriptor): {}", s));
        let paren = s.find('(').ok_or_else(invalid)?;
        let (head, descriptor) = s.split_at(paren);
        let dot = head.rfind('.').ok_or_else(invalid)?;
        let (owner, name) = (&head[..dot], &head[dot + 1..]);
        if owner.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(MethodRef::new(to_internal_name(owner), name, descriptor))
    }
}
