//! Units - compiled class payloads addressed by internal name
//!
//! A unit is identified by its internal name (`com/example/Foo`) and holds
//! the raw class-file bytes. Units are immutable: an edit replaces the whole
//! unit in its layer, it never patches bytes in place.

use crate::{Error, Result};
use std::sync::Arc;

/// Suffix used when a unit is stored as an archive entry.
pub const CLASS_SUFFIX: &str = ".class";

/// A compiled program unit.
///
/// Cloning is cheap: the payload is shared.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Internal name, slash separated
    name: String,
    /// Raw class-file bytes
    bytes: Arc<[u8]>,
}

impl Unit {
    /// Create a new unit
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Internal name of the unit
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw payload
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the payload
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Content hash of the payload
    pub fn fingerprint(&self) -> blake3::Hash {
        blake3::hash(&self.bytes)
    }

    /// Archive entry name for this unit (`name + ".class"`)
    pub fn entry_name(&self) -> String {
        format!("{}{}", self.name, CLASS_SUFFIX)
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.bytes == other.bytes
    }
}

impl Eq for Unit {}

/// Convert a source-style dotted name to internal form.
pub fn to_internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// Convert an internal name to source-style dotted form.
pub fn to_source_name(name: &str) -> String {
    name.replace(['/', '$'], ".")
}

/// Strip the `.class` suffix from an archive entry name.
pub fn unit_name_from_entry(entry: &str) -> Option<&str> {
    entry.strip_suffix(CLASS_SUFFIX).filter(|name| !name.is_empty())
}

/// Validate an internal name.
///
/// Rejects empty names, dotted names and names with empty segments.
pub fn validate_internal_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("empty name".to_string()));
    }
    if name.contains('.') || name.contains(';') || name.contains('[') {
        return Err(Error::InvalidName(format!("not an internal name: {}", name)));
    }
    if name.split('/').any(str::is_empty) {
        return Err(Error::InvalidName(format!("empty package segment: {}", name)));
    }
    Ok(())
}
