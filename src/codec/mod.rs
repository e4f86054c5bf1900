//! Class-file codec
//!
//! The workspace treats unit bytes as opaque and delegates all parsing and
//! serialization to a [`UnitCodec`]. [`ClassFileCodec`] is the built-in
//! implementation: a reader into [`UnitDecl`] and a writer that preserves
//! the original constant pool so raw code and attribute payloads stay valid.

pub mod bytes;
pub mod pool;
pub mod descriptor;
pub mod insn;
pub mod reader;
pub mod writer;
pub mod maxs;
pub mod builder;

pub use builder::{ClassBuilder, CodeBuilder, Label};
pub use insn::{FlowKind, Instruction, InvokeKind, Invocation, Operand};
pub use pool::ConstantPool;

use crate::unit::Unit;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Access flags shared by classes, fields and methods
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const BRIDGE: u16 = 0x0040;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;
}

/// How the writer treats derived method data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriterFlags {
    /// Recompute stack map frames (implies maxima)
    ComputeFrames,
    /// Recompute `max_stack` and `max_locals`
    #[default]
    ComputeMaxs,
    /// Write stored values unchanged
    None,
}

impl WriterFlags {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriterFlags::ComputeFrames => "compute-frames",
            WriterFlags::ComputeMaxs => "compute-maxs",
            WriterFlags::None => "none",
        }
    }
}

impl std::fmt::Display for WriterFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type-relationship oracle consulted by frame-computing writers.
pub trait TypeHierarchy {
    /// Nearest common superclass of two classes, if both are known
    fn common_super_class(&self, a: &str, b: &str) -> Option<String>;

    fn is_interface(&self, name: &str) -> bool;
}

/// Oracle that knows nothing and answers `java/lang/Object`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatHierarchy;

impl TypeHierarchy for FlatHierarchy {
    fn common_super_class(&self, _a: &str, _b: &str) -> Option<String> {
        Some(OBJECT.to_string())
    }

    fn is_interface(&self, _name: &str) -> bool {
        false
    }
}

/// Root of every class hierarchy
pub const OBJECT: &str = "java/lang/Object";

/// Binary-format collaborator used by the workspace.
pub trait UnitCodec: Send + Sync {
    /// Parse a unit into its declaration model
    fn decode(&self, unit: &Unit) -> Result<UnitDecl>;

    /// Serialize a declaration model
    fn encode(&self, decl: &UnitDecl, flags: WriterFlags, hierarchy: &dyn TypeHierarchy) -> Result<Vec<u8>>;
}

/// The built-in class-file codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassFileCodec;

impl UnitCodec for ClassFileCodec {
    fn decode(&self, unit: &Unit) -> Result<UnitDecl> {
        let decl = reader::parse_class(unit.name(), unit.bytes())?;
        if decl.name != unit.name() {
            return Err(Error::decode(
                unit.name(),
                format!("class file declares {}", decl.name),
            ));
        }
        Ok(decl)
    }

    fn encode(&self, decl: &UnitDecl, flags: WriterFlags, _hierarchy: &dyn TypeHierarchy) -> Result<Vec<u8>> {
        match flags {
            WriterFlags::ComputeFrames => Err(Error::Unsupported(
                "stack map frame computation requires an external codec".to_string(),
            )),
            WriterFlags::ComputeMaxs => writer::write_class(decl, true),
            WriterFlags::None => writer::write_class(decl, false),
        }
    }
}

// ========== Declaration model ==========

/// An attribute kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: String,
    pub data: Vec<u8>,
}

/// A decoded class.
///
/// Code and raw attribute payloads address `pool` by index, so the pool
/// travels with the declaration.
#[derive(Debug, Clone)]
pub struct UnitDecl {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub attributes: Vec<RawAttribute>,
    pub pool: ConstantPool,
}

impl UnitDecl {
    pub fn is_interface(&self) -> bool {
        self.access & access::INTERFACE != 0
    }

    /// Direct supertypes: the superclass first, then interfaces
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.super_name.as_deref().into_iter().chain(self.interfaces.iter().map(String::as_str))
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Decode the instructions of a method body
    pub fn instructions(&self, body: &MethodBody) -> Result<Vec<Instruction>> {
        insn::decode_instructions(&self.name, &body.code, &self.pool)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<RawAttribute>,
}

impl FieldDecl {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    /// The `Code` attribute, absent for abstract and native methods
    pub body: Option<MethodBody>,
    /// Attributes other than `Code`
    pub attributes: Vec<RawAttribute>,
}

impl MethodDecl {
    pub fn is_static(&self) -> bool {
        self.access & access::STATIC != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub handlers: Vec<ExceptionHandler>,
    pub attributes: Vec<RawAttribute>,
}

/// An exception table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: u32,
    /// Exclusive
    pub end: u32,
    pub handler: u32,
    /// `None` catches everything (`finally`)
    pub catch_type: Option<String>,
}

impl ExceptionHandler {
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }
}
