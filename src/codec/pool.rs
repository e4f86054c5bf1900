//! Constant pool model
//!
//! The pool is kept in file order so that raw code and attribute payloads,
//! which address the pool by index, stay valid when a class is written
//! back. New entries are only ever appended.

use super::bytes::{ByteReader, ByteWriter};
use crate::{Error, Result};
use std::collections::HashMap;

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELD_REF: u8 = 9;
pub const TAG_METHOD_REF: u8 = 10;
pub const TAG_INTERFACE_METHOD_REF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

/// A constant pool entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    /// Raw IEEE-754 bits
    Float(u32),
    Long(i64),
    /// Raw IEEE-754 bits
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Slot 0 and the upper half of long/double entries
    Unusable,
}

impl Constant {
    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved member reference (field or method).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    /// True for `InterfaceMethodref` entries
    pub interface: bool,
}

/// Class-file constant pool.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create an empty pool (slot 0 reserved)
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Number of slots including slot 0, as written in the class header
    pub fn slot_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => None,
            Some(entry) => Some(entry),
        }
    }

    /// Read the pool from a class-file stream
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.u16()? as usize;
        if count == 0 {
            return Err(reader.error("constant pool count is zero"));
        }
        let mut pool = Self::new();
        while pool.entries.len() < count {
            let tag = reader.u8()?;
            let constant = match tag {
                TAG_UTF8 => {
                    let len = reader.u16()? as usize;
                    Constant::Utf8(decode_modified_utf8(reader.bytes(len)?))
                }
                TAG_INTEGER => Constant::Integer(reader.u32()? as i32),
                TAG_FLOAT => Constant::Float(reader.u32()?),
                TAG_LONG => Constant::Long(reader.u64()? as i64),
                TAG_DOUBLE => Constant::Double(reader.u64()?),
                TAG_CLASS => Constant::Class(reader.u16()?),
                TAG_STRING => Constant::String(reader.u16()?),
                TAG_FIELD_REF => Constant::FieldRef(reader.u16()?, reader.u16()?),
                TAG_METHOD_REF => Constant::MethodRef(reader.u16()?, reader.u16()?),
                TAG_INTERFACE_METHOD_REF => Constant::InterfaceMethodRef(reader.u16()?, reader.u16()?),
                TAG_NAME_AND_TYPE => Constant::NameAndType(reader.u16()?, reader.u16()?),
                TAG_METHOD_HANDLE => Constant::MethodHandle(reader.u8()?, reader.u16()?),
                TAG_METHOD_TYPE => Constant::MethodType(reader.u16()?),
                TAG_DYNAMIC => Constant::Dynamic(reader.u16()?, reader.u16()?),
                TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic(reader.u16()?, reader.u16()?),
                TAG_MODULE => Constant::Module(reader.u16()?),
                TAG_PACKAGE => Constant::Package(reader.u16()?),
                other => return Err(reader.error(format!("unknown constant tag {}", other))),
            };
            pool.push_raw(constant);
        }
        if pool.entries.len() != count {
            return Err(reader.error("wide constant overflows the pool"));
        }
        Ok(pool)
    }

    /// Write the pool, count included
    pub fn write(&self, out: &mut ByteWriter) -> Result<()> {
        out.u16(self.checked_count()?);
        for entry in &self.entries {
            match entry {
                Constant::Unusable => {}
                Constant::Utf8(s) => {
                    let encoded = encode_modified_utf8(s);
                    let len = u16::try_from(encoded.len())
                        .map_err(|_| Error::Encode(format!("string constant too long ({} bytes)", encoded.len())))?;
                    out.u8(TAG_UTF8);
                    out.u16(len);
                    out.bytes(&encoded);
                }
                Constant::Integer(v) => {
                    out.u8(TAG_INTEGER);
                    out.u32(*v as u32);
                }
                Constant::Float(bits) => {
                    out.u8(TAG_FLOAT);
                    out.u32(*bits);
                }
                Constant::Long(v) => {
                    out.u8(TAG_LONG);
                    out.u64(*v as u64);
                }
                Constant::Double(bits) => {
                    out.u8(TAG_DOUBLE);
                    out.u64(*bits);
                }
                Constant::Class(i) => out.tagged(TAG_CLASS, &[*i]),
                Constant::String(i) => out.tagged(TAG_STRING, &[*i]),
                Constant::FieldRef(a, b) => out.tagged(TAG_FIELD_REF, &[*a, *b]),
                Constant::MethodRef(a, b) => out.tagged(TAG_METHOD_REF, &[*a, *b]),
                Constant::InterfaceMethodRef(a, b) => out.tagged(TAG_INTERFACE_METHOD_REF, &[*a, *b]),
                Constant::NameAndType(a, b) => out.tagged(TAG_NAME_AND_TYPE, &[*a, *b]),
                Constant::MethodHandle(kind, i) => {
                    out.u8(TAG_METHOD_HANDLE);
                    out.u8(*kind);
                    out.u16(*i);
                }
                Constant::MethodType(i) => out.tagged(TAG_METHOD_TYPE, &[*i]),
                Constant::Dynamic(a, b) => out.tagged(TAG_DYNAMIC, &[*a, *b]),
                Constant::InvokeDynamic(a, b) => out.tagged(TAG_INVOKE_DYNAMIC, &[*a, *b]),
                Constant::Module(i) => out.tagged(TAG_MODULE, &[*i]),
                Constant::Package(i) => out.tagged(TAG_PACKAGE, &[*i]),
            }
        }
        Ok(())
    }

    fn checked_count(&self) -> Result<u16> {
        u16::try_from(self.entries.len())
            .map_err(|_| Error::Encode(format!("constant pool overflow ({} slots)", self.entries.len())))
    }

    fn push_raw(&mut self, constant: Constant) -> u16 {
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.lookup.entry(constant.clone()).or_insert(index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        index
    }

    /// Find an equal entry or append a new one
    pub fn intern(&mut self, constant: Constant) -> u16 {
        if let Some(&index) = self.lookup.get(&constant) {
            return index;
        }
        self.push_raw(constant)
    }

    // ========== Interning helpers ==========

    pub fn utf8(&mut self, value: &str) -> u16 {
        self.intern(Constant::Utf8(value.to_string()))
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.intern(Constant::Class(name_index))
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let index = self.utf8(value);
        self.intern(Constant::String(index))
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.intern(Constant::Integer(value))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let n = self.utf8(name);
        let d = self.utf8(descriptor);
        self.intern(Constant::NameAndType(n, d))
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        self.intern(Constant::FieldRef(class, nat))
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str, interface: bool) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        if interface {
            self.intern(Constant::InterfaceMethodRef(class, nat))
        } else {
            self.intern(Constant::MethodRef(class, nat))
        }
    }

    // ========== Typed accessors ==========

    pub fn utf8_at(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Utf8(s)) => Ok(s),
            other => Err(pool_error(index, "Utf8", other)),
        }
    }

    /// Name of the `Class` entry at `index`
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8_at(*name),
            other => Err(pool_error(index, "Class", other)),
        }
    }

    /// Like `class_name`, with index 0 meaning "absent"
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    pub fn name_and_type_at(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index) {
            Some(Constant::NameAndType(n, d)) => Ok((self.utf8_at(*n)?, self.utf8_at(*d)?)),
            other => Err(pool_error(index, "NameAndType", other)),
        }
    }

    /// Resolve a field, method or interface-method reference
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (class, nat, interface) = match self.get(index) {
            Some(Constant::FieldRef(c, n)) | Some(Constant::MethodRef(c, n)) => (*c, *n, false),
            Some(Constant::InterfaceMethodRef(c, n)) => (*c, *n, true),
            other => return Err(pool_error(index, "member reference", other)),
        };
        let owner = self.class_name(class)?;
        let (name, descriptor) = self.name_and_type_at(nat)?;
        Ok(MemberRef {
            owner,
            name,
            descriptor,
            interface,
        })
    }

    /// Name and descriptor of an `InvokeDynamic` entry
    pub fn invoke_dynamic(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index) {
            Some(Constant::InvokeDynamic(_, nat)) => self.name_and_type_at(*nat),
            other => Err(pool_error(index, "InvokeDynamic", other)),
        }
    }
}

fn pool_error(index: u16, expected: &str, found: Option<&Constant>) -> Error {
    Error::decode(
        format!("constant #{}", index),
        format!("expected {}, found {:?}", expected, found),
    )
}

/// Decode the JVM's modified UTF-8.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    // Plain UTF-8 is the common case; only NUL and supplementary characters differ.
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

/// Encode a string as the JVM's modified UTF-8.
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_deduplicates() {
        let mut pool = ConstantPool::new();
        let a = pool.class("com/example/A");
        let b = pool.class("com/example/A");
        assert_eq!(a, b);
        assert_eq!(pool.class_name(a).unwrap(), "com/example/A");

        let m = pool.method_ref("com/example/A", "run", "()V", false);
        let r = pool.member_ref(m).unwrap();
        assert_eq!(r.owner, "com/example/A");
        assert_eq!(r.name, "run");
        assert_eq!(r.descriptor, "()V");
        assert!(!r.interface);
    }

    #[test]
    fn test_wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.intern(Constant::Long(42));
        let next = pool.utf8("after");
        assert_eq!(next, long + 2);
        assert!(pool.get(long + 1).is_none());

        let mut out = ByteWriter::new();
        pool.write(&mut out).unwrap();
        let bytes = out.into_inner();
        let parsed = ConstantPool::parse(&mut ByteReader::new("test", &bytes)).unwrap();
        assert_eq!(parsed.slot_count(), pool.slot_count());
        assert_eq!(parsed.utf8_at(next).unwrap(), "after");
    }

    #[test]
    fn test_modified_utf8_nul_and_supplementary() {
        let value = "a\u{0}b\u{1F600}";
        let encoded = encode_modified_utf8(value);
        assert_eq!(&encoded[1..3], &[0xC0, 0x80]);
        assert!(!encoded.contains(&0xF0));
        assert_eq!(decode_modified_utf8(&encoded), value);
    }

    #[test]
    fn test_wrong_entry_type_is_error() {
        let mut pool = ConstantPool::new();
        let s = pool.utf8("x");
        assert!(pool.class_name(s).is_err());
        assert!(pool.class_name(99).is_err());
        assert_eq!(pool.optional_class_name(0).unwrap(), None);
    }
}
