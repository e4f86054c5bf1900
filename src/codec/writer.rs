//! Class-file writer
//!
//! Writes a [`UnitDecl`] back to bytes on top of a copy of its own pool.
//! Names are interned, so existing entries are reused and new ones are
//! appended; indices already embedded in code stay valid.

use super::bytes::ByteWriter;
use super::maxs::compute_maxs;
use super::pool::ConstantPool;
use super::reader::MAGIC;
use super::{FieldDecl, MethodBody, MethodDecl, RawAttribute, UnitDecl};
use crate::{Error, Result};

/// Serialize a declaration. With `recompute`, method maxima are
/// recomputed from the code instead of taken from the body.
pub fn write_class(decl: &UnitDecl, recompute: bool) -> Result<Vec<u8>> {
    let mut pool = decl.pool.clone();
    let mut body = ByteWriter::new();

    body.u16(decl.access);
    body.u16(pool.class(&decl.name));
    body.u16(decl.super_name.as_deref().map(|s| pool.class(s)).unwrap_or(0));

    body.u16(count(decl.interfaces.len(), "interfaces")?);
    for interface in &decl.interfaces {
        body.u16(pool.class(interface));
    }

    body.u16(count(decl.fields.len(), "fields")?);
    for field in &decl.fields {
        write_field(&mut body, &mut pool, field)?;
    }

    body.u16(count(decl.methods.len(), "methods")?);
    for method in &decl.methods {
        let maxs = match (&method.body, recompute) {
            (Some(code), true) => Some(compute_maxs(decl, method, code)?),
            (Some(code), false) => Some((code.max_stack, code.max_locals)),
            (None, _) => None,
        };
        write_method(&mut body, &mut pool, method, maxs)?;
    }

    write_attributes(&mut body, &mut pool, &decl.attributes)?;

    let mut out = ByteWriter::new();
    out.u32(MAGIC);
    out.u16(decl.minor_version);
    out.u16(decl.major_version);
    pool.write(&mut out)?;
    out.bytes(&body.into_inner());
    Ok(out.into_inner())
}

fn count(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| Error::Encode(format!("too many {} ({})", what, len)))
}

fn write_field(out: &mut ByteWriter, pool: &mut ConstantPool, field: &FieldDecl) -> Result<()> {
    out.u16(field.access);
    out.u16(pool.utf8(&field.name));
    out.u16(pool.utf8(&field.descriptor));
    write_attributes(out, pool, &field.attributes)
}

fn write_method(
    out: &mut ByteWriter,
    pool: &mut ConstantPool,
    method: &MethodDecl,
    maxs: Option<(u16, u16)>,
) -> Result<()> {
    out.u16(method.access);
    out.u16(pool.utf8(&method.name));
    out.u16(pool.utf8(&method.descriptor));

    let extra = usize::from(method.body.is_some());
    out.u16(count(method.attributes.len() + extra, "method attributes")?);
    if let (Some(body), Some((max_stack, max_locals))) = (&method.body, maxs) {
        let data = encode_code(pool, body, max_stack, max_locals)?;
        write_attribute(out, pool, "Code", &data)?;
    }
    for attribute in &method.attributes {
        write_attribute(out, pool, &attribute.name, &attribute.data)?;
    }
    Ok(())
}

fn encode_code(pool: &mut ConstantPool, body: &MethodBody, max_stack: u16, max_locals: u16) -> Result<Vec<u8>> {
    let mut out = ByteWriter::new();
    out.u16(max_stack);
    out.u16(max_locals);
    out.u32(u32::try_from(body.code.len()).map_err(|_| Error::Encode("code too long".to_string()))?);
    out.bytes(&body.code);

    out.u16(count(body.handlers.len(), "exception handlers")?);
    for handler in &body.handlers {
        let narrow = |v: u32| u16::try_from(v).map_err(|_| Error::Encode(format!("handler offset {} too large", v)));
        out.u16(narrow(handler.start)?);
        out.u16(narrow(handler.end)?);
        out.u16(narrow(handler.handler)?);
        out.u16(handler.catch_type.as_deref().map(|t| pool.class(t)).unwrap_or(0));
    }

    write_attributes(&mut out, pool, &body.attributes)?;
    Ok(out.into_inner())
}

fn write_attributes(out: &mut ByteWriter, pool: &mut ConstantPool, attributes: &[RawAttribute]) -> Result<()> {
    out.u16(count(attributes.len(), "attributes")?);
    for attribute in attributes {
        write_attribute(out, pool, &attribute.name, &attribute.data)?;
    }
    Ok(())
}

fn write_attribute(out: &mut ByteWriter, pool: &mut ConstantPool, name: &str, data: &[u8]) -> Result<()> {
    out.u16(pool.utf8(name));
    out.u32(u32::try_from(data.len()).map_err(|_| Error::Encode(format!("attribute {} too long", name)))?);
    out.bytes(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::reader::parse_class;
    use crate::codec::{access, ClassBuilder};

    #[test]
    fn test_stored_maxima_survive_without_recompute() {
        let mut decl = ClassBuilder::new("com/example/A")
            .method(access::PUBLIC | access::STATIC, "f", "()V", |code| {
                code.insn(0xb1);
            })
            .build()
            .unwrap();
        if let Some(body) = decl.methods[0].body.as_mut() {
            body.max_stack = 9;
            body.max_locals = 7;
        }

        let kept = parse_class("com/example/A", &write_class(&decl, false).unwrap()).unwrap();
        let body = kept.methods[0].body.as_ref().unwrap();
        assert_eq!((body.max_stack, body.max_locals), (9, 7));

        let fixed = parse_class("com/example/A", &write_class(&decl, true).unwrap()).unwrap();
        let body = fixed.methods[0].body.as_ref().unwrap();
        assert_eq!((body.max_stack, body.max_locals), (0, 0));
    }

    #[test]
    fn test_renamed_member_appends_to_pool() {
        let bytes = ClassBuilder::new("com/example/A").field(access::PUBLIC, "x", "I").to_bytes().unwrap();
        let mut decl = parse_class("com/example/A", &bytes).unwrap();
        let before = decl.pool.slot_count();
        decl.fields[0].name = "renamed".to_string();

        let rewritten = parse_class("com/example/A", &write_class(&decl, true).unwrap()).unwrap();
        assert_eq!(rewritten.fields[0].name, "renamed");
        assert_eq!(rewritten.pool.slot_count(), before + 1);
    }
}
