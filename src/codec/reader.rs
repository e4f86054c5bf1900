//! Class-file reader

use super::bytes::ByteReader;
use super::pool::ConstantPool;
use super::{ExceptionHandler, FieldDecl, MethodBody, MethodDecl, RawAttribute, UnitDecl};
use crate::{Error, Result};

pub const MAGIC: u32 = 0xCAFE_BABE;
const CODE: &str = "Code";

/// Parse a complete class file. `name` labels errors.
pub fn parse_class(name: &str, data: &[u8]) -> Result<UnitDecl> {
    let mut reader = ByteReader::new(name, data);
    let (minor_version, major_version) = read_header(&mut reader)?;
    let pool = ConstantPool::parse(&mut reader).map_err(|e| relabel(name, e))?;
    let res = read_body(&mut reader, &pool).map_err(|e| relabel(name, e))?;
    let (access, this, super_name, interfaces, fields, methods, attributes) = res;

    if reader.remaining() > 0 {
        return Err(reader.error(format!("{} trailing bytes", reader.remaining())));
    }

    Ok(UnitDecl {
        minor_version,
        major_version,
        access,
        name: this,
        super_name,
        interfaces,
        fields,
        methods,
        attributes,
        pool,
    })
}

/// Read only the declared class name.
pub fn peek_class_name(data: &[u8]) -> Result<String> {
    let mut reader = ByteReader::new("<class file>", data);
    read_header(&mut reader)?;
    let pool = ConstantPool::parse(&mut reader)?;
    reader.u16()?;
    let this = reader.u16()?;
    Ok(pool.class_name(this)?.to_string())
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<(u16, u16)> {
    let magic = reader.u32()?;
    if magic != MAGIC {
        return Err(reader.error(format!("bad magic 0x{:08X}", magic)));
    }
    let minor = reader.u16()?;
    let major = reader.u16()?;
    Ok((minor, major))
}

/// Pool lookups report the constant index; attach the class name instead.
fn relabel(name: &str, err: Error) -> Error {
    match err {
        Error::Decode { name: inner, reason } if inner != name => {
            Error::decode(name, format!("{}: {}", inner, reason))
        }
        other => other,
    }
}

type Body = (
    u16,
    String,
    Option<String>,
    Vec<String>,
    Vec<FieldDecl>,
    Vec<MethodDecl>,
    Vec<RawAttribute>,
);

fn read_body(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Body> {
    let access = reader.u16()?;
    let this = pool.class_name(reader.u16()?)?.to_string();
    let super_name = pool.optional_class_name(reader.u16()?)?.map(str::to_string);

    let interface_count = reader.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(pool.class_name(reader.u16()?)?.to_string());
    }

    let field_count = reader.u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let access = reader.u16()?;
        let name = pool.utf8_at(reader.u16()?)?.to_string();
        let descriptor = pool.utf8_at(reader.u16()?)?.to_string();
        let attributes = read_attributes(reader, pool)?;
        fields.push(FieldDecl {
            access,
            name,
            descriptor,
            attributes,
        });
    }

    let method_count = reader.u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(read_method(reader, pool)?);
    }

    let attributes = read_attributes(reader, pool)?;
    Ok((access, this, super_name, interfaces, fields, methods, attributes))
}

fn read_method(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<MethodDecl> {
    let access = reader.u16()?;
    let name = pool.utf8_at(reader.u16()?)?.to_string();
    let descriptor = pool.utf8_at(reader.u16()?)?.to_string();

    let mut body = None;
    let mut attributes = Vec::new();
    for attribute in read_attributes(reader, pool)? {
        if attribute.name == CODE && body.is_none() {
            let label = format!("{}{}", name, descriptor);
            body = Some(read_code(&label, &attribute.data, pool)?);
        } else {
            attributes.push(attribute);
        }
    }

    Ok(MethodDecl {
        access,
        name,
        descriptor,
        body,
        attributes,
    })
}

fn read_code(label: &str, data: &[u8], pool: &ConstantPool) -> Result<MethodBody> {
    let mut reader = ByteReader::new(label, data);
    let max_stack = reader.u16()?;
    let max_locals = reader.u16()?;
    let code_len = reader.u32()? as usize;
    let code = reader.bytes(code_len)?.to_vec();

    let handler_count = reader.u16()?;
    let mut handlers = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        let start = reader.u16()? as u32;
        let end = reader.u16()? as u32;
        let handler = reader.u16()? as u32;
        let catch_type = pool.optional_class_name(reader.u16()?)?.map(str::to_string);
        if start >= end || end as usize > code_len || handler as usize >= code_len {
            return Err(reader.error("exception handler out of range"));
        }
        handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    let attributes = read_attributes(&mut reader, pool)?;
    Ok(MethodBody {
        max_stack,
        max_locals,
        code,
        handlers,
        attributes,
    })
}

fn read_attributes(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Vec<RawAttribute>> {
    let count = reader.u16()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.utf8_at(reader.u16()?)?.to_string();
        let len = reader.u32()? as usize;
        let data = reader.bytes(len)?.to_vec();
        attributes.push(RawAttribute { name, data });
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::insn::op;
    use crate::codec::{access, ClassBuilder, InvokeKind};
    use crate::testing::class_bytes;

    #[test]
    fn test_parse_declaration() {
        let bytes = ClassBuilder::new("com/example/Circle")
            .super_class("com/example/Shape")
            .interface("java/lang/Comparable")
            .field(access::PRIVATE, "radius", "D")
            .method(access::PUBLIC, "area", "()D", |code| {
                code.var(op::ALOAD, 0);
                code.field(0xb4, "com/example/Circle", "radius", "D");
                code.insn(0xaf);
            })
            .abstract_method("compareTo", "(Ljava/lang/Object;)I")
            .to_bytes()
            .unwrap();

        let decl = parse_class("com/example/Circle", &bytes).unwrap();
        assert_eq!(decl.name, "com/example/Circle");
        assert_eq!(decl.super_name.as_deref(), Some("com/example/Shape"));
        assert_eq!(decl.interfaces, vec!["java/lang/Comparable"]);
        assert_eq!(decl.field("radius").unwrap().descriptor, "D");

        let area = decl.method("area", "()D").unwrap();
        let body = area.body.as_ref().unwrap();
        assert_eq!(body.max_stack, 2);
        assert_eq!(body.max_locals, 1);
        assert!(decl.method("compareTo", "(Ljava/lang/Object;)I").unwrap().body.is_none());
    }

    #[test]
    fn test_parse_decodes_invocations() {
        let bytes = ClassBuilder::new("com/example/Main")
            .method(access::PUBLIC | access::STATIC, "main", "()V", |code| {
                code.invoke(InvokeKind::Static, "com/example/Util", "run", "()V");
                code.insn(0xb1);
            })
            .to_bytes()
            .unwrap();
        let decl = parse_class("com/example/Main", &bytes).unwrap();
        let body = decl.method("main", "()V").unwrap().body.as_ref().unwrap();
        let insns = decl.instructions(body).unwrap();
        let call = insns[0].invocation().unwrap();
        assert_eq!(call.owner, "com/example/Util");
        assert_eq!(call.kind, InvokeKind::Static);
    }

    #[test]
    fn test_truncated_class_is_decode_error() {
        let bytes = class_bytes("com/example/A", Some("java/lang/Object"), &[]);
        let err = parse_class("com/example/A", &bytes[..bytes.len() - 3]).unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("com/example/A"));

        assert!(parse_class("x", b"\x00\x00\x00\x00").is_err());
    }

    #[test]
    fn test_peek_class_name() {
        let bytes = class_bytes("com/example/A", None, &[]);
        assert_eq!(peek_class_name(&bytes).unwrap(), "com/example/A");
        assert!(peek_class_name(b"junk").is_err());
    }
}
