//! Field and method descriptor parsing

use crate::{Error, Result};

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter field descriptors, in order
    pub params: Vec<String>,
    /// Return descriptor (`V` for void)
    pub ret: String,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let invalid = || Error::decode(descriptor, "malformed method descriptor");
        let rest = descriptor.strip_prefix('(').ok_or_else(invalid)?;
        let close = rest.find(')').ok_or_else(invalid)?;
        let (mut args, ret) = (&rest[..close], &rest[close + 1..]);

        let mut params = Vec::new();
        while !args.is_empty() {
            let len = field_descriptor_len(args).ok_or_else(invalid)?;
            params.push(args[..len].to_string());
            args = &args[len..];
        }

        if ret != "V" && field_descriptor_len(ret) != Some(ret.len()) {
            return Err(invalid());
        }

        Ok(Self {
            params,
            ret: ret.to_string(),
        })
    }

    /// Local/stack slots taken by the parameters (receiver excluded)
    pub fn param_slots(&self) -> u32 {
        self.params.iter().map(|p| u32::from(slot_size(p))).sum()
    }

    /// Stack slots pushed by the return value
    pub fn return_slots(&self) -> u16 {
        if self.ret == "V" { 0 } else { slot_size(&self.ret) }
    }
}

/// Slots occupied by a value of the given field descriptor
pub fn slot_size(descriptor: &str) -> u16 {
    match descriptor.as_bytes().first() {
        Some(b'J') | Some(b'D') => 2,
        Some(b'V') | None => 0,
        _ => 1,
    }
}

/// Length of the leading field descriptor in `s`
fn field_descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while bytes.get(i) == Some(&b'[') {
        i += 1;
    }
    match bytes.get(i)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(i + 1),
        b'L' => s[i..].find(';').filter(|&end| end > 1).map(|end| i + end + 1),
        _ => None,
    }
}

/// Class name referenced by a field descriptor, if any (`Lcom/Foo;` → `com/Foo`)
pub fn referenced_class(descriptor: &str) -> Option<&str> {
    descriptor
        .trim_start_matches('[')
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
}

/// Render a field descriptor as a source-style type (`[I` → `int[]`)
pub fn to_source_type(descriptor: &str) -> String {
    let dims = descriptor.bytes().take_while(|b| *b == b'[').count();
    let base = match &descriptor[dims..] {
        "B" => "byte".to_string(),
        "C" => "char".to_string(),
        "D" => "double".to_string(),
        "F" => "float".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "S" => "short".to_string(),
        "Z" => "boolean".to_string(),
        "V" => "void".to_string(),
        other => referenced_class(other)
            .map(crate::unit::to_source_name)
            .unwrap_or_else(|| other.to_string()),
    };
    format!("{}{}", base, "[]".repeat(dims))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let d = MethodDescriptor::parse("(IJ[Ljava/lang/String;D)Ljava/lang/Object;").unwrap();
        assert_eq!(d.params, vec!["I", "J", "[Ljava/lang/String;", "D"]);
        assert_eq!(d.param_slots(), 6);
        assert_eq!(d.return_slots(), 1);

        let v = MethodDescriptor::parse("()V").unwrap();
        assert!(v.params.is_empty());
        assert_eq!(v.return_slots(), 0);
    }

    #[test]
    fn test_malformed_descriptors() {
        assert!(MethodDescriptor::parse("IV").is_err());
        assert!(MethodDescriptor::parse("(L;)V").is_err());
        assert!(MethodDescriptor::parse("(Q)V").is_err());
        assert!(MethodDescriptor::parse("()").is_err());
    }

    #[test]
    fn test_source_types() {
        assert_eq!(to_source_type("[[I"), "int[][]");
        assert_eq!(to_source_type("Ljava/util/Map$Entry;"), "java.util.Map.Entry");
        assert_eq!(referenced_class("[Lcom/Foo;"), Some("com/Foo"));
        assert_eq!(referenced_class("I"), None);
    }
}
