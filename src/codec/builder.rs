//! Class-file assembler
//!
//! A small builder for producing class files from code, used for fixtures
//! and for synthesizing units. Branch targets are symbolic [`Label`]s that
//! are patched when the method is finished.
//!
//! ```ignore
//! let bytes = ClassBuilder::new("com/example/Greeter")
//!     .method(access::PUBLIC | access::STATIC, "hello", "()V", |code| {
//!         code.invoke(InvokeKind::Static, "com/example/Log", "line", "()V");
//!         code.insn(op::RETURN);
//!     })
//!     .to_bytes()?;
//! ```

use super::bytes::ByteWriter;
use super::insn::{op, InvokeKind};
use super::pool::{Constant, ConstantPool};
use super::{access, writer, ExceptionHandler, FieldDecl, MethodBody, MethodDecl, UnitDecl, OBJECT};
use crate::{Error, Result};

/// Class-file major version written by default (Java 8)
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

/// A branch target inside a method under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

struct Fixup {
    /// Position of the offset field
    at: usize,
    /// Offset of the instruction the jump is relative to
    base: u32,
    label: Label,
    wide: bool,
}

/// Emits the code array of one method.
pub struct CodeBuilder<'p> {
    pool: &'p mut ConstantPool,
    code: ByteWriter,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
    handlers: Vec<(Label, Label, Label, Option<String>)>,
}

impl<'p> CodeBuilder<'p> {
    fn new(pool: &'p mut ConstantPool) -> Self {
        Self {
            pool,
            code: ByteWriter::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
        }
    }

    fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current position
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.offset());
    }

    /// An instruction without operands
    pub fn insn(&mut self, opcode: u8) {
        self.code.u8(opcode);
    }

    /// A local-variable load or store (`iload`..`astore`, `ret`).
    ///
    /// Slots 0-3 of loads and stores use the compact forms; slots above 255
    /// are widened.
    pub fn var(&mut self, opcode: u8, slot: u16) {
        let compact = match opcode {
            op::ILOAD..=op::ALOAD => Some(0x1a + (opcode - op::ILOAD) * 4),
            op::ISTORE..=op::ASTORE => Some(0x3b + (opcode - op::ISTORE) * 4),
            _ => None,
        };
        match (compact, slot) {
            (Some(base), 0..=3) => self.code.u8(base + slot as u8),
            (_, 0..=255) => {
                self.code.u8(opcode);
                self.code.u8(slot as u8);
            }
            _ => {
                self.code.u8(op::WIDE);
                self.code.u8(opcode);
                self.code.u16(slot);
            }
        }
    }

    pub fn iinc(&mut self, slot: u16, delta: i16) {
        if slot <= 255 && (-128..=127).contains(&delta) {
            self.code.u8(op::IINC);
            self.code.u8(slot as u8);
            self.code.u8(delta as i8 as u8);
        } else {
            self.code.u8(op::WIDE);
            self.code.u8(op::IINC);
            self.code.u16(slot);
            self.code.i16(delta);
        }
    }

    /// Push an int constant using the shortest encoding
    pub fn push_int(&mut self, value: i32) {
        match value {
            -1..=5 => self.code.u8((0x03 + value) as u8),
            -128..=127 => {
                self.code.u8(op::BIPUSH);
                self.code.u8(value as i8 as u8);
            }
            -32768..=32767 => {
                self.code.u8(op::SIPUSH);
                self.code.i16(value as i16);
            }
            _ => {
                let index = self.pool.integer(value);
                self.ldc(index);
            }
        }
    }

    pub fn push_string(&mut self, value: &str) {
        let index = self.pool.string(value);
        self.ldc(index);
    }

    fn ldc(&mut self, index: u16) {
        if index <= 255 {
            self.code.u8(op::LDC);
            self.code.u8(index as u8);
        } else {
            self.code.u8(op::LDC_W);
            self.code.u16(index);
        }
    }

    /// A conditional or unconditional 16-bit jump
    pub fn jump(&mut self, opcode: u8, target: Label) {
        let base = self.offset();
        self.code.u8(opcode);
        self.fixups.push(Fixup {
            at: self.code.len(),
            base,
            label: target,
            wide: false,
        });
        self.code.i16(0);
    }

    /// A `tableswitch` over `low..low + targets.len()`
    pub fn table_switch(&mut self, low: i32, default: Label, targets: &[Label]) {
        let base = self.offset();
        self.code.u8(op::TABLESWITCH);
        while self.code.len() % 4 != 0 {
            self.code.u8(0);
        }
        self.wide_fixup(base, default);
        self.code.i32(low);
        self.code.i32(low + targets.len() as i32 - 1);
        for target in targets {
            self.wide_fixup(base, *target);
        }
    }

    fn wide_fixup(&mut self, base: u32, label: Label) {
        self.fixups.push(Fixup {
            at: self.code.len(),
            base,
            label,
            wide: true,
        });
        self.code.i32(0);
    }

    pub fn invoke(&mut self, kind: InvokeKind, owner: &str, name: &str, descriptor: &str) {
        let interface = kind == InvokeKind::Interface;
        let index = self.pool.method_ref(owner, name, descriptor, interface);
        let opcode = match kind {
            InvokeKind::Virtual => op::INVOKEVIRTUAL,
            InvokeKind::Special => op::INVOKESPECIAL,
            InvokeKind::Static => op::INVOKESTATIC,
            InvokeKind::Interface => op::INVOKEINTERFACE,
            InvokeKind::Dynamic => {
                self.invoke_dynamic(name, descriptor);
                return;
            }
        };
        self.code.u8(opcode);
        self.code.u16(index);
        if interface {
            let args = super::descriptor::MethodDescriptor::parse(descriptor)
                .map(|d| d.param_slots())
                .unwrap_or(0);
            self.code.u8((args + 1) as u8);
            self.code.u8(0);
        }
    }

    /// An `invokedynamic` site with bootstrap method 0
    pub fn invoke_dynamic(&mut self, name: &str, descriptor: &str) {
        let nat = self.pool.name_and_type(name, descriptor);
        let index = self.pool.intern(Constant::InvokeDynamic(0, nat));
        self.code.u8(op::INVOKEDYNAMIC);
        self.code.u16(index);
        self.code.u16(0);
    }

    /// `getstatic`, `putstatic`, `getfield` or `putfield`
    pub fn field(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) {
        let index = self.pool.field_ref(owner, name, descriptor);
        self.code.u8(opcode);
        self.code.u16(index);
    }

    /// `new`, `anewarray`, `checkcast` or `instanceof`
    pub fn type_insn(&mut self, opcode: u8, class: &str) {
        let index = self.pool.class(class);
        self.code.u8(opcode);
        self.code.u16(index);
    }

    /// Register an exception handler; `None` catches everything
    pub fn try_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) {
        self.handlers.push((start, end, handler, catch_type.map(str::to_string)));
    }

    fn resolve(&self, label: Label) -> Result<u32> {
        self.labels[label.0].ok_or_else(|| Error::Encode(format!("label {} never bound", label.0)))
    }

    fn finish(mut self) -> Result<MethodBody> {
        for fixup in std::mem::take(&mut self.fixups) {
            let delta = self.resolve(fixup.label)? as i64 - fixup.base as i64;
            if fixup.wide {
                self.code.patch_i32(fixup.at, delta as i32);
            } else {
                let narrow = i16::try_from(delta).map_err(|_| Error::Encode(format!("jump offset {} out of range", delta)))?;
                self.code.patch_u16(fixup.at, narrow as u16);
            }
        }

        let mut handlers = Vec::with_capacity(self.handlers.len());
        for (start, end, handler, catch_type) in &self.handlers {
            handlers.push(ExceptionHandler {
                start: self.resolve(*start)?,
                end: self.resolve(*end)?,
                handler: self.resolve(*handler)?,
                catch_type: catch_type.clone(),
            });
        }

        Ok(MethodBody {
            max_stack: 0,
            max_locals: 0,
            code: self.code.into_inner(),
            handlers,
            attributes: Vec::new(),
        })
    }
}

/// Builds a [`UnitDecl`] member by member.
pub struct ClassBuilder {
    decl: UnitDecl,
    error: Option<Error>,
}

impl ClassBuilder {
    /// Create a new public class extending `java/lang/Object`
    pub fn new(name: &str) -> Self {
        Self {
            decl: UnitDecl {
                minor_version: 0,
                major_version: DEFAULT_MAJOR_VERSION,
                access: access::PUBLIC | access::SUPER,
                name: name.to_string(),
                super_name: Some(OBJECT.to_string()),
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                attributes: Vec::new(),
                pool: ConstantPool::new(),
            },
            error: None,
        }
    }

    /// Create a new public interface
    pub fn interface_type(name: &str) -> Self {
        Self::new(name).access(access::PUBLIC | access::INTERFACE | access::ABSTRACT)
    }

    pub fn access(mut self, flags: u16) -> Self {
        self.decl.access = flags;
        self
    }

    pub fn super_class(mut self, name: &str) -> Self {
        self.decl.super_name = Some(name.to_string());
        self
    }

    /// Declare no superclass (only valid for `java/lang/Object`)
    pub fn no_super(mut self) -> Self {
        self.decl.super_name = None;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.decl.interfaces.push(name.to_string());
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.decl.fields.push(FieldDecl {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes: Vec::new(),
        });
        self
    }

    /// Add a method whose body is emitted by `emit`
    pub fn method(mut self, access: u16, name: &str, descriptor: &str, emit: impl FnOnce(&mut CodeBuilder<'_>)) -> Self {
        let mut code = CodeBuilder::new(&mut self.decl.pool);
        emit(&mut code);
        match code.finish() {
            Ok(body) => self.decl.methods.push(MethodDecl {
                access,
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                body: Some(body),
                attributes: Vec::new(),
            }),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Add a public abstract method
    pub fn abstract_method(mut self, name: &str, descriptor: &str) -> Self {
        self.decl.methods.push(MethodDecl {
            access: access::PUBLIC | access::ABSTRACT,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            body: None,
            attributes: Vec::new(),
        });
        self
    }

    /// Finish the declaration; method maxima are left at zero
    pub fn build(self) -> Result<UnitDecl> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.decl),
        }
    }

    /// Finish and serialize with computed maxima
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        writer::write_class(&self.build()?, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::reader::parse_class;
    use crate::codec::{FlowKind, Operand};

    #[test]
    fn test_labels_resolve_backward_and_forward() {
        let decl = ClassBuilder::new("com/example/Loop")
            .method(access::STATIC, "spin", "(I)V", |code| {
                let top = code.label();
                let done = code.label();
                code.bind(top);
                code.var(op::ILOAD, 0);
                code.jump(op::IFEQ, done);
                code.iinc(0, -1);
                code.jump(op::GOTO, top);
                code.bind(done);
                code.insn(op::RETURN);
            })
            .build()
            .unwrap();

        let body = decl.methods[0].body.as_ref().unwrap();
        let insns = decl.instructions(body).unwrap();
        assert_eq!(insns[1].flow(), FlowKind::Branch(10));
        assert_eq!(insns[3].flow(), FlowKind::Goto(0));
    }

    #[test]
    fn test_unbound_label_fails_build() {
        let result = ClassBuilder::new("com/example/Bad")
            .method(access::STATIC, "f", "()V", |code| {
                let nowhere = code.label();
                code.jump(op::GOTO, nowhere);
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_wide_locals_and_constants() {
        let bytes = ClassBuilder::new("com/example/W")
            .method(access::STATIC, "f", "()V", |code| {
                code.push_int(100_000);
                code.var(op::ISTORE, 300);
                code.push_string("hello");
                code.insn(0x57);
                code.insn(op::RETURN);
            })
            .to_bytes()
            .unwrap();
        let decl = parse_class("com/example/W", &bytes).unwrap();
        let body = decl.methods[0].body.as_ref().unwrap();
        let insns = decl.instructions(body).unwrap();
        assert!(insns[1].wide);
        assert_eq!(insns[1].operand, Operand::Local(300));
        assert_eq!(body.max_locals, 301);
        assert_eq!(body.max_stack, 1);
    }

    #[test]
    fn test_table_switch_targets() {
        let decl = ClassBuilder::new("com/example/S")
            .method(access::STATIC, "pick", "(I)V", |code| {
                let a = code.label();
                let b = code.label();
                let other = code.label();
                code.var(op::ILOAD, 0);
                code.table_switch(0, other, &[a, b]);
                code.bind(a);
                code.insn(op::RETURN);
                code.bind(b);
                code.insn(op::RETURN);
                code.bind(other);
                code.insn(op::RETURN);
            })
            .build()
            .unwrap();
        let body = decl.methods[0].body.as_ref().unwrap();
        let insns = decl.instructions(body).unwrap();
        assert_eq!(insns[1].flow(), FlowKind::Switch { default: 26, targets: vec![24, 25] });
    }
}
