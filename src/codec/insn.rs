//! Bytecode instruction decoding
//!
//! Decodes a method's code array into instructions with resolved operands.
//! Only what the analysis graphs and the max computation need is modelled:
//! control transfers, invocations, field accesses, type operands and local
//! variable slots.

use super::bytes::ByteReader;
use super::pool::ConstantPool;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

pub mod op {
    pub const ILOAD: u8 = 0x15;
    pub const LLOAD: u8 = 0x16;
    pub const FLOAD: u8 = 0x17;
    pub const DLOAD: u8 = 0x18;
    pub const ALOAD: u8 = 0x19;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ALOAD_3: u8 = 0x2d;
    pub const ISTORE: u8 = 0x36;
    pub const LSTORE: u8 = 0x37;
    pub const DSTORE: u8 = 0x39;
    pub const ASTORE: u8 = 0x3a;
    pub const ISTORE_0: u8 = 0x3b;
    pub const ASTORE_3: u8 = 0x4e;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const IF_ACMPNE: u8 = 0xa6;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
}

/// How an invocation is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
    Dynamic,
}

impl InvokeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvokeKind::Virtual => "virtual",
            InvokeKind::Special => "special",
            InvokeKind::Static => "static",
            InvokeKind::Interface => "interface",
            InvokeKind::Dynamic => "dynamic",
        }
    }

    /// Whether the runtime target depends on the receiver type
    pub fn is_dispatched(&self) -> bool {
        matches!(self, InvokeKind::Virtual | InvokeKind::Interface)
    }
}

impl std::fmt::Display for InvokeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A statically named method invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: InvokeKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    /// Target is an interface method reference
    pub interface: bool,
}

/// Decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// Local variable slot (loads, stores, `iinc`, `ret`)
    Local(u16),
    /// Absolute branch target
    Jump(u32),
    /// Switch targets (absolute)
    Switch { default: u32, targets: Vec<u32> },
    Invoke(Invocation),
    /// `invokedynamic` call site
    Dynamic { name: String, descriptor: String },
    Field { owner: String, name: String, descriptor: String },
    /// Class operand of `new`, `checkcast`, `instanceof`, `anewarray`
    Type(String),
    MultiArray { descriptor: String, dimensions: u8 },
    /// Pool index of an `ldc` family constant
    Constant(u16),
    /// `bipush`, `sipush` and `newarray` immediates
    Immediate(i32),
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset in the code array
    pub offset: u32,
    /// Opcode; for `wide` forms this is the widened opcode
    pub opcode: u8,
    /// Encoded length in bytes
    pub length: u32,
    pub wide: bool,
    pub operand: Operand,
}

/// How control leaves an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowKind {
    /// Continues to the next instruction
    Next,
    /// Unconditional jump
    Goto(u32),
    /// Conditional jump, falls through otherwise
    Branch(u32),
    /// Subroutine call; control eventually resumes after it
    Subroutine(u32),
    Switch { default: u32, targets: Vec<u32> },
    /// Return, throw or `ret`
    Exit,
}

impl Instruction {
    pub fn next_offset(&self) -> u32 {
        self.offset + self.length
    }

    pub fn flow(&self) -> FlowKind {
        match (&self.operand, self.opcode) {
            (Operand::Jump(target), op::GOTO | op::GOTO_W) => FlowKind::Goto(*target),
            (Operand::Jump(target), op::JSR | op::JSR_W) => FlowKind::Subroutine(*target),
            (Operand::Jump(target), _) => FlowKind::Branch(*target),
            (Operand::Switch { default, targets }, _) => FlowKind::Switch {
                default: *default,
                targets: targets.clone(),
            },
            (_, op::IRETURN..=op::RETURN | op::ATHROW | op::RET) => FlowKind::Exit,
            _ => FlowKind::Next,
        }
    }

    /// Whether the instruction ends a basic block
    pub fn ends_block(&self) -> bool {
        self.flow() != FlowKind::Next
    }

    pub fn invocation(&self) -> Option<&Invocation> {
        match &self.operand {
            Operand::Invoke(invocation) => Some(invocation),
            _ => None,
        }
    }
}

/// Decode a code array.
///
/// `name` is used for error messages only.
pub fn decode_instructions(name: &str, code: &[u8], pool: &ConstantPool) -> Result<Vec<Instruction>> {
    let mut reader = ByteReader::new(name, code);
    let mut instructions = Vec::new();

    while reader.remaining() > 0 {
        let offset = reader.position() as u32;
        let mut opcode = reader.u8()?;
        let mut wide = false;

        let operand = match opcode {
            0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf | 0xc2 | 0xc3 => {
                implicit_local(opcode).map(Operand::Local).unwrap_or(Operand::None)
            }
            op::BIPUSH => Operand::Immediate(reader.u8()? as i8 as i32),
            op::SIPUSH => Operand::Immediate(reader.u16()? as i16 as i32),
            op::NEWARRAY => Operand::Immediate(reader.u8()? as i32),
            op::LDC => Operand::Constant(reader.u8()? as u16),
            op::LDC_W | op::LDC2_W => Operand::Constant(reader.u16()?),
            op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => Operand::Local(reader.u8()? as u16),
            op::IINC => {
                let local = reader.u8()? as u16;
                reader.u8()?;
                Operand::Local(local)
            }
            op::IFEQ..=op::JSR | op::IFNULL | op::IFNONNULL => {
                let delta = reader.u16()? as i16 as i64;
                Operand::Jump(branch_target(&reader, offset, delta, code.len())?)
            }
            op::GOTO_W | op::JSR_W => {
                let delta = reader.u32()? as i32 as i64;
                Operand::Jump(branch_target(&reader, offset, delta, code.len())?)
            }
            op::TABLESWITCH | op::LOOKUPSWITCH => decode_switch(&mut reader, opcode, offset, code.len())?,
            op::GETSTATIC..=op::PUTFIELD => {
                let index = reader.u16()?;
                let member = pool.member_ref(index).map_err(|e| reader.error(e))?;
                Operand::Field {
                    owner: member.owner.to_string(),
                    name: member.name.to_string(),
                    descriptor: member.descriptor.to_string(),
                }
            }
            op::INVOKEVIRTUAL..=op::INVOKEINTERFACE => {
                let index = reader.u16()?;
                if opcode == op::INVOKEINTERFACE {
                    reader.u16()?;
                }
                let member = pool.member_ref(index).map_err(|e| reader.error(e))?;
                let kind = match opcode {
                    op::INVOKEVIRTUAL => InvokeKind::Virtual,
                    op::INVOKESPECIAL => InvokeKind::Special,
                    op::INVOKESTATIC => InvokeKind::Static,
                    _ => InvokeKind::Interface,
                };
                Operand::Invoke(Invocation {
                    kind,
                    owner: member.owner.to_string(),
                    name: member.name.to_string(),
                    descriptor: member.descriptor.to_string(),
                    interface: member.interface,
                })
            }
            op::INVOKEDYNAMIC => {
                let index = reader.u16()?;
                reader.u16()?;
                let (name, descriptor) = pool.invoke_dynamic(index).map_err(|e| reader.error(e))?;
                Operand::Dynamic {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            op::NEW | op::ANEWARRAY | op::CHECKCAST | op::INSTANCEOF => {
                let index = reader.u16()?;
                let name = pool.class_name(index).map_err(|e| reader.error(e))?;
                Operand::Type(name.to_string())
            }
            op::MULTIANEWARRAY => {
                let index = reader.u16()?;
                let dimensions = reader.u8()?;
                let descriptor = pool.class_name(index).map_err(|e| reader.error(e))?;
                Operand::MultiArray {
                    descriptor: descriptor.to_string(),
                    dimensions,
                }
            }
            op::WIDE => {
                wide = true;
                opcode = reader.u8()?;
                match opcode {
                    op::ILOAD..=op::ALOAD | op::ISTORE..=op::ASTORE | op::RET => Operand::Local(reader.u16()?),
                    op::IINC => {
                        let local = reader.u16()?;
                        reader.u16()?;
                        Operand::Local(local)
                    }
                    other => return Err(reader.error(format!("invalid wide opcode 0x{:02x}", other))),
                }
            }
            other => return Err(reader.error(format!("invalid opcode 0x{:02x}", other))),
        };

        instructions.push(Instruction {
            offset,
            opcode,
            length: reader.position() as u32 - offset,
            wide,
            operand,
        });
    }

    Ok(instructions)
}

/// Slot of `xload_n` / `xstore_n` forms
fn implicit_local(opcode: u8) -> Option<u16> {
    match opcode {
        op::ILOAD_0..=op::ALOAD_3 => Some(((opcode - op::ILOAD_0) % 4) as u16),
        op::ISTORE_0..=op::ASTORE_3 => Some(((opcode - op::ISTORE_0) % 4) as u16),
        _ => None,
    }
}

fn branch_target(reader: &ByteReader<'_>, offset: u32, delta: i64, code_len: usize) -> Result<u32> {
    let target = offset as i64 + delta;
    if target < 0 || target >= code_len as i64 {
        return Err(reader.error(format!("branch target {} out of range", target)));
    }
    Ok(target as u32)
}

fn decode_switch(reader: &mut ByteReader<'_>, opcode: u8, offset: u32, code_len: usize) -> Result<Operand> {
    let padding = (4 - (offset as usize + 1) % 4) % 4;
    reader.bytes(padding)?;
    let delta = reader.u32()? as i32 as i64;
    let default = branch_target(reader, offset, delta, code_len)?;

    let mut targets = Vec::new();
    if opcode == op::TABLESWITCH {
        let low = reader.u32()? as i32 as i64;
        let high = reader.u32()? as i32 as i64;
        if high < low {
            return Err(reader.error("tableswitch high < low"));
        }
        for _ in low..=high {
            let delta = reader.u32()? as i32 as i64;
            targets.push(branch_target(reader, offset, delta, code_len)?);
        }
    } else {
        let pairs = reader.u32()? as i32;
        if pairs < 0 {
            return Err(reader.error("negative lookupswitch pair count"));
        }
        for _ in 0..pairs {
            reader.u32()?;
            let delta = reader.u32()? as i32 as i64;
            targets.push(branch_target(reader, offset, delta, code_len)?);
        }
    }

    Ok(Operand::Switch { default, targets })
}

/// Local slot width of a load/store opcode (2 for long and double)
pub fn local_width(opcode: u8) -> u16 {
    match opcode {
        op::LLOAD | op::DLOAD | op::LSTORE | op::DSTORE => 2,
        0x1e..=0x21 | 0x26..=0x29 | 0x3f..=0x42 | 0x47..=0x4a => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_branches_and_returns() {
        // 0: iload_0; 1: ifeq +5 (-> 6); 4: iconst_1; 5: ireturn; 6: iconst_0; 7: ireturn
        let code = [0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let insns = decode_instructions("t", &code, &ConstantPool::new()).unwrap();
        assert_eq!(insns.len(), 6);
        assert_eq!(insns[0].operand, Operand::Local(0));
        assert_eq!(insns[1].flow(), FlowKind::Branch(6));
        assert_eq!(insns[1].length, 3);
        assert_eq!(insns[3].flow(), FlowKind::Exit);
    }

    #[test]
    fn test_decode_tableswitch_padding() {
        // 0: iload_0; 1: tableswitch (pad 2) default=+23 low=0 high=1 [+23, +24]; 24: return; 25: return
        let mut code = vec![0x1a, 0xaa, 0x00, 0x00];
        for v in [23i32, 0, 1, 23, 24] {
            code.extend_from_slice(&v.to_be_bytes());
        }
        code.extend_from_slice(&[0xb1, 0xb1]);
        let insns = decode_instructions("t", &code, &ConstantPool::new()).unwrap();
        assert_eq!(insns[1].length, 23);
        assert_eq!(
            insns[1].flow(),
            FlowKind::Switch { default: 24, targets: vec![24, 25] }
        );
    }

    #[test]
    fn test_decode_invoke_resolves_pool() {
        let mut pool = ConstantPool::new();
        let index = pool.method_ref("com/example/Shape", "area", "()D", true);
        let [hi, lo] = index.to_be_bytes();
        let code = [0x2a, 0xb9, hi, lo, 0x01, 0x00, 0xaf];
        let insns = decode_instructions("t", &code, &pool).unwrap();
        let call = insns[1].invocation().unwrap();
        assert_eq!(call.kind, InvokeKind::Interface);
        assert_eq!(call.owner, "com/example/Shape");
        assert!(call.interface);
        assert_eq!(insns[2].offset, 6);
    }

    #[test]
    fn test_wide_and_invalid() {
        // wide iinc 300, 1; return
        let code = [0xc4, 0x84, 0x01, 0x2c, 0x00, 0x01, 0xb1];
        let insns = decode_instructions("t", &code, &ConstantPool::new()).unwrap();
        assert!(insns[0].wide);
        assert_eq!(insns[0].opcode, op::IINC);
        assert_eq!(insns[0].operand, Operand::Local(300));
        assert_eq!(insns[0].length, 6);

        assert!(decode_instructions("t", &[0xff], &ConstantPool::new()).is_err());
        // goto out of range
        assert!(decode_instructions("t", &[0xa7, 0x00, 0x40], &ConstantPool::new()).is_err());
    }
}
