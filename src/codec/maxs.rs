//! `max_stack` / `max_locals` computation
//!
//! `max_locals` is the larger of the parameter slots and the highest local
//! slot any instruction touches. `max_stack` comes from a worklist over the
//! control-flow successors, tracking the operand depth at each offset.

use super::descriptor::{slot_size, MethodDescriptor};
use super::insn::{local_width, op, FlowKind, Instruction, Operand};
use super::{MethodBody, MethodDecl, UnitDecl};
use crate::{Error, Result};
use std::collections::HashMap;

/// Compute `(max_stack, max_locals)` for a method body.
pub fn compute_maxs(decl: &UnitDecl, method: &MethodDecl, body: &MethodBody) -> Result<(u16, u16)> {
    let label = format!("{}.{}{}", decl.name, method.name, method.descriptor);
    let signature = MethodDescriptor::parse(&method.descriptor)?;
    let instructions = decl.instructions(body)?;

    let receiver = if method.is_static() { 0 } else { 1 };
    let mut max_locals: u32 = signature.param_slots() + receiver;
    for insn in &instructions {
        if let Operand::Local(slot) = insn.operand {
            let width = match insn.opcode {
                op::IINC | op::RET => 1,
                other => local_width(other),
            };
            max_locals = max_locals.max(u32::from(slot) + u32::from(width));
        }
    }
    let max_locals = u16::try_from(max_locals)
        .map_err(|_| Error::Encode(format!("{}: max_locals {} exceeds limit", label, max_locals)))?;

    let max_stack = max_stack(&label, &instructions, body)?;
    Ok((max_stack, max_locals))
}

fn max_stack(label: &str, instructions: &[Instruction], body: &MethodBody) -> Result<u16> {
    if instructions.is_empty() {
        return Ok(0);
    }
    let index: HashMap<u32, usize> = instructions.iter().enumerate().map(|(i, insn)| (insn.offset, i)).collect();
    let mut depth: Vec<Option<i32>> = vec![None; instructions.len()];
    let mut worklist = vec![(0u32, 0i32)];
    for handler in &body.handlers {
        worklist.push((handler.handler, 1));
    }

    let mut max = 0i32;
    while let Some((offset, entry)) = worklist.pop() {
        let Some(&i) = index.get(&offset) else {
            return Err(Error::Encode(format!("{}: no instruction at offset {}", label, offset)));
        };
        match depth[i] {
            Some(known) if known >= entry => continue,
            _ => depth[i] = Some(entry),
        }

        let insn = &instructions[i];
        let after = entry + stack_effect(insn)?;
        if after < 0 {
            return Err(Error::Encode(format!("{}: stack underflow at offset {}", label, offset)));
        }
        max = max.max(entry).max(after);

        let next = insn.next_offset();
        match insn.flow() {
            FlowKind::Next => worklist.push((next, after)),
            FlowKind::Goto(target) => worklist.push((target, after)),
            FlowKind::Branch(target) => {
                worklist.push((target, after));
                worklist.push((next, after));
            }
            FlowKind::Subroutine(target) => {
                worklist.push((target, after));
                worklist.push((next, entry));
            }
            FlowKind::Switch { default, targets } => {
                worklist.push((default, after));
                worklist.extend(targets.into_iter().map(|t| (t, after)));
            }
            FlowKind::Exit => {}
        }
    }

    u16::try_from(max).map_err(|_| Error::Encode(format!("{}: max_stack {} exceeds limit", label, max)))
}

/// Net operand-stack change of one instruction, in slots
fn stack_effect(insn: &Instruction) -> Result<i32> {
    let effect = match (&insn.operand, insn.opcode) {
        (Operand::Field { descriptor, .. }, opcode) => {
            let size = slot_size(descriptor) as i32;
            match opcode {
                op::GETSTATIC => size,
                op::PUTSTATIC => -size,
                op::GETFIELD => size - 1,
                _ => -size - 1,
            }
        }
        (Operand::Invoke(call), _) => {
            let d = MethodDescriptor::parse(&call.descriptor)?;
            let receiver = if call.kind == super::InvokeKind::Static { 0 } else { 1 };
            d.return_slots() as i32 - d.param_slots() as i32 - receiver
        }
        (Operand::Dynamic { descriptor, .. }, _) => {
            let d = MethodDescriptor::parse(descriptor)?;
            d.return_slots() as i32 - d.param_slots() as i32
        }
        (Operand::MultiArray { dimensions, .. }, _) => 1 - *dimensions as i32,
        (_, opcode) => simple_effect(opcode),
    };
    Ok(effect)
}

fn simple_effect(opcode: u8) -> i32 {
    match opcode {
        0x00 => 0,
        0x01..=0x08 => 1,
        0x09 | 0x0a => 2,
        0x0b..=0x0d => 1,
        0x0e | 0x0f => 2,
        op::BIPUSH | op::SIPUSH | op::LDC | op::LDC_W => 1,
        op::LDC2_W => 2,
        // loads
        op::ILOAD | op::FLOAD | op::ALOAD => 1,
        op::LLOAD | op::DLOAD => 2,
        0x1a..=0x1d | 0x22..=0x25 | 0x2a..=0x2d => 1,
        0x1e..=0x21 | 0x26..=0x29 => 2,
        // array loads
        0x2f | 0x31 => 0,
        0x2e | 0x30 | 0x32..=0x35 => -1,
        // stores
        op::ISTORE | 0x38 | op::ASTORE => -1,
        op::LSTORE | op::DSTORE => -2,
        0x3b..=0x3e | 0x43..=0x46 | 0x4b..=0x4e => -1,
        0x3f..=0x42 | 0x47..=0x4a => -2,
        // array stores
        0x50 | 0x52 => -4,
        0x4f | 0x51 | 0x53..=0x56 => -3,
        // stack manipulation
        0x57 => -1,
        0x58 => -2,
        0x59..=0x5b => 1,
        0x5c..=0x5e => 2,
        0x5f => 0,
        // arithmetic: int/float forms pop one slot, long/double forms pop two
        0x60..=0x73 => if (opcode - 0x60) % 2 == 0 { -1 } else { -2 },
        0x74..=0x77 => 0,
        0x78..=0x7d => -1,
        0x7e | 0x80 | 0x82 => -1,
        0x7f | 0x81 | 0x83 => -2,
        op::IINC => 0,
        // conversions
        0x85 | 0x87 | 0x8c | 0x8d => 1,
        0x88 | 0x89 | 0x8e | 0x90 => -1,
        0x86 | 0x8a | 0x8b | 0x8f | 0x91..=0x93 => 0,
        // comparisons
        0x94 | 0x97 | 0x98 => -3,
        0x95 | 0x96 => -1,
        0x99..=0x9e => -1,
        0x9f..=0xa6 => -2,
        op::GOTO | op::GOTO_W | op::RET => 0,
        op::JSR | op::JSR_W => 1,
        op::TABLESWITCH | op::LOOKUPSWITCH => -1,
        0xac | 0xae | 0xb0 => -1,
        0xad | 0xaf => -2,
        op::RETURN => 0,
        op::NEW => 1,
        op::NEWARRAY | op::ANEWARRAY | 0xbe | op::CHECKCAST | op::INSTANCEOF => 0,
        op::ATHROW => -1,
        0xc2 | 0xc3 => -1,
        op::IFNULL | op::IFNONNULL => -1,
        _ => 0,
    }
}
