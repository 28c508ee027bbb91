//! Operand stack depth analysis.
//!
//! [`max_stack`] walks every reachable path through an instruction list and returns the
//! deepest operand stack it sees, the value the `max_stack` item of a `Code` attribute has
//! to hold. Each instruction is visited once with the first depth that reaches it; valid
//! bytecode has the same depth on every incoming edge.

use std::collections::HashMap;

use crate::{
    assembly::{opcodes::*, Instruction, Label},
    classfile::{descriptor, ConstantPool, ExceptionHandler},
    Result,
};

/// Computes the maximum operand stack depth of a method body.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a member reference has an invalid descriptor,
/// a branch targets an unplaced label or the stack underflows.
pub fn max_stack(
    instructions: &[Instruction],
    handlers: &[ExceptionHandler],
    pool: &ConstantPool,
) -> Result<u16> {
    let positions: HashMap<Label, usize> = instructions
        .iter()
        .enumerate()
        .filter_map(|(index, insn)| match insn {
            Instruction::Label(label) => Some((*label, index)),
            _ => None,
        })
        .collect();
    let position = |label: Label| -> Result<usize> {
        positions
            .get(&label)
            .copied()
            .ok_or_else(|| malformed_error!("Reference to unplaced label {}", label))
    };

    let mut depths: Vec<Option<u16>> = vec![None; instructions.len()];
    let mut worklist = Vec::new();
    let mut deepest = 0_u16;

    let enqueue = |depths: &mut Vec<Option<u16>>, worklist: &mut Vec<usize>, index: usize, depth: u16| {
        if index < depths.len() && depths[index].is_none() {
            depths[index] = Some(depth);
            worklist.push(index);
        }
    };

    enqueue(&mut depths, &mut worklist, 0, 0);
    for handler in handlers {
        enqueue(&mut depths, &mut worklist, position(handler.handler)?, 1);
        deepest = deepest.max(1);
    }

    while let Some(start) = worklist.pop() {
        let mut index = start;
        let mut depth = depths[start].unwrap_or(0);

        loop {
            let instruction = &instructions[index];
            let (pop, push) = effect(instruction, pool)?;
            if depth < pop {
                return Err(malformed_error!(
                    "Operand stack underflow at instruction {} ({})",
                    index,
                    instruction
                ));
            }
            depth = depth - pop + push;
            deepest = deepest.max(depth);

            for target in instruction.targets() {
                enqueue(&mut depths, &mut worklist, position(target)?, depth);
            }

            if instruction.is_terminal() {
                break;
            }
            // jsr pushes the return address only on the subroutine path
            if matches!(instruction, Instruction::Jump { opcode: JSR | JSR_W, .. }) {
                depth -= 1;
            }

            index += 1;
            if index >= instructions.len() {
                break;
            }
            match depths[index] {
                Some(_) => break,
                None => depths[index] = Some(depth),
            }
        }
    }

    Ok(deepest)
}

/// Returns the number of slots popped and pushed by `instruction`.
fn effect(instruction: &Instruction, pool: &ConstantPool) -> Result<(u16, u16)> {
    Ok(match instruction {
        Instruction::Label(_) | Instruction::Iinc { .. } => (0, 0),
        Instruction::Simple(opcode) => simple_effect(*opcode),
        Instruction::Push { .. } => (0, 1),
        Instruction::NewArray(_) => (1, 1),
        Instruction::Local { opcode, .. } => match *opcode {
            LLOAD | DLOAD => (0, 2),
            ILOAD | FLOAD | ALOAD => (0, 1),
            LSTORE | DSTORE => (2, 0),
            _ if *opcode == RET => (0, 0),
            _ => (1, 0),
        },
        Instruction::Ldc(_) => (0, 1),
        Instruction::Ldc2(_) => (0, 2),
        Instruction::Field { opcode, index } => {
            let size = descriptor::field_slots(&pool.reference_descriptor(*index)?)?;
            match *opcode {
                GETSTATIC => (0, size),
                PUTSTATIC => (size, 0),
                GETFIELD => (1, size),
                _ => (1 + size, 0),
            }
        }
        Instruction::Invoke { opcode, index } => {
            let (args, ret) = descriptor::method_slots(&pool.reference_descriptor(*index)?)?;
            let receiver = u16::from(*opcode != INVOKESTATIC);
            (args + receiver, ret)
        }
        Instruction::InvokeInterface { index, .. } => {
            let (args, ret) = descriptor::method_slots(&pool.reference_descriptor(*index)?)?;
            (args + 1, ret)
        }
        Instruction::InvokeDynamic(index) => {
            descriptor::method_slots(&pool.reference_descriptor(*index)?)?
        }
        Instruction::Type { opcode, .. } => match *opcode {
            NEW => (0, 1),
            _ => (1, 1),
        },
        Instruction::MultiANewArray { dimensions, .. } => (u16::from(*dimensions), 1),
        Instruction::Jump { opcode, .. } => match *opcode {
            GOTO | GOTO_W => (0, 0),
            JSR | JSR_W => (0, 1),
            IF_ICMPEQ..=IF_ACMPNE => (2, 0),
            _ => (1, 0),
        },
        Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => (1, 0),
    })
}

fn simple_effect(opcode: u8) -> (u16, u16) {
    match opcode {
        NOP | RETURN => (0, 0),
        ACONST_NULL..=ICONST_5 | FCONST_0..=FCONST_2 => (0, 1),
        LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => (0, 2),
        ILOAD_0..=ILOAD_3 | FLOAD_0..=FLOAD_3 | ALOAD_0..=ALOAD_3 => (0, 1),
        LLOAD_0..=LLOAD_3 | DLOAD_0..=DLOAD_3 => (0, 2),
        LALOAD | DALOAD => (2, 2),
        IALOAD | FALOAD | AALOAD | BALOAD | CALOAD | SALOAD => (2, 1),
        ISTORE_0..=ISTORE_3 | FSTORE_0..=FSTORE_3 | ASTORE_0..=ASTORE_3 => (1, 0),
        LSTORE_0..=LSTORE_3 | DSTORE_0..=DSTORE_3 => (2, 0),
        LASTORE | DASTORE => (4, 0),
        IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => (3, 0),
        POP => (1, 0),
        POP2 => (2, 0),
        DUP => (1, 2),
        DUP_X1 => (2, 3),
        DUP_X2 => (3, 4),
        DUP2 => (2, 4),
        DUP2_X1 => (3, 5),
        DUP2_X2 => (4, 6),
        SWAP => (2, 2),
        // binary arithmetic: i, l, f, d per group of four
        IADD..=DREM => {
            if (opcode - IADD) % 2 == 0 {
                (2, 1)
            } else {
                (4, 2)
            }
        }
        INEG..=DNEG => {
            if (opcode - INEG) % 2 == 0 {
                (1, 1)
            } else {
                (2, 2)
            }
        }
        // shifts take an int distance
        ISHL..=LUSHR => {
            if (opcode - ISHL) % 2 == 0 {
                (2, 1)
            } else {
                (3, 2)
            }
        }
        IAND..=LXOR => {
            if (opcode - IAND) % 2 == 0 {
                (2, 1)
            } else {
                (4, 2)
            }
        }
        I2L | I2D => (1, 2),
        I2F | I2B | I2C | I2S => (1, 1),
        L2I | L2F => (2, 1),
        L2D => (2, 2),
        F2I => (1, 1),
        F2L | F2D => (1, 2),
        D2I | D2F => (2, 1),
        D2L => (2, 2),
        LCMP | DCMPL | DCMPG => (4, 1),
        FCMPL | FCMPG => (2, 1),
        IRETURN | FRETURN | ARETURN => (1, 0),
        LRETURN | DRETURN => (2, 0),
        ARRAYLENGTH => (1, 1),
        ATHROW => (1, 0),
        MONITORENTER | MONITOREXIT => (1, 0),
        _ => (0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line() {
        let mut pool = ConstantPool::new();
        let decode = pool
            .add_method_ref("veil/runtime/Veil", "decode", "(Ljava/lang/String;)Ljava/lang/String;")
            .unwrap();
        let text = pool.add_string("x").unwrap();

        let instructions = vec![
            Instruction::Simple(LCONST_1),
            Instruction::Ldc(text),
            Instruction::Invoke {
                opcode: INVOKESTATIC,
                index: decode,
            },
            Instruction::Simple(POP),
            Instruction::Simple(POP2),
            Instruction::Simple(RETURN),
        ];
        assert_eq!(max_stack(&instructions, &[], &pool).unwrap(), 3);
    }

    #[test]
    fn array_building_sequence() {
        let mut pool = ConstantPool::new();
        let value = pool.add_long(1 << 32).unwrap();

        let instructions = vec![
            Instruction::Simple(ICONST_1),
            Instruction::NewArray(T_LONG),
            Instruction::Simple(DUP),
            Instruction::Simple(ICONST_0),
            Instruction::Ldc2(value),
            Instruction::Simple(LASTORE),
            Instruction::Simple(ARETURN),
        ];
        assert_eq!(max_stack(&instructions, &[], &pool).unwrap(), 5);
    }

    #[test]
    fn handlers_start_with_exception() {
        let pool = ConstantPool::new();
        let start = Label(0);
        let end = Label(1);
        let handler = Label(2);
        let instructions = vec![
            Instruction::Label(start),
            Instruction::Simple(ACONST_NULL),
            Instruction::Simple(ATHROW),
            Instruction::Label(end),
            Instruction::Label(handler),
            Instruction::Simple(DUP),
            Instruction::Simple(POP),
            Instruction::Simple(ATHROW),
        ];
        let handlers = [ExceptionHandler {
            start,
            end,
            handler,
            catch_type: 0,
        }];
        assert_eq!(max_stack(&instructions, &handlers, &pool).unwrap(), 2);
    }

    #[test]
    fn branches_are_followed() {
        let pool = ConstantPool::new();
        let skip = Label(0);
        let instructions = vec![
            Instruction::Simple(ICONST_0),
            Instruction::Jump {
                opcode: IFEQ,
                target: skip,
            },
            Instruction::Simple(ICONST_1),
            Instruction::Simple(ICONST_2),
            Instruction::Simple(ICONST_3),
            Instruction::Simple(POP),
            Instruction::Simple(POP2),
            Instruction::Label(skip),
            Instruction::Simple(RETURN),
        ];
        assert_eq!(max_stack(&instructions, &[], &pool).unwrap(), 3);
    }

    #[test]
    fn underflow_is_malformed() {
        let pool = ConstantPool::new();
        let instructions = vec![Instruction::Simple(POP), Instruction::Simple(RETURN)];
        assert!(max_stack(&instructions, &[], &pool).is_err());
    }
}
