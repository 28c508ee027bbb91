//! JVM bytecode layout and encoding.
//!
//! [`encode`] assigns byte offsets to an instruction list, resolves every label and writes
//! the final `code` array. Layout is iterative: a `goto` or `jsr` whose displacement no
//! longer fits 16 bits is widened to `goto_w` / `jsr_w` and the layout repeated, while a
//! conditional branch that cannot reach its target fails with
//! [`crate::Error::LimitExceeded`].

use std::collections::{HashMap, HashSet};

use crate::{
    assembly::{opcodes::*, Instruction, Label},
    file::io::write_be,
    Error::LimitExceeded,
    Result,
};

/// Largest permitted `code` array.
pub const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// The result of laying out an instruction list.
#[derive(Debug)]
pub struct Encoded {
    /// The `code` array
    pub bytes: Vec<u8>,
    /// Final offset of every label marker
    pub labels: HashMap<Label, u32>,
}

/// Lays out and encodes `instructions`.
///
/// # Errors
/// Returns [`crate::Error::LimitExceeded`] if the code exceeds 65535 bytes or a
/// conditional branch cannot reach its target, and [`crate::Error::Malformed`] for
/// duplicate or missing labels.
pub fn encode(instructions: &[Instruction]) -> Result<Encoded> {
    let mut widened = HashSet::new();

    let (offsets, labels, length) = loop {
        let (offsets, labels, length) = layout(instructions, &widened)?;

        let mut changed = false;
        for (index, instruction) in instructions.iter().enumerate() {
            let Instruction::Jump { opcode, target } = instruction else {
                continue;
            };
            if matches!(*opcode, GOTO_W | JSR_W) || widened.contains(&index) {
                continue;
            }
            let delta = displacement(&labels, *target, offsets[index])?;
            if i16::try_from(delta).is_err() {
                if matches!(*opcode, GOTO | JSR) {
                    widened.insert(index);
                    changed = true;
                } else {
                    return Err(LimitExceeded(format!(
                        "conditional branch displacement {delta} exceeds 16 bits"
                    )));
                }
            }
        }

        if !changed {
            break (offsets, labels, length);
        }
    };

    if length == 0 || length > MAX_CODE_LENGTH {
        return Err(LimitExceeded(format!(
            "code length {length} outside 1..=65535"
        )));
    }

    let mut bytes = Vec::with_capacity(length);
    for (index, instruction) in instructions.iter().enumerate() {
        let offset = offsets[index];
        debug_assert_eq!(bytes.len(), offset as usize);
        write_instruction(
            &mut bytes,
            instruction,
            offset,
            &labels,
            widened.contains(&index),
        )?;
    }

    Ok(Encoded { bytes, labels })
}

fn layout(
    instructions: &[Instruction],
    widened: &HashSet<usize>,
) -> Result<(Vec<u32>, HashMap<Label, u32>, usize)> {
    let mut offsets = Vec::with_capacity(instructions.len());
    let mut labels = HashMap::new();
    let mut position = 0_usize;

    for (index, instruction) in instructions.iter().enumerate() {
        let offset = u32::try_from(position)
            .map_err(|_| LimitExceeded(format!("code length {position}")))?;
        offsets.push(offset);

        if let Instruction::Label(label) = instruction {
            if labels.insert(*label, offset).is_some() {
                return Err(malformed_error!("Label {} is placed twice", label));
            }
        }
        position += size(instruction, position, widened.contains(&index));
    }

    Ok((offsets, labels, position))
}

fn size(instruction: &Instruction, position: usize, widened: bool) -> usize {
    let padding = |position: usize| (4 - (position + 1) % 4) % 4;
    match instruction {
        Instruction::Label(_) => 0,
        Instruction::Simple(_) => 1,
        Instruction::Push { opcode, .. } => {
            if *opcode == BIPUSH {
                2
            } else {
                3
            }
        }
        Instruction::NewArray(_) => 2,
        Instruction::Local { index, .. } => {
            if *index <= 0xFF {
                2
            } else {
                4
            }
        }
        Instruction::Iinc { index, delta } => {
            if *index <= 0xFF && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Instruction::Ldc(index) => {
            if *index <= 0xFF {
                2
            } else {
                3
            }
        }
        Instruction::Ldc2(_)
        | Instruction::Field { .. }
        | Instruction::Invoke { .. }
        | Instruction::Type { .. } => 3,
        Instruction::MultiANewArray { .. } => 4,
        Instruction::InvokeInterface { .. } | Instruction::InvokeDynamic(_) => 5,
        Instruction::Jump { opcode, .. } => {
            if widened || matches!(*opcode, GOTO_W | JSR_W) {
                5
            } else {
                3
            }
        }
        Instruction::TableSwitch { targets, .. } => 1 + padding(position) + 12 + 4 * targets.len(),
        Instruction::LookupSwitch { pairs, .. } => 1 + padding(position) + 8 + 8 * pairs.len(),
    }
}

fn displacement(labels: &HashMap<Label, u32>, target: Label, from: u32) -> Result<i32> {
    let Some(&to) = labels.get(&target) else {
        return Err(malformed_error!("Branch to unplaced label {}", target));
    };
    Ok(i32::try_from(i64::from(to) - i64::from(from))
        .map_err(|_| LimitExceeded(format!("branch displacement to {target}")))?)
}

fn write_instruction(
    out: &mut Vec<u8>,
    instruction: &Instruction,
    offset: u32,
    labels: &HashMap<Label, u32>,
    widened: bool,
) -> Result<()> {
    match instruction {
        Instruction::Label(_) => {}
        Instruction::Simple(opcode) => write_be(out, *opcode),
        Instruction::Push { opcode, value } => {
            write_be(out, *opcode);
            if *opcode == BIPUSH {
                #[allow(clippy::cast_possible_truncation)]
                write_be(out, *value as i8);
            } else {
                write_be(out, *value);
            }
        }
        Instruction::NewArray(kind) => {
            write_be(out, NEWARRAY);
            write_be(out, *kind);
        }
        Instruction::Local { opcode, index } => {
            if let Ok(short) = u8::try_from(*index) {
                write_be(out, *opcode);
                write_be(out, short);
            } else {
                write_be(out, WIDE);
                write_be(out, *opcode);
                write_be(out, *index);
            }
        }
        Instruction::Iinc { index, delta } => match (u8::try_from(*index), i8::try_from(*delta)) {
            (Ok(index), Ok(delta)) => {
                write_be(out, IINC);
                write_be(out, index);
                write_be(out, delta);
            }
            _ => {
                write_be(out, WIDE);
                write_be(out, IINC);
                write_be(out, *index);
                write_be(out, *delta);
            }
        },
        Instruction::Ldc(index) => {
            if let Ok(short) = u8::try_from(*index) {
                write_be(out, LDC);
                write_be(out, short);
            } else {
                write_be(out, LDC_W);
                write_be(out, *index);
            }
        }
        Instruction::Ldc2(index) => {
            write_be(out, LDC2_W);
            write_be(out, *index);
        }
        Instruction::Field { opcode, index }
        | Instruction::Invoke { opcode, index }
        | Instruction::Type { opcode, index } => {
            write_be(out, *opcode);
            write_be(out, *index);
        }
        Instruction::InvokeInterface { index, count } => {
            write_be(out, INVOKEINTERFACE);
            write_be(out, *index);
            write_be(out, *count);
            write_be(out, 0_u8);
        }
        Instruction::InvokeDynamic(index) => {
            write_be(out, INVOKEDYNAMIC);
            write_be(out, *index);
            write_be(out, 0_u16);
        }
        Instruction::MultiANewArray { index, dimensions } => {
            write_be(out, MULTIANEWARRAY);
            write_be(out, *index);
            write_be(out, *dimensions);
        }
        Instruction::Jump { opcode, target } => {
            let delta = displacement(labels, *target, offset)?;
            let wide_opcode = match *opcode {
                GOTO_W | JSR_W => Some(*opcode),
                GOTO if widened => Some(GOTO_W),
                JSR if widened => Some(JSR_W),
                _ => None,
            };
            match wide_opcode {
                Some(wide) => {
                    write_be(out, wide);
                    write_be(out, delta);
                }
                None => {
                    let short = i16::try_from(delta).map_err(|_| {
                        LimitExceeded(format!("branch displacement {delta} exceeds 16 bits"))
                    })?;
                    write_be(out, *opcode);
                    write_be(out, short);
                }
            }
        }
        Instruction::TableSwitch {
            default,
            low,
            high,
            targets,
        } => {
            write_be(out, TABLESWITCH);
            pad(out);
            write_be(out, displacement(labels, *default, offset)?);
            write_be(out, *low);
            write_be(out, *high);
            for target in targets {
                write_be(out, displacement(labels, *target, offset)?);
            }
        }
        Instruction::LookupSwitch { default, pairs } => {
            write_be(out, LOOKUPSWITCH);
            pad(out);
            write_be(out, displacement(labels, *default, offset)?);
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            write_be(out, pairs.len() as i32);
            for (key, target) in pairs {
                write_be(out, *key);
                write_be(out, displacement(labels, *target, offset)?);
            }
        }
    }
    Ok(())
}

fn pad(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}
