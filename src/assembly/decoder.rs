//! JVM bytecode decoding.
//!
//! [`decode_stream`] turns the raw `code` array of a `Code` attribute into a linear list of
//! [`crate::assembly::Instruction`] values paired with their byte offsets. Branch operands
//! are converted to [`crate::assembly::Label`] values carrying the absolute target offset;
//! [`crate::classfile::Code`] later inserts the matching label markers.
//!
//! # Examples
//!
//! ```rust
//! use veil::assembly::{decode_stream, Instruction, opcodes};
//!
//! // aload_0; areturn
//! let decoded = decode_stream(&[0x2A, 0xB0])?;
//! assert_eq!(decoded.len(), 2);
//! assert_eq!(decoded[1], (1, Instruction::Simple(opcodes::ARETURN)));
//! # Ok::<(), veil::Error>(())
//! ```

use crate::{
    assembly::{opcodes::*, Instruction, Label},
    file::parser::Parser,
    Result,
};

/// Decodes a complete code array.
///
/// # Arguments
/// * `code` - The bytes of the `code` item of a `Code` attribute
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for undefined opcodes, branch targets outside the
/// code array or inconsistent switch tables, and [`crate::Error::OutOfBounds`] for
/// truncated instructions.
pub fn decode_stream(code: &[u8]) -> Result<Vec<(u32, Instruction)>> {
    if code.is_empty() {
        return Err(malformed_error!("Method body has an empty code array"));
    }
    if code.len() > usize::from(u16::MAX) {
        return Err(malformed_error!(
            "Code array of {} bytes exceeds the 65535 byte limit",
            code.len()
        ));
    }

    let mut parser = Parser::new(code);
    let mut decoded = Vec::new();

    while parser.has_more_data() {
        let offset = parser.pos();
        let instruction = decode_instruction(&mut parser)?;
        #[allow(clippy::cast_possible_truncation)]
        decoded.push((offset as u32, instruction));
    }

    for (offset, instruction) in &decoded {
        for target in instruction.targets() {
            if target.0 as usize >= code.len() {
                return Err(malformed_error!(
                    "Branch at offset {} targets {} outside the code array",
                    offset,
                    target.0
                ));
            }
        }
    }

    Ok(decoded)
}

/// Decodes a single instruction at the parser's position.
///
/// The parser must be positioned relative to the start of the code array, since switch
/// padding and branch targets are computed from it.
///
/// # Errors
/// See [`decode_stream`].
pub fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let start = parser.pos();
    let opcode = parser.read_be::<u8>()?;

    let relative = |delta: i32| -> Result<Label> {
        let target = i64::try_from(start).map_err(|_| crate::Error::OutOfBounds)? + i64::from(delta);
        u32::try_from(target)
            .map(Label)
            .map_err(|_| malformed_error!("Branch at offset {} targets {}", start, target))
    };

    let instruction = match opcode {
        BIPUSH => Instruction::Push {
            opcode,
            value: i16::from(parser.read_be::<i8>()?),
        },
        SIPUSH => Instruction::Push {
            opcode,
            value: parser.read_be::<i16>()?,
        },
        LDC => Instruction::Ldc(u16::from(parser.read_be::<u8>()?)),
        LDC_W => Instruction::Ldc(parser.read_be::<u16>()?),
        LDC2_W => Instruction::Ldc2(parser.read_be::<u16>()?),
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Instruction::Local {
            opcode,
            index: u16::from(parser.read_be::<u8>()?),
        },
        IINC => Instruction::Iinc {
            index: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        },
        IFEQ..=JSR | IFNULL | IFNONNULL => Instruction::Jump {
            opcode,
            target: relative(i32::from(parser.read_be::<i16>()?))?,
        },
        GOTO_W | JSR_W => Instruction::Jump {
            opcode,
            target: relative(parser.read_be::<i32>()?)?,
        },
        TABLESWITCH => {
            parser.align(4)?;
            let default = relative(parser.read_be::<i32>()?)?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!(
                    "tableswitch at offset {} has high {} below low {}",
                    start,
                    high,
                    low
                ));
            }
            let count = usize::try_from(i64::from(high) - i64::from(low) + 1)
                .map_err(|_| crate::Error::OutOfBounds)?;
            if count > parser.remaining() / 4 {
                return Err(crate::Error::OutOfBounds);
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(relative(parser.read_be::<i32>()?)?);
            }
            Instruction::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        LOOKUPSWITCH => {
            parser.align(4)?;
            let default = relative(parser.read_be::<i32>()?)?;
            let npairs = parser.read_be::<i32>()?;
            let count = usize::try_from(npairs).map_err(|_| {
                malformed_error!("lookupswitch at offset {} has {} pairs", start, npairs)
            })?;
            if count > parser.remaining() / 8 {
                return Err(crate::Error::OutOfBounds);
            }
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = parser.read_be::<i32>()?;
                pairs.push((key, relative(parser.read_be::<i32>()?)?));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        GETSTATIC..=PUTFIELD => Instruction::Field {
            opcode,
            index: parser.read_be::<u16>()?,
        },
        INVOKEVIRTUAL..=INVOKESTATIC => Instruction::Invoke {
            opcode,
            index: parser.read_be::<u16>()?,
        },
        INVOKEINTERFACE => {
            let index = parser.read_be::<u16>()?;
            let count = parser.read_be::<u8>()?;
            let _zero = parser.read_be::<u8>()?;
            Instruction::InvokeInterface { index, count }
        }
        INVOKEDYNAMIC => {
            let index = parser.read_be::<u16>()?;
            let _zero = parser.read_be::<u16>()?;
            Instruction::InvokeDynamic(index)
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => Instruction::Type {
            opcode,
            index: parser.read_be::<u16>()?,
        },
        NEWARRAY => Instruction::NewArray(parser.read_be::<u8>()?),
        MULTIANEWARRAY => Instruction::MultiANewArray {
            index: parser.read_be::<u16>()?,
            dimensions: parser.read_be::<u8>()?,
        },
        WIDE => {
            let modified = parser.read_be::<u8>()?;
            match modified {
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => Instruction::Local {
                    opcode: modified,
                    index: parser.read_be::<u16>()?,
                },
                IINC => Instruction::Iinc {
                    index: parser.read_be::<u16>()?,
                    delta: parser.read_be::<i16>()?,
                },
                other => {
                    return Err(malformed_error!(
                        "wide at offset {} modifies opcode 0x{:02X}",
                        start,
                        other
                    ))
                }
            }
        }
        op if mnemonic(op).is_some() => Instruction::Simple(op),
        other => {
            return Err(malformed_error!(
                "Undefined opcode 0x{:02X} at offset {}",
                other,
                start
            ))
        }
    };

    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn ldc_forms() {
        let decoded = decode_stream(&[LDC, 0x05, LDC_W, 0x01, 0x00, LDC2_W, 0x00, 0x09]).unwrap();
        assert_eq!(
            decoded,
            vec![
                (0, Instruction::Ldc(5)),
                (2, Instruction::Ldc(256)),
                (5, Instruction::Ldc2(9)),
            ]
        );
    }

    #[test]
    fn branch_targets_are_absolute() {
        // 0: iconst_0, 1: ifeq +4 -> 5, 4: nop, 5: return
        let decoded = decode_stream(&[ICONST_0, IFEQ, 0x00, 0x04, NOP, RETURN]).unwrap();
        assert_eq!(
            decoded[1],
            (
                1,
                Instruction::Jump {
                    opcode: IFEQ,
                    target: Label(5)
                }
            )
        );
    }

    #[test]
    fn backward_branch() {
        // 0: nop, 1: goto -1 -> 0
        let decoded = decode_stream(&[NOP, GOTO, 0xFF, 0xFF]).unwrap();
        assert_eq!(
            decoded[1].1,
            Instruction::Jump {
                opcode: GOTO,
                target: Label(0)
            }
        );
    }

    #[test]
    fn tableswitch_padding() {
        // 0: iconst_0, 1: tableswitch, pad to 4, default=+19 -> 20, low=0, high=0, +19 -> 20
        let mut code = vec![ICONST_0, TABLESWITCH, 0, 0];
        code.extend_from_slice(&19_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&19_i32.to_be_bytes());
        code.push(RETURN);
        assert_eq!(code.len(), 21);

        let decoded = decode_stream(&code).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(
            decoded[1].1,
            Instruction::TableSwitch {
                default: Label(20),
                low: 0,
                high: 0,
                targets: vec![Label(20)],
            }
        );
        assert_eq!(decoded[2], (20, Instruction::Simple(RETURN)));
    }

    #[test]
    fn wide_forms() {
        let decoded =
            decode_stream(&[WIDE, ALOAD, 0x01, 0x00, WIDE, IINC, 0x00, 0x02, 0xFF, 0xFE]).unwrap();
        assert_eq!(
            decoded,
            vec![
                (
                    0,
                    Instruction::Local {
                        opcode: ALOAD,
                        index: 256
                    }
                ),
                (4, Instruction::Iinc { index: 2, delta: -2 }),
            ]
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(decode_stream(&[]), Err(Error::Malformed { .. })));
        assert!(matches!(decode_stream(&[0xCA]), Err(Error::Malformed { .. })));
        assert!(matches!(decode_stream(&[SIPUSH, 0x01]), Err(Error::OutOfBounds)));
        assert!(matches!(
            decode_stream(&[GOTO, 0x00, 0x10]),
            Err(Error::Malformed { .. })
        ));
    }
}
