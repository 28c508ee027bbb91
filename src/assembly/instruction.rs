//! Structured JVM instruction representation.
//!
//! Method bodies are held as a flat `Vec<Instruction>` in which every position referenced
//! from elsewhere (a branch target, an exception range boundary, a line number entry, a
//! stack map frame) is marked by a [`Instruction::Label`] pseudo-instruction. References
//! point at [`Label`] values instead of byte offsets, so instructions can be inserted or
//! replaced without invalidating them. Offsets are recomputed by
//! [`crate::assembly::encoder::encode`].

use std::fmt;

use crate::assembly::opcodes::{self, mnemonic};

/// A symbolic position inside a method body.
///
/// Labels produced by the decoder carry the original byte offset as their id, fresh labels
/// are allocated past the end of the original code by [`crate::classfile::Code::new_label`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// A single JVM instruction with its operands resolved to labels and pool indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Position marker, encodes to nothing
    Label(Label),
    /// Any instruction without operands (`iconst_0`, `aload_1`, `iadd`, `areturn`, ...)
    Simple(u8),
    /// `bipush` or `sipush`
    Push {
        /// `BIPUSH` or `SIPUSH`
        opcode: u8,
        /// Pushed value, range-limited by the opcode
        value: i16,
    },
    /// `newarray` with a primitive element type (`T_INT`, `T_LONG`, ...)
    NewArray(u8),
    /// Local variable load/store or `ret` with an explicit index
    Local {
        /// The non-wide opcode
        opcode: u8,
        /// Local variable slot
        index: u16,
    },
    /// `iinc`
    Iinc {
        /// Local variable slot
        index: u16,
        /// Signed increment
        delta: i16,
    },
    /// `ldc` or `ldc_w`, the short form is chosen when encoding
    Ldc(u16),
    /// `ldc2_w`
    Ldc2(u16),
    /// `getstatic`, `putstatic`, `getfield` or `putfield`
    Field {
        /// Field access opcode
        opcode: u8,
        /// Index of a `CONSTANT_Fieldref`
        index: u16,
    },
    /// `invokevirtual`, `invokespecial` or `invokestatic`
    Invoke {
        /// Invocation opcode
        opcode: u8,
        /// Index of a `CONSTANT_Methodref` or `CONSTANT_InterfaceMethodref`
        index: u16,
    },
    /// `invokeinterface`
    InvokeInterface {
        /// Index of a `CONSTANT_InterfaceMethodref`
        index: u16,
        /// Argument slot count including the receiver
        count: u8,
    },
    /// `invokedynamic`
    InvokeDynamic(u16),
    /// `new`, `anewarray`, `checkcast` or `instanceof`
    Type {
        /// Type instruction opcode
        opcode: u8,
        /// Index of a `CONSTANT_Class`
        index: u16,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Index of a `CONSTANT_Class`
        index: u16,
        /// Number of dimensions to allocate
        dimensions: u8,
    },
    /// Conditional or unconditional branch (`ifeq` .. `if_acmpne`, `goto`, `jsr`, `ifnull`,
    /// `ifnonnull`, `goto_w`, `jsr_w`)
    Jump {
        /// Branch opcode
        opcode: u8,
        /// Branch target
        target: Label,
    },
    /// `tableswitch`
    TableSwitch {
        /// Target for values outside `low..=high`
        default: Label,
        /// Lowest matched value
        low: i32,
        /// Highest matched value
        high: i32,
        /// One target per value in `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target for unmatched keys
        default: Label,
        /// Key/target pairs sorted by key
        pairs: Vec<(i32, Label)>,
    },
}

impl Instruction {
    /// Returns the opcode byte this instruction encodes to, `None` for labels.
    ///
    /// For [`Instruction::Ldc`] this is always `ldc`; the encoder switches to `ldc_w` when
    /// the index does not fit a byte.
    #[must_use]
    pub fn opcode(&self) -> Option<u8> {
        Some(match self {
            Instruction::Label(_) => return None,
            Instruction::Simple(op)
            | Instruction::Push { opcode: op, .. }
            | Instruction::Local { opcode: op, .. }
            | Instruction::Field { opcode: op, .. }
            | Instruction::Invoke { opcode: op, .. }
            | Instruction::Type { opcode: op, .. }
            | Instruction::Jump { opcode: op, .. } => *op,
            Instruction::NewArray(_) => opcodes::NEWARRAY,
            Instruction::Iinc { .. } => opcodes::IINC,
            Instruction::Ldc(_) => opcodes::LDC,
            Instruction::Ldc2(_) => opcodes::LDC2_W,
            Instruction::InvokeInterface { .. } => opcodes::INVOKEINTERFACE,
            Instruction::InvokeDynamic(_) => opcodes::INVOKEDYNAMIC,
            Instruction::MultiANewArray { .. } => opcodes::MULTIANEWARRAY,
            Instruction::TableSwitch { .. } => opcodes::TABLESWITCH,
            Instruction::LookupSwitch { .. } => opcodes::LOOKUPSWITCH,
        })
    }

    /// Returns `true` for label pseudo-instructions.
    #[must_use]
    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.opcode().is_some_and(opcodes::is_terminal)
    }

    /// Returns every label this instruction may transfer control to.
    #[must_use]
    pub fn targets(&self) -> Vec<Label> {
        match self {
            Instruction::Jump { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default)
                .chain(targets.iter().copied())
                .collect(),
            Instruction::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, label)| *label))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the smallest instruction pushing the int constant `value`.
    ///
    /// Values outside the `sipush` range need a constant pool entry and are returned as
    /// `None`; callers fall back to [`Instruction::Ldc`] with a `CONSTANT_Integer`.
    #[must_use]
    pub fn push_int(value: i32) -> Option<Instruction> {
        match value {
            -1..=5 => {
                let delta = u8::try_from(value + 1).ok()?;
                Some(Instruction::Simple(opcodes::ICONST_M1 + delta))
            }
            v if i8::try_from(v).is_ok() => Some(Instruction::Push {
                opcode: opcodes::BIPUSH,
                value: i16::try_from(v).ok()?,
            }),
            v => i16::try_from(v).ok().map(|value| Instruction::Push {
                opcode: opcodes::SIPUSH,
                value,
            }),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Instruction::Label(label) = self {
            return write!(f, "{label}:");
        }

        let name = self.opcode().and_then(mnemonic).unwrap_or("???");
        match self {
            Instruction::Push { value, .. } => write!(f, "{name} {value}"),
            Instruction::NewArray(kind) => write!(f, "{name} {kind}"),
            Instruction::Local { index, .. } => write!(f, "{name} {index}"),
            Instruction::Iinc { index, delta } => write!(f, "{name} {index} {delta}"),
            Instruction::Ldc(index)
            | Instruction::Ldc2(index)
            | Instruction::Field { index, .. }
            | Instruction::Invoke { index, .. }
            | Instruction::InvokeDynamic(index)
            | Instruction::Type { index, .. } => write!(f, "{name} #{index}"),
            Instruction::InvokeInterface { index, count } => write!(f, "{name} #{index} {count}"),
            Instruction::MultiANewArray { index, dimensions } => {
                write!(f, "{name} #{index} {dimensions}")
            }
            Instruction::Jump { target, .. } => write!(f, "{name} {target}"),
            Instruction::TableSwitch { low, high, .. } => write!(f, "{name} {low}..{high}"),
            Instruction::LookupSwitch { pairs, .. } => write!(f, "{name} [{}]", pairs.len()),
            Instruction::Label(_) | Instruction::Simple(_) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes::*;

    #[test]
    fn push_int_selection() {
        assert_eq!(Instruction::push_int(-1), Some(Instruction::Simple(ICONST_M1)));
        assert_eq!(Instruction::push_int(5), Some(Instruction::Simple(ICONST_5)));
        assert_eq!(
            Instruction::push_int(6),
            Some(Instruction::Push {
                opcode: BIPUSH,
                value: 6
            })
        );
        assert_eq!(
            Instruction::push_int(-129),
            Some(Instruction::Push {
                opcode: SIPUSH,
                value: -129
            })
        );
        assert_eq!(Instruction::push_int(40_000), None);
    }

    #[test]
    fn switch_targets() {
        let insn = Instruction::TableSwitch {
            default: Label(30),
            low: 0,
            high: 1,
            targets: vec![Label(10), Label(20)],
        };
        assert_eq!(insn.targets(), vec![Label(30), Label(10), Label(20)]);
        assert!(insn.is_terminal());
    }

    #[test]
    fn display() {
        assert_eq!(Instruction::Ldc(7).to_string(), "ldc #7");
        assert_eq!(
            Instruction::Jump {
                opcode: GOTO,
                target: Label(4)
            }
            .to_string(),
            "goto L4"
        );
        assert_eq!(Instruction::Label(Label(4)).to_string(), "L4:");
    }
}
