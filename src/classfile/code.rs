//! Decoded method bodies.
//!
//! A [`Code`] holds the instruction list of a method together with every table that refers
//! to positions in it: the exception table, line numbers, local variable ranges and stack
//! map frames. All of those refer to [`crate::assembly::Label`] markers placed in the
//! instruction list while decoding, which keeps them valid when the rewriter splices new
//! instructions in. [`Code::to_bytes`] lays the body out again, recomputing branch
//! offsets, switch padding, frame deltas and `max_stack`.
//!
//! Attributes that embed bytecode offsets in a form this module does not model (type
//! annotations on instructions, the pre-Java 6 `StackMap`) are dropped when a modified
//! body is written, since their offsets would no longer be correct.

use std::collections::{BTreeSet, HashSet};

use log::debug;

use crate::{
    assembly::{self, Instruction, Label},
    classfile::{
        stackmap::{self, StackMapFrame},
        ConstantPool,
    },
    file::{io::write_be, parser::Parser},
    Error::LimitExceeded,
    Result,
};

const LINE_NUMBER_TABLE: &[u8] = b"LineNumberTable";
const LOCAL_VARIABLE_TABLE: &[u8] = b"LocalVariableTable";
const LOCAL_VARIABLE_TYPE_TABLE: &[u8] = b"LocalVariableTypeTable";
const STACK_MAP_TABLE: &[u8] = b"StackMapTable";
const OFFSET_BEARING: [&[u8]; 3] = [
    b"RuntimeVisibleTypeAnnotations",
    b"RuntimeInvisibleTypeAnnotations",
    b"StackMap",
];

/// One entry of the exception table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First covered instruction
    pub start: Label,
    /// First instruction past the covered range
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// `CONSTANT_Class` of the caught type, 0 for any
    pub catch_type: u16,
}

/// A `line_number_table` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineNumber {
    /// First instruction of the line
    pub start: Label,
    /// Source line
    pub line: u16,
}

/// A local variable (or local variable type) table entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    /// Start of the live range
    pub start: Label,
    /// End of the live range (exclusive)
    pub end: Label,
    /// Name index
    pub name: u16,
    /// Descriptor, or signature for the type table
    pub descriptor: u16,
    /// Local slot
    pub index: u16,
}

/// A sub-attribute of `Code`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeAttribute {
    /// `LineNumberTable`
    LineNumbers {
        /// Attribute name index
        name_index: u16,
        /// Entries
        entries: Vec<LineNumber>,
    },
    /// `LocalVariableTable` or `LocalVariableTypeTable`
    LocalVariables {
        /// Attribute name index
        name_index: u16,
        /// Entries
        entries: Vec<LocalVariable>,
    },
    /// `StackMapTable`
    StackMap {
        /// Attribute name index
        name_index: u16,
        /// Frames
        frames: Vec<StackMapFrame>,
    },
    /// Any other attribute
    Raw {
        /// Attribute name index
        name_index: u16,
        /// Attribute body
        info: Vec<u8>,
        /// Whether the body embeds bytecode offsets
        offsets: bool,
    },
}

/// A decoded `Code` attribute body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    /// Declared operand stack depth, a lower bound for the recomputed value
    pub max_stack: u16,
    /// Local variable slots
    pub max_locals: u16,
    /// Instructions with label markers
    pub instructions: Vec<Instruction>,
    /// Exception table in priority order
    pub exception_table: Vec<ExceptionHandler>,
    /// Nested attributes
    pub attributes: Vec<CodeAttribute>,
    next_label: u32,
}

impl Code {
    /// Creates a body from scratch.
    #[must_use]
    pub fn new(max_locals: u16, instructions: Vec<Instruction>) -> Self {
        let next_label = instructions
            .iter()
            .filter_map(|insn| match insn {
                Instruction::Label(label) => Some(label.0 + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        Code {
            max_stack: 0,
            max_locals,
            instructions,
            exception_table: Vec::new(),
            attributes: Vec::new(),
            next_label,
        }
    }

    /// Allocates a label distinct from every label already used in this body.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Returns the position of the label marker for `label`.
    #[must_use]
    pub fn label_position(&self, label: Label) -> Option<usize> {
        self.instructions
            .iter()
            .position(|insn| *insn == Instruction::Label(label))
    }

    /// Returns the stack map frames, if the body has a `StackMapTable`.
    #[must_use]
    pub fn frames(&self) -> Option<&[StackMapFrame]> {
        self.attributes.iter().find_map(|attr| match attr {
            CodeAttribute::StackMap { frames, .. } => Some(frames.as_slice()),
            _ => None,
        })
    }

    /// Parses the body of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytecode is invalid or a branch target,
    /// exception range or stack map frame does not fall on an instruction boundary.
    pub fn parse(info: &[u8], pool: &ConstantPool) -> Result<Self> {
        let mut parser = Parser::new(info);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let code_length = parser.read_be::<u32>()?;
        let bytes = parser.read_bytes(code_length as usize)?;
        let decoded = assembly::decode_stream(bytes)?;

        let mut boundaries: HashSet<u32> = decoded.iter().map(|(offset, _)| *offset).collect();
        boundaries.insert(code_length);

        let mut referenced = BTreeSet::new();
        let require = |referenced: &mut BTreeSet<u32>, label: Label, what: &str| {
            place(&boundaries, referenced, label, what)
        };

        for (_, instruction) in &decoded {
            for target in instruction.targets() {
                require(&mut referenced, target, "Branch")?;
            }
        }

        let handler_count = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(usize::from(handler_count));
        for _ in 0..handler_count {
            let handler = ExceptionHandler {
                start: Label(u32::from(parser.read_be::<u16>()?)),
                end: Label(u32::from(parser.read_be::<u16>()?)),
                handler: Label(u32::from(parser.read_be::<u16>()?)),
                catch_type: parser.read_be::<u16>()?,
            };
            require(&mut referenced, handler.start, "Exception range")?;
            require(&mut referenced, handler.end, "Exception range")?;
            require(&mut referenced, handler.handler, "Exception handler")?;
            exception_table.push(handler);
        }

        let mut attributes = Vec::new();
        let attribute_count = parser.read_be::<u16>()?;
        for _ in 0..attribute_count {
            let name_index = parser.read_be::<u16>()?;
            let length = parser.read_be::<u32>()?;
            let body = parser.read_bytes(length as usize)?;
            let name = pool.utf8(name_index)?;

            let attribute = if name == LINE_NUMBER_TABLE {
                let mut entries = parse_line_numbers(body)?;
                entries.retain(|entry| boundaries.contains(&entry.start.0));
                for entry in &entries {
                    referenced.insert(entry.start.0);
                }
                CodeAttribute::LineNumbers {
                    name_index,
                    entries,
                }
            } else if name == LOCAL_VARIABLE_TABLE || name == LOCAL_VARIABLE_TYPE_TABLE {
                let mut entries = parse_local_variables(body)?;
                entries.retain(|entry| {
                    boundaries.contains(&entry.start.0) && boundaries.contains(&entry.end.0)
                });
                for entry in &entries {
                    referenced.insert(entry.start.0);
                    referenced.insert(entry.end.0);
                }
                CodeAttribute::LocalVariables {
                    name_index,
                    entries,
                }
            } else if name == STACK_MAP_TABLE {
                let frames = stackmap::parse_frames(body)?;
                for frame in &frames {
                    for label in frame.labels() {
                        require(&mut referenced, label, "Stack map frame")?;
                    }
                }
                CodeAttribute::StackMap { name_index, frames }
            } else {
                CodeAttribute::Raw {
                    name_index,
                    info: body.to_vec(),
                    offsets: OFFSET_BEARING.contains(&name),
                }
            };
            attributes.push(attribute);
        }

        let mut instructions = Vec::with_capacity(decoded.len() + referenced.len());
        for (offset, instruction) in decoded {
            if referenced.contains(&offset) {
                instructions.push(Instruction::Label(Label(offset)));
            }
            instructions.push(instruction);
        }
        if referenced.contains(&code_length) {
            instructions.push(Instruction::Label(Label(code_length)));
        }

        Ok(Code {
            max_stack,
            max_locals,
            instructions,
            exception_table,
            attributes,
            next_label: code_length + 1,
        })
    }

    /// Lays the body out and serializes it as a `Code` attribute body.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the code no longer fits the class file
    /// limits and [`crate::Error::Malformed`] for references to labels that are not placed.
    pub fn to_bytes(&self, pool: &ConstantPool) -> Result<Vec<u8>> {
        let encoded = assembly::encode(&self.instructions)?;
        let max_stack = assembly::max_stack(&self.instructions, &self.exception_table, pool)?
            .max(self.max_stack);
        let resolve = |label: Label| -> Result<u16> {
            let offset = encoded
                .labels
                .get(&label)
                .ok_or_else(|| malformed_error!("Unresolved label {}", label))?;
            u16::try_from(*offset)
                .map_err(|_| LimitExceeded(format!("offset {offset} exceeds 65535")))
        };

        let mut out = Vec::with_capacity(encoded.bytes.len() + 32);
        write_be(&mut out, max_stack);
        write_be(&mut out, self.max_locals);
        #[allow(clippy::cast_possible_truncation)]
        write_be(&mut out, encoded.bytes.len() as u32);
        out.extend_from_slice(&encoded.bytes);

        write_be(&mut out, count16(self.exception_table.len())?);
        for handler in &self.exception_table {
            write_be(&mut out, resolve(handler.start)?);
            write_be(&mut out, resolve(handler.end)?);
            write_be(&mut out, resolve(handler.handler)?);
            write_be(&mut out, handler.catch_type);
        }

        let mut bodies = Vec::with_capacity(self.attributes.len());
        for attribute in &self.attributes {
            let (name_index, body) = match attribute {
                CodeAttribute::LineNumbers {
                    name_index,
                    entries,
                } => {
                    let mut body = Vec::with_capacity(2 + entries.len() * 4);
                    write_be(&mut body, count16(entries.len())?);
                    for entry in entries {
                        write_be(&mut body, resolve(entry.start)?);
                        write_be(&mut body, entry.line);
                    }
                    (*name_index, body)
                }
                CodeAttribute::LocalVariables {
                    name_index,
                    entries,
                } => {
                    let mut body = Vec::with_capacity(2 + entries.len() * 10);
                    write_be(&mut body, count16(entries.len())?);
                    for entry in entries {
                        let start = resolve(entry.start)?;
                        write_be(&mut body, start);
                        write_be(&mut body, resolve(entry.end)?.saturating_sub(start));
                        write_be(&mut body, entry.name);
                        write_be(&mut body, entry.descriptor);
                        write_be(&mut body, entry.index);
                    }
                    (*name_index, body)
                }
                CodeAttribute::StackMap { name_index, frames } => {
                    (*name_index, stackmap::write_frames(frames, &encoded.labels)?)
                }
                CodeAttribute::Raw {
                    name_index,
                    offsets: true,
                    ..
                } => {
                    debug!(
                        "Dropping code attribute #{} whose offsets changed with the layout",
                        name_index
                    );
                    continue;
                }
                CodeAttribute::Raw {
                    name_index, info, ..
                } => (*name_index, info.clone()),
            };
            bodies.push((name_index, body));
        }

        write_be(&mut out, count16(bodies.len())?);
        for (name_index, body) in bodies {
            write_be(&mut out, name_index);
            #[allow(clippy::cast_possible_truncation)]
            write_be(&mut out, body.len() as u32);
            out.extend_from_slice(&body);
        }

        Ok(out)
    }
}

fn place(
    boundaries: &HashSet<u32>,
    referenced: &mut BTreeSet<u32>,
    label: Label,
    what: &str,
) -> Result<()> {
    if boundaries.contains(&label.0) {
        referenced.insert(label.0);
        Ok(())
    } else {
        Err(malformed_error!(
            "{} refers to offset {} which is not an instruction boundary",
            what,
            label.0
        ))
    }
}

fn count16(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| LimitExceeded(format!("table of {len} entries")))
}

fn parse_line_numbers(body: &[u8]) -> Result<Vec<LineNumber>> {
    let mut parser = Parser::new(body);
    let count = parser.read_be::<u16>()?;
    (0..count)
        .map(|_| {
            Ok(LineNumber {
                start: Label(u32::from(parser.read_be::<u16>()?)),
                line: parser.read_be::<u16>()?,
            })
        })
        .collect()
}

fn parse_local_variables(body: &[u8]) -> Result<Vec<LocalVariable>> {
    let mut parser = Parser::new(body);
    let count = parser.read_be::<u16>()?;
    (0..count)
        .map(|_| {
            let start = u32::from(parser.read_be::<u16>()?);
            let length = u32::from(parser.read_be::<u16>()?);
            Ok(LocalVariable {
                start: Label(start),
                end: Label(start + length),
                name: parser.read_be::<u16>()?,
                descriptor: parser.read_be::<u16>()?,
                index: parser.read_be::<u16>()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes::*;

    fn pool_with_names() -> (ConstantPool, u16, u16) {
        let mut pool = ConstantPool::new();
        let lnt = pool.add_utf8("LineNumberTable").unwrap();
        let smt = pool.add_utf8("StackMapTable").unwrap();
        (pool, lnt, smt)
    }

    /// iconst_0; ifeq L7; iconst_1; pop; nop; L7: return
    fn branchy_body(lnt: u16, smt: u16) -> Vec<u8> {
        let code = [ICONST_0, IFEQ, 0x00, 0x06, ICONST_1, POP, NOP, RETURN];
        let mut out = Vec::new();
        write_be(&mut out, 1_u16);
        write_be(&mut out, 0_u16);
        write_be(&mut out, code.len() as u32);
        out.extend_from_slice(&code);
        write_be(&mut out, 0_u16);
        write_be(&mut out, 2_u16);
        // LineNumberTable: pc 0 -> 10, pc 4 -> 11, pc 3 lies inside the ifeq operand
        write_be(&mut out, lnt);
        write_be(&mut out, 14_u32);
        write_be(&mut out, 3_u16);
        for (pc, line) in [(0_u16, 10_u16), (4, 11), (3, 99)] {
            write_be(&mut out, pc);
            write_be(&mut out, line);
        }
        // StackMapTable: same frame at 7
        write_be(&mut out, smt);
        write_be(&mut out, 3_u32);
        write_be(&mut out, 1_u16);
        write_be(&mut out, 7_u8);
        out
    }

    #[test]
    fn labels_are_placed_at_references() {
        let (pool, lnt, smt) = pool_with_names();
        let code = Code::parse(&branchy_body(lnt, smt), &pool).unwrap();

        assert_eq!(code.instructions[0], Instruction::Label(Label(0)));
        assert!(code.label_position(Label(7)).is_some());
        assert!(code.label_position(Label(4)).is_some());

        let CodeAttribute::LineNumbers { entries, .. } = &code.attributes[0] else {
            panic!("expected line numbers");
        };
        // pc 3 falls inside the ifeq operand and is dropped
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn unmodified_layout_is_stable() {
        let (pool, lnt, smt) = pool_with_names();
        let body = branchy_body(lnt, smt);
        let code = Code::parse(&body, &pool).unwrap();
        let written = code.to_bytes(&pool).unwrap();
        let reparsed = Code::parse(&written, &pool).unwrap();
        assert_eq!(reparsed.instructions, code.instructions);
        assert_eq!(reparsed.frames(), code.frames());
    }

    #[test]
    fn insertion_shifts_targets_and_frames() {
        let (pool, lnt, smt) = pool_with_names();
        let mut code = Code::parse(&branchy_body(lnt, smt), &pool).unwrap();

        let position = code
            .instructions
            .iter()
            .position(|insn| *insn == Instruction::Simple(ICONST_1))
            .unwrap();
        code.instructions
            .splice(position..position, [Instruction::Simple(NOP), Instruction::Simple(NOP)]);

        let written = code.to_bytes(&pool).unwrap();
        let reparsed = Code::parse(&written, &pool).unwrap();

        assert_eq!(
            reparsed.instructions[2],
            Instruction::Jump {
                opcode: IFEQ,
                target: Label(9)
            }
        );
        assert_eq!(reparsed.frames().unwrap()[0].label, Label(9));
        assert_eq!(reparsed.max_stack, 1);
    }

    #[test]
    fn misaligned_branch_is_rejected() {
        let pool = ConstantPool::new();
        let mut out = Vec::new();
        write_be(&mut out, 1_u16);
        write_be(&mut out, 0_u16);
        write_be(&mut out, 5_u32);
        out.extend_from_slice(&[GOTO, 0x00, 0x02, NOP, RETURN]);
        write_be(&mut out, 0_u16);
        write_be(&mut out, 0_u16);
        assert!(Code::parse(&out, &pool).is_err());
    }
}
