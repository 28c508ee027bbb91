//! Removal of literal text left behind in the constant pool.
//!
//! Rewriting a literal load leaves its `CONSTANT_String` and the `CONSTANT_Utf8` holding
//! the text in the pool. Entries cannot be removed without renumbering the pool, so the
//! text is blanked in place once nothing refers to it any more.
//!
//! Attributes kept as opaque bytes may embed pool indices in formats this crate does not
//! decode. Any big-endian occurrence of an index inside such a body counts as a
//! reference, so an entry is only cleared when it is provably unused.

use std::collections::{BTreeSet, HashSet};

use crate::{
    assembly::Instruction,
    classfile::{attribute::Attribute, code::CodeAttribute, ClassFile, Code, Constant},
    Result,
};

/// Blanks the text of every string constant in `candidates` that is no longer used.
///
/// Returns the number of `CONSTANT_Utf8` entries cleared.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a candidate is not a `CONSTANT_String`.
pub fn scrub(class: &mut ClassFile, candidates: &[u16]) -> Result<usize> {
    let candidates: BTreeSet<u16> = candidates.iter().copied().collect();
    let unused = {
        let usage = Usage::of(class, &candidates);
        let mut unused = Vec::new();
        for &string in &candidates {
            if usage.is_live(string) {
                continue;
            }
            let text = match class.constant_pool.get(string)? {
                Constant::String(text) => *text,
                other => {
                    return Err(malformed_error!(
                        "Constant {} is a {:?}, not a string",
                        string,
                        other.tag()
                    ))
                }
            };
            if usage.names.contains(&text) || usage.mentioned(text) {
                continue;
            }
            if !class.constant_pool.utf8(text)?.is_empty() && !unused.contains(&text) {
                unused.push(text);
            }
        }
        unused
    };

    for &text in &unused {
        class.constant_pool.clear_utf8(text)?;
    }
    Ok(unused.len())
}

/// References to pool entries from everywhere except the unused candidate strings.
struct Usage<'a> {
    /// Strings still pushed by an `ldc`
    loaded: HashSet<u16>,
    /// Utf8 entries referenced by structure
    names: HashSet<u16>,
    /// Undecoded attribute bodies
    raw: Vec<&'a [u8]>,
}

impl<'a> Usage<'a> {
    fn of(class: &'a ClassFile, candidates: &BTreeSet<u16>) -> Self {
        let mut usage = Usage {
            loaded: HashSet::new(),
            names: HashSet::new(),
            raw: Vec::new(),
        };

        for field in &class.fields {
            usage.names.insert(field.name_index);
            usage.names.insert(field.descriptor_index);
            usage.attributes(&field.attributes);
        }
        for method in &class.methods {
            usage.names.insert(method.name_index);
            usage.names.insert(method.descriptor_index);
            usage.attributes(&method.attributes);
        }
        usage.attributes(&class.attributes);

        for (index, constant) in class.constant_pool.iter() {
            match constant {
                Constant::String(text) => {
                    if !candidates.contains(&index) || usage.is_live(index) {
                        usage.names.insert(*text);
                    }
                }
                Constant::Class(name)
                | Constant::MethodType(name)
                | Constant::Module(name)
                | Constant::Package(name) => {
                    usage.names.insert(*name);
                }
                Constant::NameAndType { name, descriptor } => {
                    usage.names.insert(*name);
                    usage.names.insert(*descriptor);
                }
                _ => {}
            }
        }
        usage
    }

    fn is_live(&self, string: u16) -> bool {
        self.loaded.contains(&string) || self.mentioned(string)
    }

    fn attributes(&mut self, attributes: &'a [Attribute]) {
        for attribute in attributes {
            self.names.insert(attribute.name_index());
            match attribute {
                Attribute::Raw { info, .. } => self.raw.push(info),
                Attribute::Code { code, .. } => self.code(code),
            }
        }
    }

    fn code(&mut self, code: &'a Code) {
        for insn in &code.instructions {
            if let Instruction::Ldc(index) = insn {
                self.loaded.insert(*index);
            }
        }
        for attribute in &code.attributes {
            match attribute {
                CodeAttribute::LineNumbers { name_index, .. }
                | CodeAttribute::StackMap { name_index, .. } => {
                    self.names.insert(*name_index);
                }
                CodeAttribute::LocalVariables {
                    name_index,
                    entries,
                } => {
                    self.names.insert(*name_index);
                    for entry in entries {
                        self.names.insert(entry.name);
                        self.names.insert(entry.descriptor);
                    }
                }
                CodeAttribute::Raw {
                    name_index, info, ..
                } => {
                    self.names.insert(*name_index);
                    self.raw.push(info);
                }
            }
        }
    }

    fn mentioned(&self, index: u16) -> bool {
        let needle = index.to_be_bytes();
        self.raw
            .iter()
            .any(|info| info.windows(2).any(|window| window == needle))
    }
}
