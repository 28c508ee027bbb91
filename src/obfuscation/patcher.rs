//! Rewriting of located literal sites.
//!
//! Each literal load is replaced by a load of its encoded form followed by
//! `invokestatic veil/runtime/Veil.decode`. Constant fields lose their `ConstantValue`
//! attribute and are assigned at the start of `<clinit>` instead, which is created when
//! the class has none.
//!
//! Work is transactional per method. A method whose rewritten body no longer fits the
//! class file limits keeps its original code, and every constant added for it is rolled
//! back out of the pool. Once all sites are applied, the text of literals that lost their
//! last use is blanked in the pool.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::{
    assembly::{opcodes::*, Instruction},
    classfile::{
        attribute::CODE, descriptor::STRING, ClassFile, Code, ConstantPool, MethodAccessFlags,
        CLINIT, CLINIT_DESCRIPTOR,
    },
    obfuscation::{
        decoder::{decode_descriptor, DECODER_CLASS, DECODE_METHOD},
        scrub::scrub,
        Codec, EncodedLiteral, FieldConst, InstructionSite, Sites,
    },
    Error, Result,
};

/// Counters for one patched class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchStats {
    /// Literal loads rewritten
    pub literals: usize,
    /// Constant fields moved into `<clinit>`
    pub fields: usize,
    /// Literals or fields the codec could not carry
    pub skipped: usize,
    /// Methods left untouched because the result exceeded a limit
    pub skipped_methods: usize,
    /// Pool entries whose plain text was cleared
    pub scrubbed: usize,
}

impl PatchStats {
    /// Returns `true` if the class was changed.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.literals > 0 || self.fields > 0
    }
}

/// Applies a [`Codec`] to the sites of a class.
#[derive(Clone, Copy, Debug)]
pub struct Patcher {
    codec: Codec,
}

impl Patcher {
    /// Creates a patcher encoding with `codec`.
    #[must_use]
    pub fn new(codec: Codec) -> Self {
        Patcher { codec }
    }

    /// Returns the codec.
    #[must_use]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Rewrites `sites` in `class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a site refers to invalid constants or a body
    /// cannot be laid out for a reason other than a class file limit.
    pub fn patch(&self, class: &mut ClassFile, sites: &Sites) -> Result<PatchStats> {
        let mut stats = PatchStats::default();

        let mut by_method: BTreeMap<usize, Vec<&InstructionSite>> = BTreeMap::new();
        for site in &sites.instructions {
            by_method.entry(site.method).or_default().push(site);
        }

        let mut replaced = Vec::new();
        for (method, mut method_sites) in by_method {
            method_sites.sort_by_key(|site| site.index);
            self.patch_method(class, method, &method_sites, &mut stats, &mut replaced)?;
        }

        if !sites.fields.is_empty() {
            self.patch_fields(class, &sites.fields, &mut stats, &mut replaced)?;
        }

        if !replaced.is_empty() {
            stats.scrubbed = scrub(class, &replaced)?;
        }
        Ok(stats)
    }

    fn patch_method(
        &self,
        class: &mut ClassFile,
        method: usize,
        sites: &[&InstructionSite],
        stats: &mut PatchStats,
        replaced: &mut Vec<u16>,
    ) -> Result<()> {
        let Some(original) = class.methods.get(method).and_then(|m| m.code()) else {
            return Err(malformed_error!("Literal site in method {} without code", method));
        };
        let mut code = original.clone();

        let checkpoint = class.constant_pool.checkpoint();
        let mut rewritten = Vec::new();
        let mut skipped = 0;
        let attempt = (|| -> Result<()> {
            let pool = &mut class.constant_pool;
            // Back to front so earlier indices stay valid
            for site in sites.iter().rev() {
                if code.instructions.get(site.index) != Some(&Instruction::Ldc(site.value)) {
                    return Err(malformed_error!(
                        "No string load at instruction {} of method {}",
                        site.index,
                        method
                    ));
                }

                let plain = pool.string_units(site.value)?;
                let Some(encoded) = self.codec.encode(&plain) else {
                    debug!(
                        "Literal of {} units at instruction {} does not fit the {} encoding",
                        plain.len(),
                        site.index,
                        self.codec.variant()
                    );
                    skipped += 1;
                    continue;
                };

                let mut replacement = load(pool, &encoded)?;
                replacement.push(self.decode_call(pool)?);
                code.instructions
                    .splice(site.index..=site.index, replacement);
                rewritten.push(site.value);
            }
            if !rewritten.is_empty() {
                code.to_bytes(pool)?;
            }
            Ok(())
        })();

        stats.skipped += skipped;
        match attempt {
            Ok(()) if !rewritten.is_empty() => {
                if let Some(body) = class.methods[method].code_mut() {
                    *body = code;
                }
                stats.literals += rewritten.len();
                replaced.extend(rewritten);
                Ok(())
            }
            Ok(()) => Ok(()),
            Err(Error::LimitExceeded(reason)) => {
                class.constant_pool.rollback(checkpoint);
                warn!(
                    "Leaving {} unpatched: {}",
                    describe(class, method),
                    reason
                );
                stats.skipped_methods += 1;
                Ok(())
            }
            Err(error) => {
                class.constant_pool.rollback(checkpoint);
                Err(error)
            }
        }
    }

    fn patch_fields(
        &self,
        class: &mut ClassFile,
        fields: &[FieldConst],
        stats: &mut PatchStats,
        replaced: &mut Vec<u16>,
    ) -> Result<()> {
        let existing = class.find_method(CLINIT, CLINIT_DESCRIPTOR);
        let owner = class.name()?;

        let checkpoint = class.constant_pool.checkpoint();
        let mut moved = Vec::new();
        let mut skipped = 0;
        let attempt = (|| -> Result<Option<Code>> {
            let pool = &mut class.constant_pool;
            let mut prefix = Vec::new();
            for site in fields {
                let field = &class.fields[site.field];
                let plain = pool.string_units(site.value)?;
                let Some(encoded) = self.codec.encode(&plain) else {
                    warn!(
                        "Keeping constant value of field {}: {} units do not fit the {} encoding",
                        field.name(pool)?,
                        plain.len(),
                        self.codec.variant()
                    );
                    skipped += 1;
                    continue;
                };

                let target = pool.add_field_ref(&owner, &field.name(pool)?, STRING)?;
                prefix.extend(load(pool, &encoded)?);
                prefix.push(self.decode_call(pool)?);
                prefix.push(Instruction::Field {
                    opcode: PUTSTATIC,
                    index: target,
                });
                moved.push(site);
            }
            if moved.is_empty() {
                return Ok(None);
            }

            let mut code = match existing.and_then(|index| class.methods[index].code()) {
                Some(code) => code.clone(),
                None => {
                    pool.add_utf8(CLINIT)?;
                    pool.add_utf8(CLINIT_DESCRIPTOR)?;
                    pool.add_utf8(CODE)?;
                    Code::new(0, Vec::new())
                }
            };
            code.instructions.splice(0..0, prefix);
            if falls_through(&code) {
                code.instructions.push(Instruction::Simple(RETURN));
            }
            code.to_bytes(pool)?;
            Ok(Some(code))
        })();

        stats.skipped += skipped;
        match attempt {
            Ok(Some(code)) => {
                match existing {
                    Some(index) => class.methods[index].set_code(&mut class.constant_pool, code)?,
                    None => {
                        class.add_method(
                            MethodAccessFlags::STATIC,
                            CLINIT,
                            CLINIT_DESCRIPTOR,
                            Some(code),
                        )?;
                    }
                }
                for site in &moved {
                    class.fields[site.field].remove_constant_value(&class.constant_pool);
                    replaced.push(site.value);
                }
                stats.fields += moved.len();
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(Error::LimitExceeded(reason)) => {
                class.constant_pool.rollback(checkpoint);
                warn!(
                    "Keeping constant values of {} fields in {}: {}",
                    moved.len(),
                    owner,
                    reason
                );
                stats.skipped_methods += 1;
                Ok(())
            }
            Err(error) => {
                class.constant_pool.rollback(checkpoint);
                Err(error)
            }
        }
    }

    fn decode_call(&self, pool: &mut ConstantPool) -> Result<Instruction> {
        let index = pool.add_method_ref(
            DECODER_CLASS,
            DECODE_METHOD,
            decode_descriptor(self.codec.variant()),
        )?;
        Ok(Instruction::Invoke {
            opcode: INVOKESTATIC,
            index,
        })
    }
}

/// Instructions leaving the encoded literal on the stack.
fn load(pool: &mut ConstantPool, encoded: &EncodedLiteral) -> Result<Vec<Instruction>> {
    match encoded {
        EncodedLiteral::Text(units) => Ok(vec![Instruction::Ldc(pool.add_string_units(units)?)]),
        EncodedLiteral::Array(values) => {
            let mut out = Vec::with_capacity(2 + values.len() * 4);
            out.push(int(pool, values.len())?);
            out.push(Instruction::NewArray(T_LONG));
            for (index, value) in values.iter().enumerate() {
                out.push(Instruction::Simple(DUP));
                out.push(int(pool, index)?);
                out.push(match value {
                    0 => Instruction::Simple(LCONST_0),
                    1 => Instruction::Simple(LCONST_1),
                    _ => Instruction::Ldc2(pool.add_long(*value)?),
                });
                out.push(Instruction::Simple(LASTORE));
            }
            Ok(out)
        }
    }
}

fn int(pool: &mut ConstantPool, value: usize) -> Result<Instruction> {
    let value = i32::try_from(value)
        .map_err(|_| Error::LimitExceeded(format!("array of {value} elements")))?;
    match Instruction::push_int(value) {
        Some(push) => Ok(push),
        None => Ok(Instruction::Ldc(pool.add_integer(value)?)),
    }
}

/// Returns `true` if control can run off the end of `code`.
fn falls_through(code: &Code) -> bool {
    code.instructions
        .iter()
        .rev()
        .find(|insn| !insn.is_label())
        .map_or(true, |last| !last.is_terminal())
}

fn describe(class: &ClassFile, method: usize) -> String {
    let pool = &class.constant_pool;
    let method = &class.methods[method];
    format!(
        "{}.{}{}",
        class.name().unwrap_or_default(),
        method.name(pool).unwrap_or_default(),
        method.descriptor(pool).unwrap_or_default()
    )
}
