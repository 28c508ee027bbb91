//! Discovery of rewritable string literals.

use crate::{
    assembly::Instruction,
    classfile::{descriptor::STRING, ClassFile, Constant},
    obfuscation::decoder::is_decoder_class,
    Result,
};

/// An `ldc`/`ldc_w` of a string constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionSite {
    /// Index into [`ClassFile::methods`]
    pub method: usize,
    /// Index into the method's instruction list
    pub index: usize,
    /// The `CONSTANT_String` being loaded
    pub value: u16,
}

/// A `static final String` field initialized through `ConstantValue`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldConst {
    /// Index into [`ClassFile::fields`]
    pub field: usize,
    /// The `CONSTANT_String` held by the attribute
    pub value: u16,
}

/// Everything the patcher may rewrite in one class, in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sites {
    /// Literal loads, ordered by method then position
    pub instructions: Vec<InstructionSite>,
    /// Constant fields, ordered by declaration
    pub fields: Vec<FieldConst>,
}

impl Sites {
    /// Returns `true` if nothing was located.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && self.fields.is_empty()
    }

    /// Returns the total number of sites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len() + self.fields.len()
    }
}

/// Collects the literal sites of `class`.
///
/// Empty literals are not collected since they carry nothing worth hiding. The decoder
/// class yields no sites.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a string constant or field declaration refers to
/// invalid pool entries.
pub fn locate(class: &ClassFile) -> Result<Sites> {
    let mut sites = Sites::default();
    if is_decoder_class(&class.name()?) {
        return Ok(sites);
    }

    let pool = &class.constant_pool;
    for (method, declaration) in class.methods.iter().enumerate() {
        let Some(code) = declaration.code() else {
            continue;
        };
        for (index, insn) in code.instructions.iter().enumerate() {
            let Instruction::Ldc(value) = *insn else {
                continue;
            };
            if !matches!(pool.get(value)?, Constant::String(_)) {
                continue;
            }
            if pool.string_units(value)?.is_empty() {
                continue;
            }
            sites.instructions.push(InstructionSite {
                method,
                index,
                value,
            });
        }
    }

    for (field, declaration) in class.fields.iter().enumerate() {
        if !declaration.access.is_plain_constant() || declaration.descriptor(pool)? != STRING {
            continue;
        }
        let Some(value) = declaration.constant_value(pool)? else {
            continue;
        };
        if !matches!(pool.get(value)?, Constant::String(_)) {
            continue;
        }
        if pool.string_units(value)?.is_empty() {
            continue;
        }
        sites.fields.push(FieldConst { field, value });
    }

    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{ClassAccessFlags, FieldAccessFlags},
        test::{
            fixtures::{sample_class, with_clinit},
            string_at,
        },
    };

    #[test]
    fn sample_sites_in_order() {
        let class = sample_class();
        let sites = locate(&class).unwrap();

        let literals: Vec<String> = sites
            .instructions
            .iter()
            .map(|site| string_at(&class, site.value))
            .collect();
        assert_eq!(literals, ["secret-token", "yes", "no"]);

        assert_eq!(sites.fields.len(), 1);
        assert_eq!(sites.fields[0].field, 0);
        assert_eq!(string_at(&class, sites.fields[0].value), "abc");
        assert_eq!(sites.len(), 4);
    }

    #[test]
    fn site_positions_point_at_loads() {
        let class = sample_class();
        for site in locate(&class).unwrap().instructions {
            let code = class.methods[site.method].code().unwrap();
            assert_eq!(code.instructions[site.index], Instruction::Ldc(site.value));
        }
    }

    #[test]
    fn clinit_literals_are_sites() {
        let class = with_clinit(sample_class());
        let sites = locate(&class).unwrap();
        assert_eq!(
            string_at(&class, sites.instructions.last().unwrap().value),
            "init"
        );
    }

    #[test]
    fn field_eligibility() {
        let mut class = ClassFile::new(
            "com/example/Fields",
            "java/lang/Object",
            ClassAccessFlags::PUBLIC,
            52,
        )
        .unwrap();
        let value = class.constant_pool.add_string("value").unwrap();
        let empty = class.constant_pool.add_string("").unwrap();

        let candidates = [
            (FieldAccessFlags::STATIC | FieldAccessFlags::FINAL, STRING, value, true),
            (
                FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                STRING,
                value,
                true,
            ),
            (FieldAccessFlags::FINAL, STRING, value, false),
            (FieldAccessFlags::STATIC, STRING, value, false),
            (
                FieldAccessFlags::STATIC | FieldAccessFlags::FINAL | FieldAccessFlags::VOLATILE,
                STRING,
                value,
                false,
            ),
            (
                FieldAccessFlags::PUBLIC
                    | FieldAccessFlags::PRIVATE
                    | FieldAccessFlags::STATIC
                    | FieldAccessFlags::FINAL,
                STRING,
                value,
                false,
            ),
            (FieldAccessFlags::STATIC | FieldAccessFlags::FINAL, STRING, empty, false),
            (
                FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
                "Ljava/lang/Object;",
                value,
                false,
            ),
        ];

        let mut expected = Vec::new();
        for (position, (access, descriptor, constant, eligible)) in candidates.iter().enumerate() {
            let field = class
                .add_field(*access, &format!("f{position}"), descriptor)
                .unwrap();
            class.fields[field]
                .set_constant_value(&mut class.constant_pool, *constant)
                .unwrap();
            if *eligible {
                expected.push(field);
            }
        }

        let fields: Vec<usize> = locate(&class)
            .unwrap()
            .fields
            .iter()
            .map(|site| site.field)
            .collect();
        assert_eq!(fields, expected);
    }

    #[test]
    fn decoder_class_is_ignored() {
        let mut class = sample_class();
        class.this_class = class
            .constant_pool
            .add_class(crate::obfuscation::DECODER_CLASS)
            .unwrap();
        assert!(locate(&class).unwrap().is_empty());
    }
}
