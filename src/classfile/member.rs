//! Field and method declarations.

use crate::{
    classfile::{
        attribute::{CODE, CONSTANT_VALUE},
        Attribute, Code, ConstantPool, FieldAccessFlags, MethodAccessFlags,
    },
    file::{io::write_be, parser::Parser},
    Result,
};

/// A `field_info` structure.
#[derive(Clone, Debug)]
pub struct Field {
    /// Access modifiers
    pub access: FieldAccessFlags,
    /// Index of the field name
    pub name_index: u16,
    /// Index of the field descriptor
    pub descriptor_index: u16,
    /// Attributes, all kept raw
    pub attributes: Vec<Attribute>,
}

impl Field {
    pub(crate) fn parse(parser: &mut Parser, pool: &ConstantPool) -> Result<Self> {
        Ok(Field {
            access: FieldAccessFlags::from_bits_retain(parser.read_be::<u16>()?),
            name_index: parser.read_be::<u16>()?,
            descriptor_index: parser.read_be::<u16>()?,
            attributes: Attribute::parse_list(parser, pool, false)?,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>, pool: &ConstantPool) -> Result<()> {
        write_be(out, self.access.bits());
        write_be(out, self.name_index);
        write_be(out, self.descriptor_index);
        Attribute::write_list(&self.attributes, out, pool)
    }

    /// Returns the field name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name index is not a `CONSTANT_Utf8`.
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8_str(self.name_index)
    }

    /// Returns the field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor index is not a `CONSTANT_Utf8`.
    pub fn descriptor(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8_str(self.descriptor_index)
    }

    /// Returns the constant pool index held by the `ConstantValue` attribute, if any.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the attribute body is not a single index.
    pub fn constant_value(&self, pool: &ConstantPool) -> Result<Option<u16>> {
        for attribute in &self.attributes {
            if let Attribute::Raw { info, .. } = attribute {
                if attribute.is_named(CONSTANT_VALUE, pool) {
                    let bytes: [u8; 2] = info.as_slice().try_into().map_err(|_| {
                        malformed_error!("ConstantValue attribute of {} bytes", info.len())
                    })?;
                    return Ok(Some(u16::from_be_bytes(bytes)));
                }
            }
        }
        Ok(None)
    }

    /// Attaches a `ConstantValue` attribute referencing `value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the attribute name cannot be added to the
    /// pool.
    pub fn set_constant_value(&mut self, pool: &mut ConstantPool, value: u16) -> Result<()> {
        self.remove_constant_value(pool);
        let name_index = pool.add_utf8(CONSTANT_VALUE)?;
        self.attributes.push(Attribute::Raw {
            name_index,
            info: value.to_be_bytes().to_vec(),
        });
        Ok(())
    }

    /// Removes the `ConstantValue` attribute, returning whether one was present.
    pub fn remove_constant_value(&mut self, pool: &ConstantPool) -> bool {
        let before = self.attributes.len();
        self.attributes
            .retain(|attribute| !attribute.is_named(CONSTANT_VALUE, pool));
        self.attributes.len() != before
    }
}

/// A `method_info` structure.
#[derive(Clone, Debug)]
pub struct Method {
    /// Access modifiers
    pub access: MethodAccessFlags,
    /// Index of the method name
    pub name_index: u16,
    /// Index of the method descriptor
    pub descriptor_index: u16,
    /// Attributes, with `Code` decoded
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub(crate) fn parse(parser: &mut Parser, pool: &ConstantPool) -> Result<Self> {
        Ok(Method {
            access: MethodAccessFlags::from_bits_retain(parser.read_be::<u16>()?),
            name_index: parser.read_be::<u16>()?,
            descriptor_index: parser.read_be::<u16>()?,
            attributes: Attribute::parse_list(parser, pool, true)?,
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>, pool: &ConstantPool) -> Result<()> {
        write_be(out, self.access.bits());
        write_be(out, self.name_index);
        write_be(out, self.descriptor_index);
        Attribute::write_list(&self.attributes, out, pool)
    }

    /// Returns the method name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name index is not a `CONSTANT_Utf8`.
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8_str(self.name_index)
    }

    /// Returns the method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor index is not a `CONSTANT_Utf8`.
    pub fn descriptor(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8_str(self.descriptor_index)
    }

    /// Returns the method body, `None` for abstract and native methods.
    #[must_use]
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|attribute| match attribute {
            Attribute::Code { code, .. } => Some(code.as_ref()),
            Attribute::Raw { .. } => None,
        })
    }

    /// Returns the method body for modification.
    ///
    /// The original encoding is discarded, so the body is laid out again on output.
    pub fn code_mut(&mut self) -> Option<&mut Code> {
        self.attributes
            .iter_mut()
            .find_map(|attribute| match attribute {
                Attribute::Code { code, original, .. } => {
                    *original = None;
                    Some(code.as_mut())
                }
                Attribute::Raw { .. } => None,
            })
    }

    /// Replaces the method body, adding a `Code` attribute if there was none.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the attribute name cannot be added to the
    /// pool.
    pub fn set_code(&mut self, pool: &mut ConstantPool, code: Code) -> Result<()> {
        if let Some(existing) = self.code_mut() {
            *existing = code;
            return Ok(());
        }

        let name_index = pool.add_utf8(CODE)?;
        self.attributes.push(Attribute::Code {
            name_index,
            code: Box::new(code),
            original: None,
        });
        Ok(())
    }
}
