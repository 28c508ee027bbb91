//! Attribute containers for classes, fields and methods.
//!
//! Attributes the rewriter never needs to look inside are carried as raw bytes. The `Code`
//! attribute of a method is decoded into a [`crate::classfile::Code`] but keeps its
//! original encoding until the first mutable access, so untouched methods are written
//! back byte for byte.

use crate::{
    classfile::{Code, ConstantPool},
    file::{io::write_be, parser::Parser},
    Error::LimitExceeded,
    Result,
};

/// Name of the method body attribute.
pub const CODE: &str = "Code";
/// Name of the field initializer attribute.
pub const CONSTANT_VALUE: &str = "ConstantValue";

/// A single `attribute_info` structure.
#[derive(Clone, Debug)]
pub enum Attribute {
    /// Any attribute kept as opaque bytes
    Raw {
        /// Index of the attribute name in the constant pool
        name_index: u16,
        /// Attribute body
        info: Vec<u8>,
    },
    /// A decoded method body
    Code {
        /// Index of the `Code` name in the constant pool
        name_index: u16,
        /// Decoded body
        code: Box<Code>,
        /// Original body, dropped once the code is modified
        original: Option<Vec<u8>>,
    },
}

impl Attribute {
    /// Parses an `attributes_count` prefixed attribute list.
    ///
    /// `Code` attributes are decoded when `decode_code` is set; otherwise every attribute is
    /// kept raw.
    ///
    /// # Errors
    /// Returns an error if the data is truncated or a `Code` attribute is malformed.
    pub fn parse_list(
        parser: &mut Parser,
        pool: &ConstantPool,
        decode_code: bool,
    ) -> Result<Vec<Attribute>> {
        let count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(usize::from(count));

        for _ in 0..count {
            let name_index = parser.read_be::<u16>()?;
            let length = parser.read_be::<u32>()?;
            let info = parser.read_bytes(length as usize)?;

            if decode_code && pool.utf8(name_index)? == CODE.as_bytes() {
                attributes.push(Attribute::Code {
                    name_index,
                    code: Box::new(Code::parse(info, pool)?),
                    original: Some(info.to_vec()),
                });
            } else {
                attributes.push(Attribute::Raw {
                    name_index,
                    info: info.to_vec(),
                });
            }
        }

        Ok(attributes)
    }

    /// Serializes an `attributes_count` prefixed attribute list.
    ///
    /// # Errors
    /// Returns an error if a modified `Code` attribute can no longer be encoded.
    pub fn write_list(
        attributes: &[Attribute],
        out: &mut Vec<u8>,
        pool: &ConstantPool,
    ) -> Result<()> {
        let count = u16::try_from(attributes.len())
            .map_err(|_| LimitExceeded(format!("{} attributes", attributes.len())))?;
        write_be(out, count);
        for attribute in attributes {
            attribute.write(out, pool)?;
        }
        Ok(())
    }

    /// Returns the constant pool index of the attribute name.
    #[must_use]
    pub fn name_index(&self) -> u16 {
        match self {
            Attribute::Raw { name_index, .. } | Attribute::Code { name_index, .. } => *name_index,
        }
    }

    /// Returns `true` if this attribute's name equals `name`.
    #[must_use]
    pub fn is_named(&self, name: &str, pool: &ConstantPool) -> bool {
        pool.utf8(self.name_index())
            .is_ok_and(|bytes| bytes == name.as_bytes())
    }

    fn write(&self, out: &mut Vec<u8>, pool: &ConstantPool) -> Result<()> {
        let encoded;
        let (name_index, info) = match self {
            Attribute::Raw { name_index, info } => (*name_index, info.as_slice()),
            Attribute::Code {
                name_index,
                original: Some(original),
                ..
            } => (*name_index, original.as_slice()),
            Attribute::Code {
                name_index, code, ..
            } => {
                encoded = code.to_bytes(pool)?;
                (*name_index, encoded.as_slice())
            }
        };

        let length = u32::try_from(info.len())
            .map_err(|_| LimitExceeded(format!("attribute of {} bytes", info.len())))?;
        write_be(out, name_index);
        write_be(out, length);
        out.extend_from_slice(info);
        Ok(())
    }
}
