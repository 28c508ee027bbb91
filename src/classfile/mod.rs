//! Binary class file model.
//!
//! [`ClassFile`] is an owned, mutable representation of one JVM class file. Parsing keeps
//! everything the rewriter does not touch as raw bytes, so a class that is parsed and
//! written back without modification is reproduced exactly. Method bodies are decoded into
//! [`Code`] with label-based instruction lists.
//!
//! # Architecture
//!
//! - [`constant`] - The constant pool, with interning `add_*` helpers
//! - [`member`] - Fields and methods
//! - [`attribute`] - Attribute containers
//! - [`code`] - Method bodies and the tables that point into them
//! - [`stackmap`] - `StackMapTable` frames
//! - [`mutf8`] - Modified UTF-8
//! - [`descriptor`] - Descriptor slot accounting
//!
//! # Examples
//!
//! ```rust
//! use veil::classfile::{ClassAccessFlags, ClassFile};
//!
//! let class = ClassFile::new(
//!     "com/example/Sample",
//!     "java/lang/Object",
//!     ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     52,
//! )?;
//! let bytes = class.to_bytes()?;
//!
//! let parsed = ClassFile::from_bytes(&bytes)?;
//! assert_eq!(parsed.name()?, "com/example/Sample");
//! assert_eq!(parsed.to_bytes()?, bytes);
//! # Ok::<(), veil::Error>(())
//! ```

pub mod attribute;
pub mod code;
pub mod constant;
pub mod descriptor;
pub mod flags;
pub mod member;
pub mod mutf8;
pub mod stackmap;

pub use attribute::Attribute;
pub use code::{Code, CodeAttribute, ExceptionHandler, LineNumber, LocalVariable};
pub use constant::{Constant, ConstantPool, ConstantTag};
pub use flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use member::{Field, Method};
pub use stackmap::{FrameKind, StackMapFrame, VerificationType};

use std::path::Path;

use crate::{
    file::{io::write_be, parser::Parser, File, CLASS_MAGIC},
    Error::LimitExceeded,
    Result,
};

/// Name of the static initializer.
pub const CLINIT: &str = "<clinit>";
/// Descriptor of the static initializer.
pub const CLINIT_DESCRIPTOR: &str = "()V";
/// First class file version that requires `StackMapTable` frames.
pub const FRAMES_REQUIRED_SINCE: u16 = 50;

/// An owned class file.
#[derive(Clone, Debug)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version (52 = Java 8)
    pub major_version: u16,
    /// The constant pool
    pub constant_pool: ConstantPool,
    /// Class modifiers
    pub access: ClassAccessFlags,
    /// `CONSTANT_Class` of this class
    pub this_class: u16,
    /// `CONSTANT_Class` of the superclass, 0 for `java/lang/Object` and modules
    pub super_class: u16,
    /// `CONSTANT_Class` entries of the implemented interfaces
    pub interfaces: Vec<u16>,
    /// Declared fields in declaration order
    pub fields: Vec<Field>,
    /// Declared methods in declaration order
    pub methods: Vec<Method>,
    /// Class-level attributes, kept raw
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Creates an empty class.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the names cannot be encoded.
    pub fn new(
        name: &str,
        super_name: &str,
        access: ClassAccessFlags,
        major_version: u16,
    ) -> Result<Self> {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.add_class(name)?;
        let super_class = constant_pool.add_class(super_name)?;

        Ok(ClassFile {
            minor_version: 0,
            major_version,
            constant_pool,
            access,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        })
    }

    /// Parses a class file from memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the data is not a valid class file and
    /// [`crate::Error::OutOfBounds`] if it is truncated.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);

        let magic = parser.read_be::<u32>()?;
        if magic != CLASS_MAGIC {
            return Err(malformed_error!("Invalid class file magic 0x{:08X}", magic));
        }

        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        if major_version < 45 {
            return Err(malformed_error!(
                "Unsupported class file version {}.{}",
                major_version,
                minor_version
            ));
        }

        let constant_pool = ConstantPool::parse(&mut parser)?;
        let access = ClassAccessFlags::from_bits_retain(parser.read_be::<u16>()?);
        let this_class = parser.read_be::<u16>()?;
        let super_class = parser.read_be::<u16>()?;

        let interface_count = parser.read_be::<u16>()?;
        let interfaces = (0..interface_count)
            .map(|_| parser.read_be::<u16>())
            .collect::<Result<Vec<_>>>()?;

        let field_count = parser.read_be::<u16>()?;
        let fields = (0..field_count)
            .map(|_| Field::parse(&mut parser, &constant_pool))
            .collect::<Result<Vec<_>>>()?;

        let method_count = parser.read_be::<u16>()?;
        let methods = (0..method_count)
            .map(|_| Method::parse(&mut parser, &constant_pool))
            .collect::<Result<Vec<_>>>()?;

        let attributes = Attribute::parse_list(&mut parser, &constant_pool, false)?;

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after the class file",
                parser.remaining()
            ));
        }

        let class = ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        class.name()?;
        Ok(class)
    }

    /// Parses a class file from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise see
    /// [`ClassFile::from_bytes`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::from_file(path)?;
        Self::from_bytes(file.data())
    }

    /// Serializes the class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if a modified method or a table no longer
    /// fits the class file limits.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        write_be(&mut out, CLASS_MAGIC);
        write_be(&mut out, self.minor_version);
        write_be(&mut out, self.major_version);
        self.constant_pool.write(&mut out);
        write_be(&mut out, self.access.bits());
        write_be(&mut out, self.this_class);
        write_be(&mut out, self.super_class);

        write_be(&mut out, count(self.interfaces.len(), "interfaces")?);
        for interface in &self.interfaces {
            write_be(&mut out, *interface);
        }

        write_be(&mut out, count(self.fields.len(), "fields")?);
        for field in &self.fields {
            field.write(&mut out, &self.constant_pool)?;
        }

        write_be(&mut out, count(self.methods.len(), "methods")?);
        for method in &self.methods {
            method.write(&mut out, &self.constant_pool)?;
        }

        Attribute::write_list(&self.attributes, &mut out, &self.constant_pool)?;
        Ok(out)
    }

    /// Returns the internal name of this class (e.g. `com/example/Sample`).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `this_class` is not a `CONSTANT_Class`.
    pub fn name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Returns `true` if the class file version requires stack map frames.
    #[must_use]
    pub fn requires_frames(&self) -> bool {
        self.major_version >= FRAMES_REQUIRED_SINCE
    }

    /// Returns the index of the method with the given name and descriptor.
    #[must_use]
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        let pool = &self.constant_pool;
        self.methods.iter().position(|method| {
            pool.utf8(method.name_index).is_ok_and(|n| n == name.as_bytes())
                && pool
                    .utf8(method.descriptor_index)
                    .is_ok_and(|d| d == descriptor.as_bytes())
        })
    }

    /// Appends a field, returning its index in [`ClassFile::fields`].
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the constant pool is full.
    pub fn add_field(
        &mut self,
        access: FieldAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<usize> {
        let name_index = self.constant_pool.add_utf8(name)?;
        let descriptor_index = self.constant_pool.add_utf8(descriptor)?;
        self.fields.push(Field {
            access,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        Ok(self.fields.len() - 1)
    }

    /// Appends a method, returning its index in [`ClassFile::methods`].
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the constant pool is full.
    pub fn add_method(
        &mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<Code>,
    ) -> Result<usize> {
        let name_index = self.constant_pool.add_utf8(name)?;
        let descriptor_index = self.constant_pool.add_utf8(descriptor)?;
        let mut method = Method {
            access,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        };
        if let Some(code) = code {
            method.set_code(&mut self.constant_pool, code)?;
        }
        self.methods.push(method);
        Ok(self.methods.len() - 1)
    }
}

fn count(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| LimitExceeded(format!("{len} {what}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{opcodes::*, Instruction},
        test::fixtures::sample_class,
        Error,
    };

    #[test]
    fn unmodified_roundtrip_is_exact() {
        let bytes = sample_class().to_bytes().unwrap();
        let parsed = ClassFile::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
        assert_eq!(parsed.name().unwrap(), "com/example/Sample");
    }

    #[test]
    fn members_are_found() {
        let class = sample_class();
        let index = class
            .find_method("getToken", "()Ljava/lang/String;")
            .unwrap();
        assert!(class.methods[index].code().is_some());
        assert!(class.find_method("getToken", "()V").is_none());

        let token = &class.fields[0];
        assert_eq!(token.name(&class.constant_pool).unwrap(), "TOKEN");
        let value = token.constant_value(&class.constant_pool).unwrap().unwrap();
        assert_eq!(
            String::from_utf16(&class.constant_pool.string_units(value).unwrap()).unwrap(),
            "abc"
        );
    }

    #[test]
    fn modified_method_is_relaid() {
        let mut class = sample_class();
        let index = class
            .find_method("getToken", "()Ljava/lang/String;")
            .unwrap();
        let code = class.methods[index].code_mut().unwrap();
        code.instructions.insert(0, Instruction::Simple(NOP));

        let parsed = ClassFile::from_bytes(&class.to_bytes().unwrap()).unwrap();
        let code = parsed.methods[index].code().unwrap();
        assert_eq!(code.instructions[0], Instruction::Simple(NOP));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ClassFile::from_bytes(&[0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 52]),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(
            ClassFile::from_bytes(&[0xCA, 0xFE, 0xBA, 0xBE, 0, 0]),
            Err(Error::OutOfBounds)
        ));

        let mut bytes = sample_class().to_bytes().unwrap();
        bytes.push(0);
        assert!(ClassFile::from_bytes(&bytes).is_err());
    }
}
