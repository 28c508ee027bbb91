//! The class file constant pool.
//!
//! [`ConstantPool`] stores entries in their on-disk slot layout: index 0 is unusable and
//! every `CONSTANT_Long` / `CONSTANT_Double` occupies two slots, the second of which is
//! held as [`Constant::Unusable`]. Entries added through the `add_*` methods are interned,
//! so repeated requests for the same constant return the same index.
//!
//! # Examples
//!
//! ```rust
//! use veil::classfile::ConstantPool;
//!
//! let mut pool = ConstantPool::new();
//! let text = pool.add_string_units(&"hello".encode_utf16().collect::<Vec<_>>())?;
//! assert_eq!(pool.add_string("hello")?, text);
//! assert_eq!(pool.string_units(text)?, "hello".encode_utf16().collect::<Vec<_>>());
//! # Ok::<(), veil::Error>(())
//! ```

use std::collections::HashMap;

use strum::{Display, FromRepr};

use crate::{
    classfile::mutf8,
    file::{io::write_be, parser::Parser},
    Error::LimitExceeded,
    Result,
};

/// Tag byte of a constant pool entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    FieldRef = 9,
    MethodRef = 10,
    InterfaceMethodRef = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

/// A single constant pool entry.
///
/// Floating point values are kept as raw bits so entries can be hashed and compared
/// exactly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Constant {
    /// Slot 0 and the upper slot of 8-byte constants
    Unusable,
    /// Raw modified UTF-8 bytes
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl Constant {
    /// Returns the tag of this entry, `None` for [`Constant::Unusable`].
    #[must_use]
    pub fn tag(&self) -> Option<ConstantTag> {
        Some(match self {
            Constant::Unusable => return None,
            Constant::Utf8(_) => ConstantTag::Utf8,
            Constant::Integer(_) => ConstantTag::Integer,
            Constant::Float(_) => ConstantTag::Float,
            Constant::Long(_) => ConstantTag::Long,
            Constant::Double(_) => ConstantTag::Double,
            Constant::Class(_) => ConstantTag::Class,
            Constant::String(_) => ConstantTag::String,
            Constant::FieldRef { .. } => ConstantTag::FieldRef,
            Constant::MethodRef { .. } => ConstantTag::MethodRef,
            Constant::InterfaceMethodRef { .. } => ConstantTag::InterfaceMethodRef,
            Constant::NameAndType { .. } => ConstantTag::NameAndType,
            Constant::MethodHandle { .. } => ConstantTag::MethodHandle,
            Constant::MethodType(_) => ConstantTag::MethodType,
            Constant::Dynamic { .. } => ConstantTag::Dynamic,
            Constant::InvokeDynamic { .. } => ConstantTag::InvokeDynamic,
            Constant::Module(_) => ConstantTag::Module,
            Constant::Package(_) => ConstantTag::Package,
        })
    }

    /// Returns `true` for `CONSTANT_Long` and `CONSTANT_Double`.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn parse(parser: &mut Parser) -> Result<Constant> {
        let tag = parser.read_be::<u8>()?;
        let Some(tag) = ConstantTag::from_repr(tag) else {
            return Err(malformed_error!(
                "Unknown constant pool tag {} at offset {}",
                tag,
                parser.pos() - 1
            ));
        };

        Ok(match tag {
            ConstantTag::Utf8 => Constant::Utf8(parser.read_u2_prefixed_bytes()?.to_vec()),
            ConstantTag::Integer => Constant::Integer(parser.read_be::<i32>()?),
            ConstantTag::Float => Constant::Float(parser.read_be::<u32>()?),
            ConstantTag::Long => Constant::Long(parser.read_be::<i64>()?),
            ConstantTag::Double => Constant::Double(parser.read_be::<u64>()?),
            ConstantTag::Class => Constant::Class(parser.read_be::<u16>()?),
            ConstantTag::String => Constant::String(parser.read_be::<u16>()?),
            ConstantTag::FieldRef => Constant::FieldRef {
                class: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::MethodRef => Constant::MethodRef {
                class: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::InterfaceMethodRef => Constant::InterfaceMethodRef {
                class: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::NameAndType => Constant::NameAndType {
                name: parser.read_be::<u16>()?,
                descriptor: parser.read_be::<u16>()?,
            },
            ConstantTag::MethodHandle => Constant::MethodHandle {
                kind: parser.read_be::<u8>()?,
                reference: parser.read_be::<u16>()?,
            },
            ConstantTag::MethodType => Constant::MethodType(parser.read_be::<u16>()?),
            ConstantTag::Dynamic => Constant::Dynamic {
                bootstrap: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::InvokeDynamic => Constant::InvokeDynamic {
                bootstrap: parser.read_be::<u16>()?,
                name_and_type: parser.read_be::<u16>()?,
            },
            ConstantTag::Module => Constant::Module(parser.read_be::<u16>()?),
            ConstantTag::Package => Constant::Package(parser.read_be::<u16>()?),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        let Some(tag) = self.tag() else {
            return;
        };
        write_be(out, tag as u8);

        match self {
            Constant::Unusable => {}
            Constant::Utf8(bytes) => {
                #[allow(clippy::cast_possible_truncation)]
                write_be(out, bytes.len() as u16);
                out.extend_from_slice(bytes);
            }
            Constant::Integer(value) => write_be(out, *value),
            Constant::Float(bits) => write_be(out, *bits),
            Constant::Long(value) => write_be(out, *value),
            Constant::Double(bits) => write_be(out, *bits),
            Constant::Class(index)
            | Constant::String(index)
            | Constant::MethodType(index)
            | Constant::Module(index)
            | Constant::Package(index) => write_be(out, *index),
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                write_be(out, *class);
                write_be(out, *name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                write_be(out, *name);
                write_be(out, *descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                write_be(out, *kind);
                write_be(out, *reference);
            }
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                write_be(out, *bootstrap);
                write_be(out, *name_and_type);
            }
        }
    }
}

/// The constant pool of one class file.
#[derive(Clone, Debug)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Creates an empty pool holding only the reserved slot 0.
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Parses `constant_pool_count` followed by the pool entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags or dangling references and
    /// [`crate::Error::OutOfBounds`] if the data is truncated.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("constant_pool_count must be at least 1"));
        }

        let mut pool = ConstantPool::new();
        while pool.entries.len() < usize::from(count) {
            let constant = Constant::parse(parser)?;
            let wide = constant.is_wide();
            #[allow(clippy::cast_possible_truncation)]
            let index = pool.entries.len() as u16;
            pool.lookup.entry(constant.clone()).or_insert(index);
            pool.entries.push(constant);
            if wide {
                if pool.entries.len() >= usize::from(count) {
                    return Err(malformed_error!(
                        "8-byte constant at index {} overruns the constant pool",
                        index
                    ));
                }
                pool.entries.push(Constant::Unusable);
            }
        }

        pool.validate()?;
        Ok(pool)
    }

    /// Serializes `constant_pool_count` followed by every entry.
    pub fn write(&self, out: &mut Vec<u8>) {
        #[allow(clippy::cast_possible_truncation)]
        write_be(out, self.entries.len() as u16);
        for entry in &self.entries {
            entry.write(out);
        }
    }

    /// Returns the `constant_pool_count` value, one past the highest valid index.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over `(index, constant)` for every usable entry.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, constant)| !matches!(constant, Constant::Unusable))
            .map(|(index, constant)| (u16::try_from(index).unwrap_or(u16::MAX), constant))
    }

    /// Returns the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, out of range indices and the upper
    /// slot of 8-byte constants.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {} (count {})",
                index,
                self.entries.len()
            )),
            Some(constant) => Ok(constant),
        }
    }

    /// Returns the raw bytes of the `CONSTANT_Utf8` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is not a `CONSTANT_Utf8`.
    pub fn utf8(&self, index: u16) -> Result<&[u8]> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            other => Err(malformed_error!(
                "Expected Utf8 at index {}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Returns the `CONSTANT_Utf8` at `index` as a Rust string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is not a valid `CONSTANT_Utf8`.
    pub fn utf8_str(&self, index: u16) -> Result<String> {
        mutf8::to_string(self.utf8(index)?)
    }

    /// Returns the internal name referenced by the `CONSTANT_Class` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is not a `CONSTANT_Class`.
    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8_str(*name),
            other => Err(malformed_error!(
                "Expected Class at index {}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Returns the UTF-16 value of the `CONSTANT_String` at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is not a `CONSTANT_String`.
    pub fn string_units(&self, index: u16) -> Result<Vec<u16>> {
        match self.get(index)? {
            Constant::String(utf8) => mutf8::decode(self.utf8(*utf8)?),
            other => Err(malformed_error!(
                "Expected String at index {}, found {:?}",
                index,
                other.tag()
            )),
        }
    }

    /// Returns the descriptor of the member or call site referenced at `index`.
    ///
    /// Accepts field, method and interface method references as well as `invokedynamic`
    /// and dynamic constant entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for any other kind of entry.
    pub fn reference_descriptor(&self, index: u16) -> Result<String> {
        let name_and_type = match self.get(index)? {
            Constant::FieldRef { name_and_type, .. }
            | Constant::MethodRef { name_and_type, .. }
            | Constant::InterfaceMethodRef { name_and_type, .. }
            | Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => *name_and_type,
            other => {
                return Err(malformed_error!(
                    "Expected a member reference at index {}, found {:?}",
                    index,
                    other.tag()
                ))
            }
        };

        match self.get(name_and_type)? {
            Constant::NameAndType { descriptor, .. } => self.utf8_str(*descriptor),
            other => Err(malformed_error!(
                "Expected NameAndType at index {}, found {:?}",
                name_and_type,
                other.tag()
            )),
        }
    }

    /// Returns a marker for the current end of the pool.
    ///
    /// Together with [`ConstantPool::rollback`] this lets a caller undo speculative
    /// additions.
    #[must_use]
    pub fn checkpoint(&self) -> usize {
        self.entries.len()
    }

    /// Removes every entry added after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: usize) {
        if checkpoint >= self.entries.len() {
            return;
        }
        for removed in self.entries.drain(checkpoint..) {
            if let Some(&index) = self.lookup.get(&removed) {
                if usize::from(index) >= checkpoint {
                    self.lookup.remove(&removed);
                }
            }
        }
    }

    /// Overwrites the `CONSTANT_Utf8` at `index` with the empty string.
    ///
    /// The slot keeps its position, so every other index stays valid. The caller must
    /// ensure nothing still expects the old text.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` is not a `CONSTANT_Utf8`.
    pub fn clear_utf8(&mut self, index: u16) -> Result<()> {
        let slot = self
            .entries
            .get_mut(usize::from(index))
            .filter(|entry| matches!(entry, Constant::Utf8(_)))
            .ok_or_else(|| malformed_error!("Constant {} is not a Utf8 entry", index))?;
        let old = std::mem::replace(slot, Constant::Utf8(Vec::new()));
        if self.lookup.get(&old) == Some(&index) {
            self.lookup.remove(&old);
        }
        Ok(())
    }

    /// Interns `constant`, returning its index.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool has no room for the entry.
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&constant) {
            return Ok(index);
        }

        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > usize::from(u16::MAX) {
            return Err(LimitExceeded(format!(
                "constant pool is full ({} entries)",
                self.entries.len()
            )));
        }

        #[allow(clippy::cast_possible_truncation)]
        let index = self.entries.len() as u16;
        self.lookup.insert(constant.clone(), index);
        self.entries.push(constant);
        if slots == 2 {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    /// Interns a `CONSTANT_Utf8` holding `value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the encoded value exceeds 65535 bytes or
    /// the pool is full.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.add_utf8_bytes(mutf8::from_str(value))
    }

    fn add_utf8_bytes(&mut self, bytes: Vec<u8>) -> Result<u16> {
        if bytes.len() > mutf8::MAX_UTF8_LENGTH {
            return Err(LimitExceeded(format!(
                "Utf8 constant of {} bytes exceeds 65535",
                bytes.len()
            )));
        }
        self.add(Constant::Utf8(bytes))
    }

    /// Interns a `CONSTANT_String` with the given text.
    ///
    /// # Errors
    /// See [`ConstantPool::add_utf8`].
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.add_utf8(value)?;
        self.add(Constant::String(utf8))
    }

    /// Interns a `CONSTANT_String` with the given UTF-16 units.
    ///
    /// # Errors
    /// See [`ConstantPool::add_utf8`].
    pub fn add_string_units(&mut self, units: &[u16]) -> Result<u16> {
        let utf8 = self.add_utf8_bytes(mutf8::encode(units))?;
        self.add(Constant::String(utf8))
    }

    /// Interns a `CONSTANT_Integer`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.add(Constant::Integer(value))
    }

    /// Interns a `CONSTANT_Long`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.add(Constant::Long(value))
    }

    /// Interns a `CONSTANT_Class` for the internal name `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let utf8 = self.add_utf8(name)?;
        self.add(Constant::Class(utf8))
    }

    /// Interns a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType { name, descriptor })
    }

    /// Interns a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Interns a `CONSTANT_Methodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Interns a `CONSTANT_InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LimitExceeded`] if the pool is full.
    pub fn add_interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InterfaceMethodRef {
            class,
            name_and_type,
        })
    }

    /// Checks that every reference inside the pool points at an entry of the right kind.
    fn validate(&self) -> Result<()> {
        let expect = |index: u16, tag: ConstantTag, from: usize| -> Result<()> {
            match self.get(index)?.tag() {
                Some(found) if found == tag => Ok(()),
                found => Err(malformed_error!(
                    "Constant {} references index {} as {}, found {:?}",
                    from,
                    index,
                    tag,
                    found
                )),
            }
        };

        for (from, constant) in self.entries.iter().enumerate() {
            match constant {
                Constant::Class(name)
                | Constant::String(name)
                | Constant::MethodType(name)
                | Constant::Module(name)
                | Constant::Package(name) => expect(*name, ConstantTag::Utf8, from)?,
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
                | Constant::MethodRef {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    expect(*class, ConstantTag::Class, from)?;
                    expect(*name_and_type, ConstantTag::NameAndType, from)?;
                }
                Constant::NameAndType { name, descriptor } => {
                    expect(*name, ConstantTag::Utf8, from)?;
                    expect(*descriptor, ConstantTag::Utf8, from)?;
                }
                Constant::Dynamic { name_and_type, .. }
                | Constant::InvokeDynamic { name_and_type, .. } => {
                    expect(*name_and_type, ConstantTag::NameAndType, from)?;
                }
                Constant::MethodHandle { reference, .. } => {
                    self.get(*reference)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
