//! Big-endian reading and writing helpers for class file structures.
//!
//! The class file format stores every multi-byte quantity in big-endian order. This
//! module provides the bounds-checked primitives used by [`crate::file::parser::Parser`]
//! for reading, and by the class file and bytecode writers for output.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait implemented by all primitive integer types
//! - [`crate::file::io::read_be`] / [`crate::file::io::read_be_at`] - Reading with offset tracking
//! - [`crate::file::io::write_be`] - Appending a value to an output buffer
//! - [`crate::file::io::write_be_at`] - Overwriting a value at a known offset (length back-patching)
//!
//! # Examples
//!
//! ```rust,ignore
//! use veil::file::io::{read_be_at, write_be};
//!
//! let mut out = Vec::new();
//! write_be(&mut out, 0xCAFE_BABE_u32);
//! write_be(&mut out, 52_u16);
//!
//! let mut offset = 0;
//! assert_eq!(read_be_at::<u32>(&out, &mut offset)?, 0xCAFE_BABE);
//! assert_eq!(read_be_at::<u16>(&out, &mut offset)?, 52);
//! assert_eq!(offset, 6);
//! # Ok::<(), veil::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All reading functions return [`crate::Error::OutOfBounds`] if there are insufficient
//! bytes in the buffer. Appending never fails.

use crate::{Error::OutOfBounds, Result};

/// Trait for type-specific, big-endian binary conversions.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array for that type (e.g., `[u8; 4]` for `u32`).
pub trait ClassIO: Sized + Copy {
    /// Fixed-size byte representation of this type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Convert from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Convert to big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
}

/// Reads a big-endian value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Reads a big-endian value at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit the remaining data.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_be_bytes(read))
}

/// Appends `value` in big-endian order.
pub fn write_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrites the bytes at `offset` with `value` in big-endian order and advances `offset`.
///
/// Used to back-patch length fields whose value is only known after the body was written.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(value.to_be_bytes().as_ref());
    *offset = end;

    Ok(())
}
