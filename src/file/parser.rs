//! Cursor-based binary reader for class file structures.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a bounds-checked cursor over
//! a byte slice. Every structure in a class file (constant pool, members, attributes,
//! bytecode) is read through it.
//!
//! # Examples
//!
//! ```rust
//! use veil::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
//! assert_eq!(parser.read_be::<u16>()?, 0);
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! assert!(!parser.has_more_data());
//! # Ok::<(), veil::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Error::OutOfBounds,
    Result,
};

/// A cursor over binary class file data.
///
/// The parser maintains an internal position and validates every read against the
/// remaining data, so truncated or malformed input surfaces as
/// [`crate::Error::OutOfBounds`] instead of a panic.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there are unread bytes left.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Moves the cursor to an absolute position.
    ///
    /// Seeking to exactly the end of the data is allowed.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies beyond the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Moves the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the new position lies beyond the data.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let Some(pos) = self.position.checked_add(step) else {
            return Err(OutOfBounds);
        };
        self.seek(pos)
    }

    /// Returns the current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the complete underlying data.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Peeks at the current byte without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Skips padding so the position becomes a multiple of `alignment`.
    ///
    /// Used for the 0-3 padding bytes of `tableswitch` and `lookupswitch`, which are
    /// aligned relative to the start of the code array.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding runs past the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        if self.position + padding > self.data.len() {
            return Err(OutOfBounds);
        }
        self.position += padding;
        Ok(())
    }

    /// Reads a big-endian value and advances past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit the remaining data.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Reads `length` raw bytes and advances past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let Some(end) = self.position.checked_add(length) else {
            return Err(OutOfBounds);
        };
        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Reads a `u2` length followed by that many raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the data is truncated.
    pub fn read_u2_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let length = self.read_be::<u16>()?;
        self.read_bytes(usize::from(length))
    }
}
