//! Input abstraction and low-level binary reading for class files.
//!
//! This module abstracts over where the bytes of a class file come from, and
//! provides the bounds-checked primitives every parser in the crate builds upon.
//!
//! # Key Components
//!
//! ## Core Types
//! - [`crate::file::File`] - An immutable view of one input's bytes
//! - [`crate::file::Backend`] - Trait for different data sources (disk files, memory buffers)
//!
//! ## Parsing Infrastructure
//! - [`crate::file::parser::Parser`] - Cursor-based big-endian reader
//! - [`crate::file::io`] - Endian-aware read and write helpers
//!
//! ## Backend Implementations
//! - `Physical` - Memory-mapped file backend for loose class files
//! - `Memory` - In-memory buffer backend for archive entries
//!
//! # Examples
//!
//! ```rust
//! use veil::File;
//!
//! let file = File::from_mem(vec![0xCA, 0xFE, 0xBA, 0xBE])?;
//! assert!(file.has_class_magic());
//! # Ok::<(), veil::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! [`File`] is `Send + Sync`; its contents never change after construction.

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{
    Error::{Empty, OutOfBounds},
    Result,
};
use memory::Memory;
use physical::Physical;

/// Magic number every class file starts with.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// A source of class file bytes.
///
/// Implementations only expose their full content; range access and length are derived
/// from it. All implementations must be thread-safe.
pub trait Backend: Send + Sync {
    /// Get the full data buffer.
    fn data(&self) -> &[u8];

    /// Get a slice of the data at the given offset and length.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range does not fit the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data().get(offset..end))
            .ok_or(OutOfBounds)
    }

    /// Get the length of the data.
    fn len(&self) -> usize {
        self.data().len()
    }
}

/// An immutable input buffer holding one binary unit (or any other file payload).
///
/// Loose class files are memory-mapped, archive entries are held in memory. Either
/// way the rest of the pipeline only ever sees `&[u8]`.
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Loads a file from disk using memory mapping.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped, and
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Wraps an owned buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
        })
    }

    /// Returns the number of bytes in this file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if this file has no content. Never true for a loaded file.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// Returns the complete content.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns a sub-range of the content.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Returns `true` if the content starts with the class file magic `0xCAFEBABE`.
    #[must_use]
    pub fn has_class_magic(&self) -> bool {
        io::read_be::<u32>(self.data()).is_ok_and(|magic| magic == CLASS_MAGIC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn magic_detection() {
        let file = File::from_mem(vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00]).unwrap();
        assert!(file.has_class_magic());
        assert_eq!(file.len(), 5);

        let file = File::from_mem(b"PK\x03\x04".to_vec()).unwrap();
        assert!(!file.has_class_magic());

        let file = File::from_mem(vec![0xCA, 0xFE]).unwrap();
        assert!(!file.has_class_magic());
    }

    #[test]
    fn physical_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.class");
        std::fs::write(&path, [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34]).unwrap();

        let file = File::from_file(&path).unwrap();
        assert_eq!(file.len(), 8);
        assert!(file.has_class_magic());
        assert_eq!(file.data_slice(4, 4).unwrap(), &[0x00, 0x00, 0x00, 0x34]);
        assert!(file.data_slice(6, 4).is_err());
    }
}
