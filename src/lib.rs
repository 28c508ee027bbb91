// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # veil
//!
//! A build-time string literal obfuscator for JVM class files.
//!
//! `veil` rewrites compiled classes so that their string constants no longer appear as
//! plain text in the constant pool. Every eligible literal load is replaced by an encoded
//! payload followed by a static call into a generated decoder class, and `static final
//! String` constants are moved into the static initializer. The decoder class is produced
//! by the same crate for the same key, so the rewritten program behaves exactly as before.
//!
//! ## Features
//!
//! - **Class file model** - Parse, edit and re-serialize class files with a mutable
//!   constant pool and symbolic, label based bytecode
//! - **Two codecs** - A character shift cipher and a `long[]` split encoding
//! - **Incremental builds** - Directory and archive inputs with change sets, fingerprinted
//!   configuration and parallel processing
//! - **Safe by construction** - Methods that would exceed a class file limit are left
//!   untouched instead of producing unloadable output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use veil::prelude::*;
//!
//! let config = Config::default().with_key(7).with_include(["com.example"]);
//! let report = TransformPass::new(config.clone()).run(
//!     &[TransformInput::directory("build/classes", "build/veil")],
//!     false,
//! )?;
//! generate_decoder_unit("build/veil".as_ref(), &config)?;
//! println!("Rewrote {} literals", report.literals);
//! # Ok::<(), veil::Error>(())
//! ```
//!
//! ### Working on a single class
//!
//! ```rust,no_run
//! use veil::{obfuscation::{locate, Codec, Patcher, Variant}, ClassFile};
//!
//! let mut class = ClassFile::from_path("Sample.class".as_ref())?;
//! let sites = locate(&class)?;
//! let stats = Patcher::new(Codec::new(7, Variant::ShiftCipher)).patch(&mut class, &sites)?;
//! println!("{} literals, {} fields", stats.literals, stats.fields);
//! std::fs::write("Sample.class", class.to_bytes()?)?;
//! # Ok::<(), veil::Error>(())
//! ```

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use veil::prelude::*;
///
/// let class = ClassFile::from_path("Sample.class".as_ref())?;
/// println!("{} literal sites", locate(&class)?.len());
/// # Ok::<(), veil::Error>(())
/// ```
pub mod prelude;

/// Raw input access.
///
/// A [`File`] owns the bytes of one binary unit, either memory-mapped from disk or held
/// in memory, and [`Parser`] is a bounds-checked big-endian cursor over them.
pub mod file;

/// JVM bytecode instructions.
///
/// Decoding and encoding between raw `Code` bytes and [`assembly::Instruction`] lists,
/// where branch targets are symbolic labels. Encoding resolves labels, chooses between
/// short and wide forms and pads switch tables.
///
/// # Examples
///
/// ```rust
/// use veil::assembly::{decode_stream, opcodes};
///
/// let instructions = decode_stream(&[opcodes::ICONST_1, opcodes::IRETURN])?;
/// assert_eq!(instructions.len(), 2);
/// # Ok::<(), veil::Error>(())
/// ```
pub mod assembly;

/// The class file model.
///
/// [`ClassFile`] parses and serializes complete class files. The constant pool interns new
/// entries and supports rollback; method bodies are decoded lazily and written back
/// byte-identical unless they were edited.
pub mod classfile;

/// Literal discovery, encoding and rewriting.
///
/// See [`obfuscation::locate`], [`obfuscation::Codec`] and [`obfuscation::Patcher`].
pub mod obfuscation;

/// Incremental build driver.
///
/// See [`TransformPass`].
pub mod build;

/// `veil` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `veil` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use veil::{ClassFile, Error};
///
/// match ClassFile::from_path("Sample.class".as_ref()) {
///     Ok(class) => println!("Loaded {}", class.name()?),
///     Err(Error::NotSupported) => println!("Not a class file"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// # Ok::<(), veil::Error>(())
/// ```
pub use error::{EntryFailure, Error};

pub use build::{
    generate_decoder_unit, ChangeSetEntry, Config, Fingerprint, InputKind, Status,
    TransformInput, TransformPass, TransformReport,
};
pub use classfile::ClassFile;
pub use file::{parser::Parser, File};
pub use obfuscation::{Codec, Filter, Variant, DECODER_CLASS};
