//! String literal obfuscation.
//!
//! This module holds the per-class half of the pipeline: locating literal sites,
//! encoding them with a keyed [`Codec`], patching the bytecode to decode them at runtime,
//! and synthesizing the decoder class that the patched code calls.
//!
//! # Architecture
//!
//! - [`codec`] - The reversible keyed encodings
//! - [`decoder`] - Synthesis of `veil/runtime/Veil`
//! - [`locator`] - Discovery of `ldc` string loads and constant string fields
//! - [`patcher`] - Transactional per-method rewriting
//! - [`scrub`] - Blanking of literal text that lost its last use
//! - [`filter`] - Include and exclude prefixes on class names
//!
//! # Examples
//!
//! ```rust,no_run
//! use veil::{
//!     obfuscation::{locate, Codec, Patcher, Variant},
//!     ClassFile,
//! };
//!
//! let mut class = ClassFile::from_path(std::path::Path::new("Sample.class"))?;
//! let sites = locate(&class)?;
//! let stats = Patcher::new(Codec::new(7, Variant::ShiftCipher)).patch(&mut class, &sites)?;
//! println!("{} literals, {} fields", stats.literals, stats.fields);
//! let bytes = class.to_bytes()?;
//! # Ok::<(), veil::Error>(())
//! ```

pub mod codec;
pub mod decoder;
pub mod filter;
pub mod locator;
pub mod patcher;
pub mod scrub;

pub use codec::{Codec, EncodedLiteral, Variant, MAX_ARRAY_LENGTH};
pub use decoder::{decode_descriptor, synthesize, DECODER_CLASS, DECODE_METHOD};
pub use filter::Filter;
pub use locator::{locate, FieldConst, InstructionSite, Sites};
pub use patcher::{PatchStats, Patcher};
pub use scrub::scrub;
