//! # veil Prelude
//!
//! The types needed to run a transform pass or to work on a single class file.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all veil operations
pub use crate::{EntryFailure, Error};

/// The result type used throughout veil
pub use crate::Result;

/// Low-level file access
pub use crate::{File, Parser};

// ================================================================================================
// Class Files and Bytecode
// ================================================================================================

/// Class file model
pub use crate::classfile::{ClassFile, Code, Constant, ConstantPool, Field, Method};

/// Symbolic instructions
pub use crate::assembly::{Instruction, Label};

// ================================================================================================
// Obfuscation
// ================================================================================================

/// Literal location, encoding and rewriting
pub use crate::obfuscation::{
    locate, synthesize, Codec, EncodedLiteral, Filter, PatchStats, Patcher, Sites, Variant,
    DECODER_CLASS,
};

// ================================================================================================
// Build
// ================================================================================================

/// Transform pass and its inputs
pub use crate::build::{
    generate_decoder_unit, ChangeSetEntry, Config, Fingerprint, InputKind, Status,
    TransformInput, TransformPass, TransformReport,
};
