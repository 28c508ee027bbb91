//! JVM bytecode decoding, layout and analysis.
//!
//! This module turns the `code` array of a method into a list of [`Instruction`] values
//! with symbolic [`Label`] positions and back again.
//!
//! # Key Components
//!
//! - [`decode_stream`] - Decodes a code array into instructions paired with offsets
//! - [`encode`] - Assigns offsets, widens long jumps and writes the code array
//! - [`max_stack`] - Computes the operand stack depth of an instruction list
//! - [`opcodes`] - Opcode byte constants and mnemonics
//!
//! # Examples
//!
//! ```rust
//! use veil::assembly::{decode_stream, encode, Instruction, opcodes};
//!
//! let code = [opcodes::ICONST_1, opcodes::IRETURN];
//! let instructions: Vec<Instruction> =
//!     decode_stream(&code)?.into_iter().map(|(_, insn)| insn).collect();
//!
//! assert_eq!(encode(&instructions)?.bytes, code);
//! # Ok::<(), veil::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
pub mod opcodes;
mod stack;

pub use decoder::{decode_instruction, decode_stream};
pub use encoder::{encode, Encoded, MAX_CODE_LENGTH};
pub use instruction::{Instruction, Label};
pub use stack::max_stack;
