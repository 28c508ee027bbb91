//! Field and method descriptor slot accounting.
//!
//! Only the operand stack footprint of a descriptor matters for rewriting: `long` and
//! `double` take two slots, `void` none, everything else one.

use crate::Result;

/// Descriptor of `java.lang.String`.
pub const STRING: &str = "Ljava/lang/String;";

/// Returns the stack slots taken by a value of the given field descriptor.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for an invalid descriptor.
pub fn field_slots(descriptor: &str) -> Result<u16> {
    let bytes = descriptor.as_bytes();
    let (slots, end) = parse_type(bytes, 0, false)?;
    if end != bytes.len() {
        return Err(malformed_error!("Invalid field descriptor '{}'", descriptor));
    }
    Ok(slots)
}

/// Returns the argument and return slot counts of a method descriptor.
///
/// The receiver of instance methods is not included.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for an invalid descriptor.
pub fn method_slots(descriptor: &str) -> Result<(u16, u16)> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(malformed_error!("Invalid method descriptor '{}'", descriptor));
    }

    let mut pos = 1;
    let mut arguments = 0_u16;
    loop {
        match bytes.get(pos) {
            Some(b')') => break,
            Some(_) => {
                let (slots, next) = parse_type(bytes, pos, false)?;
                arguments = arguments.saturating_add(slots);
                pos = next;
            }
            None => return Err(malformed_error!("Invalid method descriptor '{}'", descriptor)),
        }
    }

    let (ret, end) = parse_type(bytes, pos + 1, true)?;
    if end != bytes.len() {
        return Err(malformed_error!("Invalid method descriptor '{}'", descriptor));
    }
    Ok((arguments, ret))
}

fn parse_type(bytes: &[u8], pos: usize, allow_void: bool) -> Result<(u16, usize)> {
    match bytes.get(pos) {
        Some(b'J' | b'D') => Ok((2, pos + 1)),
        Some(b'B' | b'C' | b'F' | b'I' | b'S' | b'Z') => Ok((1, pos + 1)),
        Some(b'V') if allow_void => Ok((0, pos + 1)),
        Some(b'L') => match bytes[pos..].iter().position(|&b| b == b';') {
            Some(len) if len > 1 => Ok((1, pos + len + 1)),
            _ => Err(malformed_error!("Unterminated class type at {}", pos)),
        },
        Some(b'[') => {
            let mut elem = pos;
            while bytes.get(elem) == Some(&b'[') {
                elem += 1;
            }
            let (_, end) = parse_type(bytes, elem, false)?;
            Ok((1, end))
        }
        _ => Err(malformed_error!("Invalid descriptor character at {}", pos)),
    }
}
