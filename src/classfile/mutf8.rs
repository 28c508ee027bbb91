//! Modified UTF-8 as used by `CONSTANT_Utf8` entries.
//!
//! The class file format stores strings as UTF-16 code units serialized with a variant of
//! UTF-8: the NUL character uses the two-byte form, and supplementary characters are stored
//! as two separately encoded surrogates. Working on `u16` units keeps unpaired surrogates
//! intact, which a Rust `String` could not represent.

use crate::Result;

/// Longest byte sequence a single `CONSTANT_Utf8` entry can hold.
pub const MAX_UTF8_LENGTH: usize = u16::MAX as usize;

/// Decodes modified UTF-8 bytes into UTF-16 code units.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on a raw NUL byte, a 4-byte lead byte or a
/// truncated sequence.
pub fn decode(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        let lead = bytes[pos];
        let continuation = |at: usize| -> Result<u16> {
            match bytes.get(at) {
                Some(&byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
                _ => Err(malformed_error!(
                    "Invalid modified UTF-8 continuation at byte {}",
                    at
                )),
            }
        };

        match lead {
            0x01..=0x7F => {
                units.push(u16::from(lead));
                pos += 1;
            }
            0xC0..=0xDF => {
                units.push((u16::from(lead & 0x1F) << 6) | continuation(pos + 1)?);
                pos += 2;
            }
            0xE0..=0xEF => {
                units.push(
                    (u16::from(lead & 0x0F) << 12)
                        | (continuation(pos + 1)? << 6)
                        | continuation(pos + 2)?,
                );
                pos += 3;
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid modified UTF-8 byte 0x{:02X} at {}",
                    lead,
                    pos
                ))
            }
        }
    }

    Ok(units)
}

/// Encodes UTF-16 code units as modified UTF-8.
#[must_use]
pub fn encode(units: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(units));
    for &unit in units {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Returns the number of bytes [`encode`] would produce.
#[must_use]
pub fn encoded_len(units: &[u16]) -> usize {
    units
        .iter()
        .map(|&unit| match unit {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Decodes modified UTF-8 into a Rust string, replacing unpaired surrogates.
///
/// # Errors
/// See [`decode`].
pub fn to_string(bytes: &[u8]) -> Result<String> {
    Ok(String::from_utf16_lossy(&decode(bytes)?))
}

/// Encodes a Rust string as modified UTF-8.
#[must_use]
pub fn from_str(value: &str) -> Vec<u8> {
    encode(&value.encode_utf16().collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_identity() {
        assert_eq!(from_str("java/lang/String"), b"java/lang/String");
        assert_eq!(to_string(b"decode").unwrap(), "decode");
    }

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode(&[0]), [0xC0, 0x80]);
        assert_eq!(decode(&[0xC0, 0x80]).unwrap(), [0]);
        assert!(decode(&[0x00]).is_err());
    }

    #[test]
    fn supplementary_as_surrogates() {
        let units: Vec<u16> = "\u{1F600}".encode_utf16().collect();
        let bytes = encode(&units);
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], 0xED);
        assert_eq!(decode(&bytes).unwrap(), units);
    }

    #[test]
    fn unpaired_surrogate_survives() {
        let units = [0xD800, u16::from(b'a')];
        assert_eq!(decode(&encode(&units)).unwrap(), units);
        assert_eq!(encoded_len(&units), 4);
    }

    #[test]
    fn truncated_sequence() {
        assert!(decode(&[0xE4, 0xB8]).is_err());
        assert!(decode(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
    }
}
