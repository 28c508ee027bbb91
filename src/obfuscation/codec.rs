//! The keyed string literal codec.
//!
//! Two interchangeable encodings are available, chosen once per build through
//! [`Variant`]:
//!
//! - [`Variant::ShiftCipher`] XORs every UTF-16 code unit with the low 16 bits of the
//!   key. The result is again a string and is stored as a `CONSTANT_String`.
//! - [`Variant::ArraySplit`] turns every code unit into a `long` carrying the unit
//!   (XORed with key and position) in its low word and the position in its high word.
//!   The result is materialized as a `long[]` at the call site.
//!
//! Both are deterministic, so the same literal always encodes to the same value. Encoding
//! returns `None` for inputs the chosen variant cannot carry; callers treat that as a
//! soft skip and leave the literal alone.
//!
//! # Examples
//!
//! ```rust
//! use veil::obfuscation::{Codec, EncodedLiteral, Variant};
//!
//! let codec = Codec::new(7, Variant::ShiftCipher);
//! let plain: Vec<u16> = "abc".encode_utf16().collect();
//!
//! let encoded = codec.encode(&plain).unwrap();
//! assert_eq!(encoded, EncodedLiteral::Text(vec![0x66, 0x65, 0x64]));
//! assert_eq!(codec.decode(&encoded)?, plain);
//! # Ok::<(), veil::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{classfile::mutf8, Result};

/// Longest literal the array variant accepts.
pub const MAX_ARRAY_LENGTH: usize = u16::MAX as usize;

/// Literal encoding policy.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Variant {
    /// Per-unit XOR, encoded literal stays a string
    #[default]
    ShiftCipher,
    /// Position-tagged `long[]`
    ArraySplit,
}

/// The encoded form of one literal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodedLiteral {
    /// UTF-16 units of the replacement string
    Text(Vec<u16>),
    /// Elements of the replacement `long[]`
    Array(Vec<i64>),
}

impl EncodedLiteral {
    /// Returns the number of encoded elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            EncodedLiteral::Text(units) => units.len(),
            EncodedLiteral::Array(values) => values.len(),
        }
    }

    /// Returns `true` if nothing was encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A keyed codec for one build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
    key: i32,
    variant: Variant,
}

impl Codec {
    /// Creates a codec for `key` and `variant`.
    #[must_use]
    pub fn new(key: i32, variant: Variant) -> Self {
        Codec { key, variant }
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> i32 {
        self.key
    }

    /// Returns the variant.
    #[must_use]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn key_unit(&self) -> u16 {
        self.key as u16
    }

    /// Encodes the UTF-16 units of a literal.
    ///
    /// Returns `None` if the variant cannot carry the input: an empty or longer than 65535
    /// unit literal for [`Variant::ArraySplit`], or a [`Variant::ShiftCipher`] result whose
    /// modified UTF-8 form exceeds the 65535 byte constant limit.
    #[must_use]
    pub fn encode(&self, plain: &[u16]) -> Option<EncodedLiteral> {
        match self.variant {
            Variant::ShiftCipher => {
                let key = self.key_unit();
                let units: Vec<u16> = plain.iter().map(|unit| unit ^ key).collect();
                (mutf8::encoded_len(&units) <= mutf8::MAX_UTF8_LENGTH)
                    .then_some(EncodedLiteral::Text(units))
            }
            Variant::ArraySplit => {
                if plain.is_empty() || plain.len() > MAX_ARRAY_LENGTH {
                    return None;
                }
                #[allow(clippy::cast_sign_loss)]
                let key = self.key as u32;
                let values = plain
                    .iter()
                    .enumerate()
                    .map(|(index, unit)| {
                        #[allow(clippy::cast_possible_truncation)]
                        let position = index as u32;
                        let low = (u32::from(*unit) ^ key ^ position) & 0xFFFF;
                        (i64::from(position) << 32) | i64::from(low)
                    })
                    .collect();
                Some(EncodedLiteral::Array(values))
            }
        }
    }

    /// Reverses [`Codec::encode`], mirroring the generated runtime decoder.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the literal does not match this codec's
    /// variant or an array element carries an out of range position.
    pub fn decode(&self, encoded: &EncodedLiteral) -> Result<Vec<u16>> {
        match (self.variant, encoded) {
            (Variant::ShiftCipher, EncodedLiteral::Text(units)) => {
                let key = self.key_unit();
                Ok(units.iter().map(|unit| unit ^ key).collect())
            }
            (Variant::ArraySplit, EncodedLiteral::Array(values)) => {
                let mut plain = vec![0_u16; values.len()];
                for value in values {
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let position = ((*value as u64) >> 32) as i32;
                    #[allow(clippy::cast_possible_truncation)]
                    let unit = ((*value as i32) ^ self.key ^ position) as u16;
                    let slot = usize::try_from(position)
                        .ok()
                        .and_then(|index| plain.get_mut(index))
                        .ok_or_else(|| {
                            malformed_error!("Encoded element carries position {}", position)
                        })?;
                    *slot = unit;
                }
                Ok(plain)
            }
            (variant, _) => Err(malformed_error!(
                "Encoded literal does not match the {} variant",
                variant
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(value: &str) -> Vec<u16> {
        value.encode_utf16().collect()
    }

    #[test]
    fn shift_cipher_roundtrip() {
        for key in [0, 7, 2021, -1, i32::MAX, 0x0001_0000] {
            let codec = Codec::new(key, Variant::ShiftCipher);
            for text in ["secret-token", "", "ünïcødé", "\u{1F600} emoji", "\0nul"] {
                let plain = units(text);
                let encoded = codec.encode(&plain).unwrap();
                assert_eq!(encoded.len(), plain.len());
                assert_eq!(codec.decode(&encoded).unwrap(), plain);
            }
        }
    }

    #[test]
    fn shift_cipher_uses_low_key_bits() {
        let codec = Codec::new(0x0001_0007, Variant::ShiftCipher);
        assert_eq!(
            codec.encode(&units("a")),
            Some(EncodedLiteral::Text(vec![u16::from(b'a') ^ 7]))
        );
    }

    #[test]
    fn array_split_layout() {
        let codec = Codec::new(7, Variant::ArraySplit);
        let encoded = codec.encode(&units("ab")).unwrap();
        assert_eq!(
            encoded,
            EncodedLiteral::Array(vec![
                i64::from(u16::from(b'a') ^ 7),
                (1 << 32) | i64::from(u16::from(b'b') ^ 7 ^ 1),
            ])
        );
    }

    #[test]
    fn array_split_roundtrip() {
        for key in [7, -2021, i32::MIN] {
            let codec = Codec::new(key, Variant::ArraySplit);
            for text in ["secret-token", "x", "ünïcødé \u{1F600}"] {
                let plain = units(text);
                let encoded = codec.encode(&plain).unwrap();
                assert_eq!(codec.decode(&encoded).unwrap(), plain);
            }
        }
    }

    #[test]
    fn array_split_bounds() {
        let codec = Codec::new(7, Variant::ArraySplit);
        assert!(codec.encode(&[]).is_none());
        assert!(codec.encode(&vec![u16::from(b'a'); MAX_ARRAY_LENGTH]).is_some());
        assert!(codec.encode(&vec![u16::from(b'a'); MAX_ARRAY_LENGTH + 1]).is_none());
    }

    #[test]
    fn shift_cipher_growth_is_skipped() {
        // 'a' ^ 0x0800 needs three bytes of modified UTF-8
        let codec = Codec::new(0x0800, Variant::ShiftCipher);
        assert!(codec.encode(&vec![u16::from(b'a'); 30_000]).is_none());
        assert!(codec.encode(&vec![u16::from(b'a'); 20_000]).is_some());
    }

    #[test]
    fn deterministic() {
        let codec = Codec::new(2021, Variant::ArraySplit);
        assert_eq!(codec.encode(&units("same")), codec.encode(&units("same")));
    }

    #[test]
    fn variant_names() {
        assert_eq!(Variant::ShiftCipher.to_string(), "shift-cipher");
        assert_eq!("array-split".parse::<Variant>().unwrap(), Variant::ArraySplit);
        assert_eq!(Variant::default(), Variant::ShiftCipher);
    }

    #[test]
    fn mismatched_variant() {
        let codec = Codec::new(7, Variant::ArraySplit);
        assert!(codec.decode(&EncodedLiteral::Text(vec![1])).is_err());
    }
}
