//! Build fingerprints.
//!
//! Outputs of an incremental build are only valid for the configuration that produced
//! them. The fingerprint hashes everything that changes the output of an unchanged input,
//! so a pass can detect that its previous outputs are stale and rebuild from scratch.

use std::{fmt, path::Path, str::FromStr};

use sha1::{Digest, Sha1};

use crate::{build::Config, obfuscation::Filter, Error, Result};

/// SHA-1 over the output-relevant parts of a [`Config`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Computes the fingerprint of `config`.
    ///
    /// Covers the enabled flag, key, variant and the normalized filter prefixes, so
    /// `com.app` and `com/app` give the same value.
    #[must_use]
    pub fn of(config: &Config) -> Self {
        let filter = Filter::from_config(config);

        let mut hasher = Sha1::new();
        hasher.update([u8::from(config.enabled)]);
        hasher.update(config.key.to_be_bytes());
        field(&mut hasher, config.variant.to_string().as_bytes());
        for list in [filter.include(), filter.exclude()] {
            hasher.update((list.len() as u64).to_be_bytes());
            for prefix in list {
                field(&mut hasher, prefix.as_bytes());
            }
        }
        let mut digest = [0_u8; 20];
        digest.copy_from_slice(&hasher.finalize());
        Fingerprint(digest)
    }

    /// Returns the raw digest.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Reads a fingerprint stored by [`Fingerprint::store`].
    ///
    /// Returns `Ok(None)` if the file does not exist or does not hold a fingerprint.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(text.trim().parse().ok()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    /// Writes this fingerprint to `path`, creating parent directories.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be written.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{self}\n"))?;
        Ok(())
    }
}

fn field(hasher: &mut Sha1, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        if text.len() != 40 || !text.is_ascii() {
            return Err(Error::Config(format!("invalid fingerprint '{text}'")));
        }
        let mut digest = [0_u8; 20];
        for (index, byte) in digest.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&text[index * 2..index * 2 + 2], 16)
                .map_err(|_| Error::Config(format!("invalid fingerprint '{text}'")))?;
        }
        Ok(Fingerprint(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::Variant;

    #[test]
    fn sensitive_to_every_setting() {
        let base = Config::default();
        let variants = [
            base.clone().with_key(7),
            base.clone().with_enabled(false),
            base.clone().with_variant(Variant::ArraySplit),
            base.clone().with_include(["com/app"]),
            base.clone().with_exclude(["com/app"]),
        ];
        let reference = Fingerprint::of(&base);
        for config in &variants {
            assert_ne!(Fingerprint::of(config), reference, "{config:?}");
        }
        assert_ne!(
            Fingerprint::of(&variants[3]),
            Fingerprint::of(&variants[4])
        );
    }

    #[test]
    fn stable_under_normalization() {
        let dotted = Config::default().with_include(["com.app"]);
        let slashed = Config::default().with_include(["com/app"]);
        assert_eq!(Fingerprint::of(&dotted), Fingerprint::of(&slashed));
        assert_eq!(Fingerprint::of(&dotted), Fingerprint::of(&dotted.clone()));
    }

    #[test]
    fn text_roundtrip() {
        let fingerprint = Fingerprint::of(&Config::default());
        let text = fingerprint.to_string();
        assert_eq!(text.len(), 40);
        assert_eq!(text.parse::<Fingerprint>().unwrap(), fingerprint);
        assert!("xyz".parse::<Fingerprint>().is_err());
        assert!("zz".repeat(20).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("veil.fingerprint");
        assert_eq!(Fingerprint::load(&path).unwrap(), None);

        let fingerprint = Fingerprint::of(&Config::default().with_key(9));
        fingerprint.store(&path).unwrap();
        assert_eq!(Fingerprint::load(&path).unwrap(), Some(fingerprint));

        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(Fingerprint::load(&path).unwrap(), None);
    }
}
