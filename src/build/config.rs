//! Configuration for a transform pass.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{obfuscation::Variant, Error, Result};

/// Key used when none is configured.
pub const DEFAULT_KEY: i32 = 2021;

/// Configuration for the string obfuscation pass.
///
/// Deserializes from JSON with every field optional:
///
/// ```json
/// { "enabled": true, "key": 7, "include": ["com.app"], "exclude": [], "variant": "array-split" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rewrite classes at all; when off every entry is copied (default: true).
    pub enabled: bool,

    /// Obfuscation key shared by the codec and the decoder class (default: 2021).
    pub key: i32,

    /// Name prefixes a class must match to be transformed, empty admits all.
    #[serde(alias = "includePrefixes")]
    pub include: Vec<String>,

    /// Name prefixes that keep a class untransformed.
    #[serde(alias = "excludePrefixes")]
    pub exclude: Vec<String>,

    /// Literal encoding (default: shift-cipher).
    pub variant: Variant,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            key: DEFAULT_KEY,
            include: Vec::new(),
            exclude: Vec::new(),
            variant: Variant::default(),
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::FileError`] if the file cannot be read and [`Error::Config`] if it
    /// is not a valid configuration.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data).map_err(|error| match error {
            Error::Config(message) => Error::Config(format!("{}: {message}", path.display())),
            other => other,
        })
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `data` is not a valid configuration.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|error| Error::Config(error.to_string()))
    }

    /// Enables or disables the pass.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the obfuscation key.
    #[must_use]
    pub fn with_key(mut self, key: i32) -> Self {
        self.key = key;
        self
    }

    /// Sets the include prefixes.
    #[must_use]
    pub fn with_include<I>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.include = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the exclude prefixes.
    #[must_use]
    pub fn with_exclude<I>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.exclude = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the literal encoding.
    #[must_use]
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.enabled);
        assert_eq!(config.key, 2021);
        assert!(config.include.is_empty() && config.exclude.is_empty());
        assert_eq!(config.variant, Variant::ShiftCipher);
        assert_eq!(Config::from_json(b"{}").unwrap(), config);
    }

    #[test]
    fn partial_json() {
        let config = Config::from_json(
            br#"{ "key": 7, "includePrefixes": ["com.app"], "variant": "array-split" }"#,
        )
        .unwrap();
        assert_eq!(config.key, 7);
        assert_eq!(config.include, ["com.app"]);
        assert_eq!(config.variant, Variant::ArraySplit);
        assert!(config.enabled);
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            Config::from_json(br#"{ "key": "seven" }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_json(br#"{ "variant": "rot13" }"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("veil.json");
        std::fs::write(&path, r#"{ "enabled": false }"#).unwrap();
        assert!(!Config::from_json_file(&path).unwrap().enabled);
        assert!(matches!(
            Config::from_json_file(&dir.path().join("missing.json")),
            Err(Error::FileError(_))
        ));
    }

    #[test]
    fn builders() {
        let config = Config::default()
            .with_enabled(false)
            .with_key(-3)
            .with_include(["a"])
            .with_exclude(vec![String::from("b")])
            .with_variant(Variant::ArraySplit);
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            serde_json::json!({
                "enabled": false,
                "key": -3,
                "include": ["a"],
                "exclude": ["b"],
                "variant": "array-split"
            })
        );
    }
}
