//! Transformation of a single binary unit.

use log::debug;

use crate::{
    build::Config,
    classfile::ClassFile,
    file::File,
    obfuscation::{decoder::is_decoder_class, locate, Codec, Filter, PatchStats, Patcher},
    Result,
};

/// Result of running one unit through the pipeline.
#[derive(Debug)]
pub enum Outcome {
    /// The class was rewritten
    Patched {
        /// Serialized class
        bytes: Vec<u8>,
        /// What was rewritten
        stats: PatchStats,
    },
    /// The input is written as is
    Unchanged {
        /// Skips recorded while attempting the rewrite
        stats: PatchStats,
    },
}

/// Parses, locates, patches and serializes one class for a fixed configuration.
///
/// Shared read-only between all workers of a pass.
#[derive(Clone, Debug)]
pub struct UnitTransformer {
    enabled: bool,
    filter: Filter,
    patcher: Patcher,
}

impl UnitTransformer {
    /// Creates a transformer for `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        UnitTransformer {
            enabled: config.enabled,
            filter: Filter::from_config(config),
            patcher: Patcher::new(Codec::new(config.key, config.variant)),
        }
    }

    /// Returns `false` if the pass only copies its inputs.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Transforms the class file held by `file`.
    ///
    /// Returns [`Outcome::Unchanged`] without parsing when the pass is disabled, and after
    /// parsing for the decoder class, classes the filter rejects and classes without
    /// rewritable literals.
    ///
    /// # Errors
    /// Returns an error if the class cannot be parsed or the patched class cannot be
    /// serialized.
    pub fn transform(&self, file: &File) -> Result<Outcome> {
        if !self.enabled {
            return Ok(Outcome::Unchanged {
                stats: PatchStats::default(),
            });
        }

        let mut class = ClassFile::from_bytes(file.data())?;
        let name = class.name()?;
        if is_decoder_class(&name) || !self.filter.admits(&name) {
            debug!("Passing {} through", name);
            return Ok(Outcome::Unchanged {
                stats: PatchStats::default(),
            });
        }

        let sites = locate(&class)?;
        if sites.is_empty() {
            return Ok(Outcome::Unchanged {
                stats: PatchStats::default(),
            });
        }

        let stats = self.patcher.patch(&mut class, &sites)?;
        if !stats.is_modified() {
            return Ok(Outcome::Unchanged { stats });
        }

        debug!(
            "Patched {}: {} literals, {} fields",
            name, stats.literals, stats.fields
        );
        Ok(Outcome::Patched {
            bytes: class.to_bytes()?,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        obfuscation::synthesize,
        test::fixtures::{sample_bytes, SAMPLE},
        Error,
    };

    fn run(config: &Config, data: Vec<u8>) -> Result<Outcome> {
        UnitTransformer::new(config).transform(&File::from_mem(data)?)
    }

    #[test]
    fn patches_admitted_class() {
        let Outcome::Patched { bytes, stats } =
            run(&Config::default().with_key(7), sample_bytes()).unwrap()
        else {
            panic!("expected a patched class");
        };
        assert_eq!(stats.literals, 3);
        assert_eq!(ClassFile::from_bytes(&bytes).unwrap().name().unwrap(), SAMPLE);
    }

    #[test]
    fn passes_through() {
        for config in [
            Config::default().with_enabled(false),
            Config::default().with_exclude(["com.example"]),
            Config::default().with_include(["org"]),
        ] {
            assert!(matches!(
                run(&config, sample_bytes()).unwrap(),
                Outcome::Unchanged { .. }
            ));
        }
    }

    #[test]
    fn decoder_is_never_patched() {
        let codec = Codec::new(7, crate::obfuscation::Variant::ShiftCipher);
        let decoder = synthesize(&codec).unwrap().to_bytes().unwrap();
        assert!(matches!(
            run(&Config::default(), decoder).unwrap(),
            Outcome::Unchanged { .. }
        ));
    }

    #[test]
    fn disabled_skips_parsing() {
        assert!(matches!(
            run(&Config::default().with_enabled(false), vec![1, 2, 3]).unwrap(),
            Outcome::Unchanged { .. }
        ));
        assert!(matches!(
            run(&Config::default(), vec![1, 2, 3]),
            Err(Error::Malformed { .. } | Error::OutOfBounds)
        ));
    }
}
