//! Incremental build orchestration.
//!
//! A [`TransformPass`] applies the obfuscation pipeline to a set of
//! [`TransformInput`]s. Directory inputs are processed file by file, archive inputs are
//! rebuilt as a whole. Independent entries run in parallel on the rayon pool and only
//! share the read-only configuration and the change tracker.
//!
//! In incremental mode only entries named by a change set are touched. The pass stores a
//! [`Fingerprint`] of its configuration when given a state file; a stored fingerprint that
//! no longer matches promotes the next incremental run to a full one.
//!
//! # Examples
//!
//! ```rust,no_run
//! use veil::{generate_decoder_unit, Config, TransformInput, TransformPass};
//!
//! let config = Config::default().with_key(7).with_include(["com.example"]);
//! let report = TransformPass::new(config.clone())
//!     .with_state_file("build/veil.fingerprint")
//!     .run(
//!         &[
//!             TransformInput::directory("build/classes", "build/veil/classes"),
//!             TransformInput::archive("libs/app.jar", "build/veil/app.jar"),
//!         ],
//!         false,
//!     )?;
//! generate_decoder_unit("build/veil/classes".as_ref(), &config)?;
//! println!("{} classes patched", report.classes_patched);
//! # Ok::<(), veil::Error>(())
//! ```

mod archive;
mod config;
mod directory;
mod fingerprint;
mod input;
mod report;
mod tracker;
mod unit;

pub use config::{Config, DEFAULT_KEY};
pub use fingerprint::Fingerprint;
pub use input::{is_class_file, ChangeSetEntry, InputKind, Status, TransformInput};
pub use report::TransformReport;
pub use tracker::ChangeTracker;
pub use unit::{Outcome, UnitTransformer};

use std::path::{Path, PathBuf};

use log::{error, info};
use rayon::prelude::*;

use crate::{
    obfuscation::{decoder::synthesize_bytes, Codec, DECODER_CLASS},
    Error, Result,
};

/// One configured transform pass.
#[derive(Clone, Debug)]
pub struct TransformPass {
    config: Config,
    state_file: Option<PathBuf>,
}

impl TransformPass {
    /// Creates a pass for `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        TransformPass {
            config,
            state_file: None,
        }
    }

    /// Persists the configuration fingerprint at `path` between runs.
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the pass over `inputs`.
    ///
    /// Every input is processed even when some entries fail. The fingerprint is stored
    /// only after a fully successful run.
    ///
    /// # Errors
    /// Returns [`Error::Failed`] listing every entry that could not be transformed, or
    /// [`Error::FileError`] if the state file cannot be read or written.
    pub fn run(&self, inputs: &[TransformInput], incremental: bool) -> Result<TransformReport> {
        let fingerprint = Fingerprint::of(&self.config);
        let incremental = incremental && self.fingerprint_matches(&fingerprint)?;

        info!(
            "Transforming {} inputs (incremental: {}, enabled: {}, fingerprint: {})",
            inputs.len(),
            incremental,
            self.config.enabled,
            fingerprint
        );

        let tracker = ChangeTracker::collect(inputs);
        let unit = UnitTransformer::new(&self.config);
        let counters = report::Counters::default();

        let failures: Vec<crate::EntryFailure> = inputs
            .par_iter()
            .flat_map_iter(|input| match (input.kind, incremental) {
                (InputKind::Directory, false) => directory::full(input, &unit, &counters),
                (InputKind::Directory, true) => {
                    directory::incremental(input, &tracker, &unit, &counters)
                }
                (InputKind::Archive, false) => archive::full(input, &unit, &counters),
                (InputKind::Archive, true) => {
                    archive::incremental(input, &tracker, &unit, &counters)
                }
            })
            .collect();

        if !failures.is_empty() {
            for failure in &failures {
                error!("Failed to transform {}", failure);
            }
            return Err(Error::Failed(failures));
        }

        if let Some(state) = &self.state_file {
            fingerprint.store(state)?;
        }

        let report = counters.report(incremental, fingerprint.to_string());
        info!(
            "Patched {} classes ({} literals, {} fields), copied {} files, removed {}",
            report.classes_patched,
            report.literals,
            report.fields,
            report.files_copied,
            report.files_removed
        );
        Ok(report)
    }

    fn fingerprint_matches(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let Some(state) = &self.state_file else {
            return Ok(true);
        };
        match Fingerprint::load(state)? {
            Some(previous) if previous == *fingerprint => Ok(true),
            Some(previous) => {
                info!(
                    "Configuration changed ({} -> {}), running a full build",
                    previous, fingerprint
                );
                Ok(false)
            }
            None => {
                info!("No previous fingerprint, running a full build");
                Ok(false)
            }
        }
    }
}

/// Writes the decoder class for `config` to `<dir>/veil/runtime/Veil.class`.
///
/// Returns the path of the written file.
///
/// # Errors
/// Returns [`Error::FileError`] if the file cannot be written.
pub fn generate_decoder_unit(dir: &Path, config: &Config) -> Result<PathBuf> {
    let bytes = synthesize_bytes(&Codec::new(config.key, config.variant))?;
    let path = dir.join(format!("{DECODER_CLASS}.class"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, bytes)?;
    info!("Wrote decoder class to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        obfuscation::{locate, Variant},
        test::fixtures::sample_bytes,
        ClassFile,
    };

    fn workspace() -> (tempfile::TempDir, TransformInput) {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes/com/example");
        std::fs::create_dir_all(&classes).unwrap();
        std::fs::write(classes.join("Sample.class"), sample_bytes()).unwrap();
        let input = TransformInput::directory(dir.path().join("classes"), dir.path().join("out"));
        (dir, input)
    }

    #[test]
    fn decoder_unit_location() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_variant(Variant::ArraySplit);
        let path = generate_decoder_unit(dir.path(), &config).unwrap();
        assert_eq!(path, dir.path().join("veil/runtime/Veil.class"));

        let class = ClassFile::from_path(&path).unwrap();
        assert_eq!(class.name().unwrap(), DECODER_CLASS);
        assert!(locate(&class).unwrap().is_empty());
    }

    #[test]
    fn incremental_without_state_is_promoted() {
        let (dir, input) = workspace();
        let pass = TransformPass::new(Config::default()).with_state_file(dir.path().join("fp"));

        let report = pass.run(std::slice::from_ref(&input), true).unwrap();
        assert!(!report.incremental);
        assert_eq!(report.classes_patched, 1);

        let report = pass.run(std::slice::from_ref(&input), true).unwrap();
        assert!(report.incremental);
        assert_eq!(report.classes_patched, 0);
        assert!(input.output.join("com/example/Sample.class").exists());
    }

    #[test]
    fn key_change_forces_full_build() {
        let (dir, input) = workspace();
        let state = dir.path().join("fp");
        TransformPass::new(Config::default())
            .with_state_file(&state)
            .run(std::slice::from_ref(&input), false)
            .unwrap();

        let report = TransformPass::new(Config::default().with_key(9))
            .with_state_file(&state)
            .run(std::slice::from_ref(&input), true)
            .unwrap();
        assert!(!report.incremental);
        assert_eq!(report.classes_patched, 1);
        assert_eq!(
            Fingerprint::load(&state).unwrap(),
            Some(Fingerprint::of(&Config::default().with_key(9)))
        );
    }

    #[test]
    fn failures_are_collected() {
        let (dir, input) = workspace();
        std::fs::write(input.input.join("Bad.class"), b"nope").unwrap();
        let state = dir.path().join("fp");

        let result = TransformPass::new(Config::default())
            .with_state_file(&state)
            .run(&[input.clone()], false);
        let Err(Error::Failed(failures)) = result else {
            panic!("expected failure, got {result:?}");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].path.ends_with("Bad.class"));
        assert!(input.output.join("com/example/Sample.class").exists());
        assert!(!state.exists());
    }
}
