//! Directory inputs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use rayon::prelude::*;

use crate::{
    build::{
        input::is_class_file,
        report::Counters,
        tracker::ChangeTracker,
        unit::{Outcome, UnitTransformer},
        Status, TransformInput,
    },
    file::File,
    obfuscation::PatchStats,
    EntryFailure, Error, Result,
};

/// Rebuilds the whole output directory of `input`.
///
/// The previous output is deleted first. Files are processed in parallel; a failing file
/// is reported and the others continue.
pub(crate) fn full(
    input: &TransformInput,
    unit: &UnitTransformer,
    counters: &Counters,
) -> Vec<EntryFailure> {
    let prepared = check_roots(input)
        .and_then(|()| clear(&input.output))
        .and_then(|()| collect_files(&input.input));
    let files = match prepared {
        Ok(files) => files,
        Err(error) => {
            return vec![EntryFailure {
                path: input.input.clone(),
                error,
            }]
        }
    };
    debug!(
        "Transforming {} files from {}",
        files.len(),
        input.input.display()
    );

    files
        .par_iter()
        .filter_map(|path| {
            process(&input.input, &input.output, path, unit, counters)
                .err()
                .map(|error| EntryFailure {
                    path: path.clone(),
                    error,
                })
        })
        .collect()
}

/// Applies the tracked changes below the root of `input`.
///
/// Added and changed files are written as in a full build, removed ones are deleted from
/// the output. Files without a change entry are not touched.
pub(crate) fn incremental(
    input: &TransformInput,
    tracker: &ChangeTracker,
    unit: &UnitTransformer,
    counters: &Counters,
) -> Vec<EntryFailure> {
    if let Err(error) = check_roots(input) {
        return vec![EntryFailure {
            path: input.input.clone(),
            error,
        }];
    }

    let changes = tracker.changes_under(&input.input);
    debug!(
        "Applying {} changes from {}",
        changes.len(),
        input.input.display()
    );

    changes
        .par_iter()
        .filter_map(|(path, status)| {
            let result = match status {
                Status::Added | Status::Changed => {
                    process(&input.input, &input.output, path, unit, counters)
                }
                Status::Removed => remove(&input.input, &input.output, path, counters),
            };
            result.err().map(|error| EntryFailure {
                path: path.clone(),
                error,
            })
        })
        .collect()
}

fn check_roots(input: &TransformInput) -> Result<()> {
    if input.input.starts_with(&input.output) || input.output.starts_with(&input.input) {
        return Err(Error::Config(format!(
            "output {} overlaps input {}",
            input.output.display(),
            input.input.display()
        )));
    }
    Ok(())
}

fn clear(output: &Path) -> Result<()> {
    match fs::remove_dir_all(output) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Lists every regular file below `root`, sorted.
pub(crate) fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_recursive(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_recursive(&path, files)?;
        } else if file_type.is_file() || path.is_file() {
            files.push(path);
        } else {
            debug!("Skipping {}", path.display());
        }
    }
    Ok(())
}

fn destination(root: &Path, output: &Path, path: &Path) -> Result<PathBuf> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::Error(format!(
            "{} is not below input root {}",
            path.display(),
            root.display()
        ))
    })?;
    Ok(output.join(relative))
}

fn process(
    root: &Path,
    output: &Path,
    path: &Path,
    unit: &UnitTransformer,
    counters: &Counters,
) -> Result<()> {
    let target = destination(root, output, path)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    if !is_class_file(path) {
        fs::copy(path, &target)?;
        counters.copied(&PatchStats::default());
        return Ok(());
    }

    let file = File::from_file(path)?;
    match unit.transform(&file)? {
        Outcome::Patched { bytes, stats } => {
            fs::write(&target, bytes)?;
            counters.patched(&stats);
        }
        Outcome::Unchanged { stats } => {
            fs::write(&target, file.data())?;
            counters.copied(&stats);
        }
    }
    Ok(())
}

fn remove(root: &Path, output: &Path, path: &Path, counters: &Counters) -> Result<()> {
    let target = destination(root, output, path)?;
    match fs::remove_file(&target) {
        Ok(()) => {
            counters.removed();
            Ok(())
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            warn!("Removed entry {} had no output", path.display());
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build::Config, test::fixtures::sample_bytes};

    fn setup() -> (tempfile::TempDir, TransformInput) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("classes");
        fs::create_dir_all(input.join("com/example")).unwrap();
        fs::write(input.join("com/example/Sample.class"), sample_bytes()).unwrap();
        fs::write(input.join("app.properties"), "a=b").unwrap();
        let output = dir.path().join("out");
        (dir, TransformInput::directory(input, output))
    }

    #[test]
    fn full_rebuild_clears_stale_output() {
        let (_dir, input) = setup();
        fs::create_dir_all(&input.output).unwrap();
        fs::write(input.output.join("Stale.class"), b"old").unwrap();

        let counters = Counters::default();
        let failures = full(
            &input,
            &UnitTransformer::new(&Config::default()),
            &counters,
        );
        assert!(failures.is_empty(), "{failures:?}");

        assert!(!input.output.join("Stale.class").exists());
        assert_eq!(
            fs::read(input.output.join("app.properties")).unwrap(),
            b"a=b"
        );
        assert_ne!(
            fs::read(input.output.join("com/example/Sample.class")).unwrap(),
            sample_bytes()
        );
        let report = counters.report(false, String::new());
        assert_eq!(report.classes_patched, 1);
        assert_eq!(report.files_copied, 1);
    }

    #[test]
    fn bad_class_is_reported() {
        let (_dir, input) = setup();
        fs::write(input.input.join("Broken.class"), b"\xCA\xFE\xBA\xBE").unwrap();

        let failures = full(
            &input,
            &UnitTransformer::new(&Config::default()),
            &Counters::default(),
        );
        assert_eq!(failures.len(), 1);
        assert!(failures[0].path.ends_with("Broken.class"));
        assert!(input.output.join("com/example/Sample.class").exists());
    }

    #[test]
    fn incremental_applies_changes_only() {
        let (_dir, input) = setup();
        let unit = UnitTransformer::new(&Config::default());
        assert!(full(&input, &unit, &Counters::default()).is_empty());

        fs::write(input.input.join("app.properties"), "a=c").unwrap();
        fs::write(input.input.join("extra.txt"), "new").unwrap();
        let input = input
            .with_change("app.properties", Status::Changed)
            .with_change("com/example/Sample.class", Status::Removed);
        let tracker = ChangeTracker::collect(std::slice::from_ref(&input));

        let counters = Counters::default();
        assert!(incremental(&input, &tracker, &unit, &counters).is_empty());

        assert_eq!(
            fs::read(input.output.join("app.properties")).unwrap(),
            b"a=c"
        );
        assert!(!input.output.join("com/example/Sample.class").exists());
        assert!(!input.output.join("extra.txt").exists());
        assert_eq!(counters.report(true, String::new()).files_removed, 1);
    }

    #[test]
    fn overlapping_roots_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = TransformInput::directory(dir.path(), dir.path().join("out"));
        let failures = full(
            &input,
            &UnitTransformer::new(&Config::default()),
            &Counters::default(),
        );
        assert!(matches!(failures[0].error, Error::Config(_)));
        assert!(dir.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn linked_directories_are_not_followed() {
        let (_dir, input) = setup();
        std::os::unix::fs::symlink(&input.input, input.input.join("com/loop")).unwrap();
        std::os::unix::fs::symlink(
            input.input.join("app.properties"),
            input.input.join("linked.properties"),
        )
        .unwrap();

        let files = collect_files(&input.input).unwrap();
        let names: Vec<PathBuf> = files
            .iter()
            .map(|path| path.strip_prefix(&input.input).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            [
                PathBuf::from("app.properties"),
                PathBuf::from("com/example/Sample.class"),
                PathBuf::from("linked.properties"),
            ]
        );
    }
}
