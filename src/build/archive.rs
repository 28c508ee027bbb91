//! Archive inputs.
//!
//! An archive is always rebuilt as a whole. Class entries are transformed in parallel;
//! every entry that is not rewritten, including directories and resources, is copied
//! raw so it keeps its original compression and metadata.

use std::{
    collections::HashMap,
    fs,
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use log::debug;
use rayon::prelude::*;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

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

/// A class entry read for transformation.
struct ClassEntry {
    index: usize,
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
}

/// A rewritten class entry waiting to be written.
struct Patched {
    name: String,
    bytes: Vec<u8>,
    compression: CompressionMethod,
}

/// Rebuilds the output archive of `input`.
pub(crate) fn full(
    input: &TransformInput,
    unit: &UnitTransformer,
    counters: &Counters,
) -> Vec<EntryFailure> {
    match rebuild(input, unit, counters) {
        Ok(failures) => failures,
        Err(error) => vec![EntryFailure {
            path: input.input.clone(),
            error,
        }],
    }
}

/// Rebuilds or deletes the output archive of `input` according to its tracked status.
pub(crate) fn incremental(
    input: &TransformInput,
    tracker: &ChangeTracker,
    unit: &UnitTransformer,
    counters: &Counters,
) -> Vec<EntryFailure> {
    let result = match tracker.status(&input.input) {
        Some(Status::Added | Status::Changed) => return full(input, unit, counters),
        Some(Status::Removed) => remove(&input.output, counters),
        None => {
            debug!("{} is unchanged", input.input.display());
            Ok(())
        }
    };
    match result {
        Ok(()) => Vec::new(),
        Err(error) => vec![EntryFailure {
            path: input.input.clone(),
            error,
        }],
    }
}

fn remove(output: &Path, counters: &Counters) -> Result<()> {
    match fs::remove_file(output) {
        Ok(()) => {
            counters.removed();
            Ok(())
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}

fn rebuild(
    input: &TransformInput,
    unit: &UnitTransformer,
    counters: &Counters,
) -> Result<Vec<EntryFailure>> {
    if input.input == input.output {
        return Err(Error::Config(format!(
            "archive {} would overwrite itself",
            input.input.display()
        )));
    }
    if let Some(parent) = input.output.parent() {
        fs::create_dir_all(parent)?;
    }

    if !unit.is_enabled() {
        fs::copy(&input.input, &input.output)?;
        counters.archive();
        return Ok(Vec::new());
    }

    let mut archive = ZipArchive::new(fs::File::open(&input.input)?)?;
    let mut classes = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || !is_class_file(Path::new(entry.name())) {
            continue;
        }
        let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry.read_to_end(&mut data)?;
        classes.push(ClassEntry {
            index,
            name: entry.name().to_string(),
            data,
            compression: entry.compression(),
        });
    }
    debug!(
        "Transforming {} class entries of {}",
        classes.len(),
        input.input.display()
    );

    let results: Vec<(ClassEntry, Result<Outcome>)> = classes
        .into_par_iter()
        .map(|mut entry| {
            let outcome = File::from_mem(std::mem::take(&mut entry.data))
                .and_then(|file| unit.transform(&file));
            (entry, outcome)
        })
        .collect();

    let mut failures = Vec::new();
    let mut patched = HashMap::new();
    for (entry, outcome) in results {
        match outcome {
            Ok(Outcome::Patched { bytes, stats }) => {
                counters.patched(&stats);
                patched.insert(
                    entry.index,
                    Patched {
                        name: entry.name,
                        bytes,
                        compression: entry.compression,
                    },
                );
            }
            Ok(Outcome::Unchanged { stats }) => counters.copied(&stats),
            Err(error) => {
                counters.copied(&PatchStats::default());
                failures.push(EntryFailure {
                    path: input.input.join(&entry.name),
                    error,
                });
            }
        }
    }

    let staging = staging_path(&input.output);
    let written = write_archive(&staging, &mut archive, patched, counters)
        .and_then(|()| fs::rename(&staging, &input.output).map_err(Error::from));
    if let Err(error) = written {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    counters.archive();

    Ok(failures)
}

/// Returns the file an archive is assembled in before it replaces `output`.
fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".veil-tmp");
    output.with_file_name(name)
}

fn write_archive(
    staging: &Path,
    archive: &mut ZipArchive<fs::File>,
    mut patched: HashMap<usize, Patched>,
    counters: &Counters,
) -> Result<()> {
    let writer = BufWriter::new(fs::File::create(staging)?);
    let mut writer = ZipWriter::new(writer);
    for index in 0..archive.len() {
        match patched.remove(&index) {
            Some(entry) => {
                let compression = match entry.compression {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                };
                writer.start_file(
                    entry.name,
                    SimpleFileOptions::default().compression_method(compression),
                )?;
                writer.write_all(&entry.bytes)?;
            }
            None => {
                let raw = archive.by_index_raw(index)?;
                if !raw.is_dir() && !is_class_file(Path::new(raw.name())) {
                    counters.copied(&PatchStats::default());
                }
                writer.raw_copy_file(raw)?;
            }
        }
    }
    writer.finish()?.flush()?;
    Ok(())
}
