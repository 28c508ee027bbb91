//! Change tracking shared by every input of a pass.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use rayon::prelude::*;

use crate::build::{InputKind, Status, TransformInput};

/// Entry statuses and input to output roots, collected before any entry is dispatched.
///
/// Both maps are filled concurrently from all inputs and only read afterwards. An archive
/// input is tracked under its own path; a change entry naming anything inside it marks
/// the whole archive.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: DashMap<PathBuf, Status>,
    roots: DashMap<PathBuf, PathBuf>,
}

impl ChangeTracker {
    /// Collects the change sets of `inputs`.
    ///
    /// Within one input the last listed status of a path wins.
    #[must_use]
    pub fn collect(inputs: &[TransformInput]) -> Self {
        let tracker = ChangeTracker::default();
        inputs.par_iter().for_each(|input| {
            tracker
                .roots
                .insert(input.input.clone(), input.output.clone());
            match input.kind {
                InputKind::Directory => {
                    for change in &input.changes {
                        tracker
                            .entries
                            .insert(input.resolve(&change.path), change.status);
                    }
                }
                InputKind::Archive => {
                    if let Some(change) = input.changes.last() {
                        tracker.entries.insert(input.input.clone(), change.status);
                    }
                }
            }
        });
        tracker
    }

    /// Returns the recorded status of `path`.
    #[must_use]
    pub fn status(&self, path: &Path) -> Option<Status> {
        self.entries.get(path).map(|entry| *entry.value())
    }

    /// Returns the output root registered for the input root `input`.
    #[must_use]
    pub fn output_root(&self, input: &Path) -> Option<PathBuf> {
        self.roots.get(input).map(|entry| entry.value().clone())
    }

    /// Returns every tracked path below `root` with its status, sorted by path.
    #[must_use]
    pub fn changes_under(&self, root: &Path) -> Vec<(PathBuf, Status)> {
        let mut changes: Vec<(PathBuf, Status)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(root))
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        changes.sort();
        changes
    }

    /// Returns the number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no change was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
