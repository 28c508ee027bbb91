//! Build inputs and change sets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How an input is laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputKind {
    /// A directory tree of class files and resources
    Directory,
    /// A `.jar` or `.zip` archive
    Archive,
}

/// What happened to a file since the previous build.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    /// New since the previous build
    Added,
    /// Modified since the previous build
    Changed,
    /// Deleted since the previous build
    Removed,
}

/// One entry of a change set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetEntry {
    /// Changed file; relative paths are resolved against the input root
    pub path: PathBuf,
    /// Kind of change
    pub status: Status,
}

impl ChangeSetEntry {
    /// Creates a change set entry.
    pub fn new(path: impl Into<PathBuf>, status: Status) -> Self {
        ChangeSetEntry {
            path: path.into(),
            status,
        }
    }
}

/// One input of a transform pass and where its output goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformInput {
    /// Layout of the input
    pub kind: InputKind,
    /// Input directory or archive
    pub input: PathBuf,
    /// Output directory or archive
    pub output: PathBuf,
    /// Changes since the previous build, only consulted for incremental passes
    #[serde(default)]
    pub changes: Vec<ChangeSetEntry>,
}

impl TransformInput {
    /// Creates a directory input.
    pub fn directory(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        TransformInput {
            kind: InputKind::Directory,
            input: input.into(),
            output: output.into(),
            changes: Vec::new(),
        }
    }

    /// Creates an archive input.
    pub fn archive(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        TransformInput {
            kind: InputKind::Archive,
            input: input.into(),
            output: output.into(),
            changes: Vec::new(),
        }
    }

    /// Adds a change set entry.
    #[must_use]
    pub fn with_change(mut self, path: impl Into<PathBuf>, status: Status) -> Self {
        self.changes.push(ChangeSetEntry::new(path, status));
        self
    }

    /// Resolves a change path against the input root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.input.join(path)
        }
    }
}

/// Returns `true` if `path` names a class file.
#[must_use]
pub fn is_class_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("class")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_paths_resolve_against_root() {
        let input = TransformInput::directory("/build/classes", "/build/out")
            .with_change("com/app/Main.class", Status::Changed)
            .with_change("/elsewhere/A.class", Status::Added);
        assert_eq!(
            input.resolve(&input.changes[0].path),
            Path::new("/build/classes/com/app/Main.class")
        );
        assert_eq!(
            input.resolve(&input.changes[1].path),
            Path::new("/elsewhere/A.class")
        );
    }

    #[test]
    fn serde_names() {
        let entry: ChangeSetEntry =
            serde_json::from_str(r#"{ "path": "a/B.class", "status": "removed" }"#).unwrap();
        assert_eq!(entry, ChangeSetEntry::new("a/B.class", Status::Removed));
        assert_eq!(InputKind::Archive.to_string(), "archive");
        assert_eq!("changed".parse::<Status>().unwrap(), Status::Changed);
    }

    #[test]
    fn class_file_extension() {
        assert!(is_class_file(Path::new("a/B.class")));
        assert!(!is_class_file(Path::new("a/B.class.txt")));
        assert!(!is_class_file(Path::new("META-INF/MANIFEST.MF")));
    }
}
