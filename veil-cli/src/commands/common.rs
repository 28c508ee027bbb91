use std::path::{Path, PathBuf};

use anyhow::Context;
use veil::{ChangeSetEntry, Config, TransformInput};

/// Load the configuration at `path`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Split an `IN=OUT` argument.
pub fn parse_mapping(value: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    match value.split_once('=') {
        Some((input, output)) if !input.is_empty() && !output.is_empty() => {
            Ok((PathBuf::from(input), PathBuf::from(output)))
        }
        _ => anyhow::bail!("expected IN=OUT, got '{value}'"),
    }
}

/// Load a JSON change set.
pub fn load_changes(path: &Path) -> anyhow::Result<Vec<ChangeSetEntry>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read change set: {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse change set: {}", path.display()))
}

/// Attach every change to the input it belongs to.
///
/// Directory inputs own the paths below their root and receive them relative to that
/// root, archive inputs own their own path. Returns the changes no input claimed.
pub fn assign_changes(
    inputs: &mut [TransformInput],
    changes: Vec<ChangeSetEntry>,
) -> Vec<ChangeSetEntry> {
    let mut unclaimed = Vec::new();
    for mut change in changes {
        let owner = inputs.iter_mut().find(|input| match input.kind {
            veil::InputKind::Directory => change.path.starts_with(&input.input),
            veil::InputKind::Archive => change.path == input.input,
        });
        match owner {
            Some(input) => {
                if input.kind == veil::InputKind::Directory {
                    if let Ok(relative) = change.path.strip_prefix(&input.input) {
                        change.path = relative.to_path_buf();
                    }
                }
                input.changes.push(change);
            }
            None => unclaimed.push(change),
        }
    }
    unclaimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil::Status;

    #[test]
    fn mappings() {
        let (input, output) = parse_mapping("build/classes=out/classes").unwrap();
        assert_eq!(input, PathBuf::from("build/classes"));
        assert_eq!(output, PathBuf::from("out/classes"));
        assert!(parse_mapping("build/classes").is_err());
        assert!(parse_mapping("=out").is_err());
    }

    #[test]
    fn changes_go_to_their_owner() {
        let mut inputs = vec![
            TransformInput::directory("classes", "out/classes"),
            TransformInput::archive("libs/a.jar", "out/a.jar"),
        ];
        let unclaimed = assign_changes(
            &mut inputs,
            vec![
                ChangeSetEntry::new("classes/com/A.class", Status::Changed),
                ChangeSetEntry::new("libs/a.jar", Status::Added),
                ChangeSetEntry::new("other/B.class", Status::Removed),
            ],
        );
        assert_eq!(inputs[0].changes.len(), 1);
        assert_eq!(inputs[0].changes[0].path, PathBuf::from("com/A.class"));
        assert_eq!(
            inputs[0].resolve(&inputs[0].changes[0].path),
            PathBuf::from("classes/com/A.class")
        );
        assert_eq!(inputs[1].changes[0].status, Status::Added);
        assert_eq!(unclaimed.len(), 1);
    }
}
