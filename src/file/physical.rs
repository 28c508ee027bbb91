use std::{fs, path::Path};

use memmap2::Mmap;

use super::Backend;
use crate::{Error, Result};

/// A loose class file mapped read-only into memory.
#[derive(Debug)]
pub struct Physical {
    map: Mmap,
}

impl Physical {
    /// Maps the file at `path`.
    ///
    /// Zero-length files cannot be mapped on every platform and are rejected up front
    /// with [`Error::Empty`].
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(Error::Empty);
        }

        // The mapping is private to this value and never written through
        #[allow(unsafe_code)]
        let map = unsafe { Mmap::map(&file) }.map_err(|error| Error::Error(error.to_string()))?;
        Ok(Physical { map })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A.class");
        std::fs::write(&path, [0xCA, 0xFE, 0xBA, 0xBE]).unwrap();

        let physical = Physical::new(&path).unwrap();
        assert_eq!(physical.len(), 4);
        assert_eq!(physical.data_slice(2, 2).unwrap(), &[0xBA, 0xBE]);
        assert!(physical.data_slice(3, 2).is_err());
    }

    #[test]
    fn missing_and_empty_files() {
        assert!(matches!(
            Physical::new("/definitely/not/here.class"),
            Err(Error::FileError(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.class");
        std::fs::write(&path, []).unwrap();
        assert!(matches!(Physical::new(&path), Err(Error::Empty)));
    }
}
