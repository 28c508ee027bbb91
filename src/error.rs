use std::path::PathBuf;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// A single entry that failed during a transform pass.
///
/// Collected by the orchestrator while the remaining entries keep processing, and
/// surfaced through [`Error::Failed`] once the pass completes.
#[derive(Debug)]
pub struct EntryFailure {
    /// Path of the input entry (a loose class file or an archive)
    pub path: PathBuf,
    /// The error that stopped this entry
    pub error: Error,
}

impl std::fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Class File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid class file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::NotSupported`] - Unsupported construct (e.g. unknown opcode)
/// - [`Error::Empty`] - Empty input provided
///
/// ## Rewriting Errors
/// - [`Error::LimitExceeded`] - A rewritten structure no longer fits a class file limit
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Archive`] - Archive reading or writing errors from the `zip` crate
/// - [`Error::Config`] - Invalid or unreadable configuration
///
/// ## Orchestration Errors
/// - [`Error::Entry`] - A failure attributed to one input entry
/// - [`Error::Failed`] - A pass finished with one or more failed entries
///
/// # Examples
///
/// ```rust
/// use veil::{ClassFile, Error};
///
/// match ClassFile::from_bytes(&[0xCA, 0xFE]) {
///     Ok(_) => unreachable!(),
///     Err(Error::OutOfBounds) => println!("truncated class file"),
///     Err(Error::Malformed { message, .. }) => println!("malformed: {message}"),
///     Err(e) => println!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This construct is not supported.
    #[error("This construct is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// A rewritten structure exceeds a class file format limit.
    ///
    /// Raised for code arrays above 65535 bytes, branch offsets outside their
    /// encodable range or a full constant pool. The patcher treats this as a soft
    /// skip for the affected method.
    #[error("Class file limit exceeded - {0}")]
    LimitExceeded(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the `zip` crate while reading or writing an archive.
    #[error("{0}")]
    Archive(#[from] zip::result::ZipError),

    /// The configuration could not be loaded or is invalid.
    #[error("Invalid configuration - {0}")]
    Config(String),

    /// A failure attributed to a single input entry.
    #[error("{}: {source}", path.display())]
    Entry {
        /// Path of the failing entry
        path: PathBuf,
        /// Underlying error
        source: Box<Error>,
    },

    /// The pass completed, but at least one entry failed.
    #[error("{} entries failed to transform, first: {}", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
    Failed(Vec<EntryFailure>),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Attaches an entry path to this error.
    #[must_use]
    pub fn at(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Error::Entry { .. } => self,
            other => Error::Entry {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }
}
