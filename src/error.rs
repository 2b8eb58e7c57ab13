use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `reproarch` crate.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// The requested entry source does not exist or has the wrong kind
    /// (a file where a directory was required, or vice versa).
    #[error("invalid source '{}': {reason}", path.display())]
    InvalidSource { path: PathBuf, reason: String },

    /// The requested archive format has no writer.
    #[error("unsupported archive format '{0}' (expected \"zip\" or \"tar.gz\")")]
    UnsupportedFormat(String),

    /// An exclusion pattern could not be compiled.
    #[error("invalid exclusion pattern '{pattern}': {source}")]
    MatchPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// A symlink chain exceeded the hop bound, or a symlinked directory loops
    /// back onto a directory that is already being walked.
    #[error("symlink cycle at '{}' after {hops} hop(s)", path.display())]
    SymlinkCycle { path: PathBuf, hops: usize },

    /// A symlink points at something that does not exist.
    #[error("could not resolve symlink '{}': {source}", path.display())]
    SymlinkResolution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The selected source produced no entries.
    #[error("archive has no contents: '{}' produced zero entries", path.display())]
    EmptyArchive { path: PathBuf },

    /// Two entries in one build would share an archive path.
    #[error("duplicate archive entry '{0}'")]
    DuplicateEntry(String),

    /// `output_file_mode` is not an octal permission string.
    #[error("invalid output file mode '{0}': expected an octal string such as \"0644\"")]
    InvalidFileMode(String),

    /// The request does not select exactly one usable entry source.
    #[error("invalid archive request: {0}")]
    InvalidRequest(String),

    /// An I/O error occurred while reading a source or writing the output.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// The request document could not be parsed.
    #[error("request parse error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl ArchiverError {
    /// Wraps an I/O error together with the path it happened on.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiverError::Io { source, path: path.into() }
    }
}

impl From<zip::result::ZipError> for ArchiverError {
    fn from(err: zip::result::ZipError) -> Self {
        let source = match err {
            zip::result::ZipError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        };
        ArchiverError::Io { source, path: PathBuf::new() }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for ArchiverError {
    fn from(err: std::io::Error) -> Self {
        ArchiverError::Io { source: err, path: PathBuf::new() } // Generic path
    }
}

pub type Result<T, E = ArchiverError> = std::result::Result<T, E>;
