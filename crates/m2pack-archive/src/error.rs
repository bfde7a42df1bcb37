//! Error types for the archive crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading or writing pack archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] m2pack_common::Error),

    /// The header stream does not start with a known pack magic.
    #[error("unknown pack format: {:?}", String::from_utf8_lossy(.0))]
    UnknownFormat([u8; 4]),

    /// The header stream is shorter than its stream header layout.
    #[error("truncated header: needed {needed} bytes but only {available} available")]
    TruncatedHeader { needed: usize, available: usize },

    /// The decoded file table is shorter than `total_files` records.
    #[error("truncated file table: needed {needed} bytes but only {available} available")]
    TruncatedTable { needed: usize, available: usize },

    /// A blob contains characters outside the base64 alphabet.
    #[error("malformed base64 encoding: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Compression error.
    #[error("compression error: {0}")]
    Compression(String),

    /// A decoded payload does not have its declared size.
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// A file list line could not be parsed.
    #[error("malformed file list entry {line:?}: {reason}")]
    MalformedFileListEntry { line: String, reason: &'static str },

    /// The same index appears twice in the file list.
    #[error("duplicate file index {0} in file list")]
    DuplicateFileIndex(u64),

    /// File list, file table and stream header disagree.
    #[error("inconsistent archive: {0}")]
    InconsistentArchive(String),

    /// A file record points outside the data stream.
    #[error("entry {index} out of bounds: {size} bytes at offset {offset} exceed data stream of {data_len} bytes")]
    EntryOutOfBounds {
        index: u64,
        offset: u64,
        size: u64,
        data_len: u64,
    },

    /// A value does not fit the on-disk width of its field.
    #[error("value {value} does not fit field `{field}`")]
    FieldOverflow { field: &'static str, value: u64 },

    /// A path cannot be stored in the file list.
    #[error("path cannot be stored in a file list: {}", .0.display())]
    UnrepresentablePath(PathBuf),

    /// A file list path would escape the extraction directory.
    #[error("unsafe path in file list: {0:?}")]
    UnsafePath(String),

    /// Folder to pack does not exist.
    #[error("folder does not exist: {}", .0.display())]
    FolderNotFound(PathBuf),

    /// Path to pack is not a folder.
    #[error("not a folder: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Directory traversal error.
    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Failure while processing a single archived file.
    #[error("file {index} ({name}): {source}")]
    Entry {
        index: u64,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the index and path of the file being processed.
    pub(crate) fn for_entry(self, index: u64, name: &str) -> Self {
        Error::Entry {
            index,
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
