use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// I/O errors that can occur when reading or patching a slide file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Operating system error on a local file
    #[error("I/O error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    /// Wrap an OS error raised while touching `path`.
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::File {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// The directory chain loops back on itself
    #[error("Directory chain revisits offset {0}")]
    DirectoryCycle(u64),

    /// The directory chain is longer than the parser accepts
    #[error("Directory chain exceeds {0} directories")]
    TooManyDirectories(usize),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised by the per-vendor format adapters
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Readable file that carries no recognized vendor marker
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// MRXS `Slidedat.ini` or index structure is malformed
    #[error("Invalid MRXS slide: {reason}")]
    InvalidMrxs { reason: String },
}

impl FormatError {
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        FormatError::UnsupportedFormat {
            reason: reason.into(),
        }
    }

    pub(crate) fn mrxs(reason: impl Into<String>) -> Self {
        FormatError::InvalidMrxs {
            reason: reason.into(),
        }
    }
}

/// Failure to open a slide for inspection
#[derive(Debug, Clone, Error)]
pub enum InspectError {
    /// The slide is readable but not in a format we can de-identify
    #[error("Unsupported slide: {reason}")]
    Unsupported { reason: String },

    /// The slide claims a supported format but could not be read
    #[error("Failed to read slide: {0}")]
    Capture(FormatError),
}

impl From<FormatError> for InspectError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::UnsupportedFormat { reason } => InspectError::Unsupported { reason },
            other => InspectError::Capture(other),
        }
    }
}

/// Failure to remove identifying imagery from a staged slide
#[derive(Debug, Clone, Error)]
pub enum RedactionError {
    /// The file is not in a format the redactor knows how to rewrite
    #[error("Unsupported format for redaction: {reason}")]
    Unsupported { reason: String },

    /// The slide carries none of the images the format stores identifiers in
    #[error("No {what} found to redact")]
    NothingToRedact { what: &'static str },

    /// Reading or patching the file failed
    #[error("Redaction failed: {0}")]
    Format(FormatError),

    /// The file still exposes identifying imagery after rewriting
    #[error("Redaction verification failed: {0}")]
    Verification(String),

    /// The redactor did not finish within the configured budget
    #[error("Redaction timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<FormatError> for RedactionError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::UnsupportedFormat { reason } => RedactionError::Unsupported { reason },
            other => RedactionError::Format(other),
        }
    }
}

impl From<TiffError> for RedactionError {
    fn from(err: TiffError) -> Self {
        RedactionError::Format(FormatError::Tiff(err))
    }
}

impl From<IoError> for RedactionError {
    fn from(err: IoError) -> Self {
        RedactionError::Format(FormatError::Io(err))
    }
}

/// Failure to stage a byte-for-byte copy into the destination folder
#[derive(Debug, Error)]
pub enum CopyError {
    /// Filesystem operation failed
    #[error("{operation} failed for {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking the MRXS companion directory failed
    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The MRXS companion data directory is missing
    #[error("companion directory {} not found", .0.display())]
    MissingCompanion(PathBuf),
}

impl CopyError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CopyError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Failure to persist the audit artifact
#[derive(Debug, Error)]
pub enum AuditPersistError {
    /// Filesystem operation failed
    #[error("{operation} failed for {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the archive failed
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Writing the CSV mapping failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serializing the records failed
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every candidate artifact name already exists
    #[error("no free artifact name next to {}", .0.display())]
    NameExhausted(PathBuf),

    /// The persist task panicked or was cancelled
    #[error("persist task failed: {0}")]
    Task(String),
}

impl AuditPersistError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuditPersistError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Batch-fatal errors raised before any file is processed
#[derive(Debug, Error)]
pub enum BatchError {
    /// Source folder does not exist or is not a directory
    #[error("source folder {} is not a directory", .0.display())]
    SourceNotFound(PathBuf),

    /// Listing the source folder failed
    #[error("failed to list {}: {source}", .path.display())]
    Enumerate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating the destination folder or its marker failed
    #[error("failed to prepare destination {}: {source}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another run holds the destination folder
    #[error("destination {} is in use by another run (remove {} if that run is gone)", .path.display(), .marker.display())]
    DestinationBusy { path: PathBuf, marker: PathBuf },
}
