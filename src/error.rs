use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The scan root could not be enumerated. Fatal to the session: nothing is
/// loaded and the caller reports it.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Cannot read directory {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),
}

/// One file could not be moved out of the way. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to trash {path:?}: {reason}")]
pub struct TrashError {
    pub path: PathBuf,
    pub reason: String,
}

impl TrashError {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self { path: path.into(), reason: reason.to_string() }
    }
}

/// Decode or resize failure while building a thumbnail. Only logged; the
/// record simply stays without a thumbnail.
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Image {path:?} has an empty dimension ({width}x{height})")]
    Empty { path: PathBuf, width: u32, height: u32 },

    #[error("Decoder panicked on {path:?}")]
    Panicked { path: PathBuf },

    #[error("Resize failed: {0}")]
    Resize(String),
}
