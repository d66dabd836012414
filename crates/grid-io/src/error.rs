//! Error types for raster access.

use thiserror::Error;

/// Errors that can occur while opening or reading a raster.
#[derive(Error, Debug)]
pub enum GridError {
    /// Failed to open the raster source.
    #[error("failed to open raster: {0}")]
    OpenFailed(String),

    /// Failed to read data from the raster.
    #[error("failed to read raster data: {0}")]
    ReadFailed(String),

    /// The requested window extends outside the raster and boundless reads are off.
    #[error("requested window {requested} is outside raster extent {grid}")]
    OutOfBounds { requested: String, grid: String },

    /// An in-memory array was supplied without a transform.
    #[error("an affine transform is required when reading from an in-memory array")]
    MissingTransform,

    /// The transform cannot map world coordinates back to pixels.
    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    /// Band numbers are 1-based and must exist in the source.
    #[error("band {band} does not exist (raster has {count} band(s))")]
    InvalidBand { band: usize, count: usize },

    /// The pixel layout of the file is not supported.
    #[error("unsupported raster format: {0}")]
    UnsupportedFormat(String),

    /// The handle was used after `close()`.
    #[error("raster handle is closed")]
    Closed,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GridError {
    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(requested: impl Into<String>, grid: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            grid: grid.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }
}

impl From<tiff::TiffError> for GridError {
    fn from(err: tiff::TiffError) -> Self {
        match err {
            tiff::TiffError::IoError(e) => Self::Io(e),
            tiff::TiffError::UnsupportedError(e) => Self::UnsupportedFormat(e.to_string()),
            other => Self::ReadFailed(other.to_string()),
        }
    }
}

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, GridError>;
