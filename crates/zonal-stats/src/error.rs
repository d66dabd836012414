//! Error types for zonal statistics and point queries.

use grid_io::GridError;
use thiserror::Error;

/// Errors raised by the zonal pipelines.
///
/// Configuration problems are reported before any feature is processed.
/// Per-feature data conditions (no overlap, all no-data) are never errors.
#[derive(Error, Debug)]
pub enum ZonalError {
    /// Unknown statistic name.
    #[error("stat `{name}` not valid; must be one of {valid}")]
    InvalidStat { name: String, valid: String },

    /// Malformed or out-of-range `percentile_<q>` name.
    #[error("invalid percentile `{0}`: {1}")]
    InvalidPercentile(String, String),

    /// Options that cannot be combined.
    #[error("incompatible options: {0}")]
    IncompatibleOptions(String),

    /// An option value outside its allowed range.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Geometry unsuitable for the requested operation.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The vector input is empty or not a recognized source of features.
    #[error("invalid features: {0}")]
    InvalidFeatures(String),

    /// Unknown interpolation method.
    #[error(transparent)]
    InvalidInterpolation(#[from] grid_io::ParseInterpolationError),

    /// Malformed well-known binary.
    #[error("invalid WKB: {0}")]
    Wkb(String),

    /// Raster open or read failure.
    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ZonalError {
    /// Create an InvalidStat error listing the valid names.
    pub fn invalid_stat(name: impl Into<String>, valid: &[&str]) -> Self {
        Self::InvalidStat {
            name: name.into(),
            valid: valid.join(", "),
        }
    }

    /// Create an InvalidPercentile error.
    pub fn invalid_percentile(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPercentile(name.into(), reason.into())
    }

    /// Create an IncompatibleOptions error.
    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::IncompatibleOptions(msg.into())
    }

    /// Create an InvalidGeometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create an InvalidFeatures error.
    pub fn invalid_features(msg: impl Into<String>) -> Self {
        Self::InvalidFeatures(msg.into())
    }

    /// Whether this error is a configuration problem rather than I/O.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidStat { .. }
                | Self::InvalidPercentile(..)
                | Self::IncompatibleOptions(_)
                | Self::InvalidOption(_)
                | Self::InvalidInterpolation(_)
                | Self::Grid(GridError::MissingTransform)
        )
    }
}

impl From<geojson::Error> for ZonalError {
    fn from(err: geojson::Error) -> Self {
        Self::InvalidFeatures(err.to_string())
    }
}

/// Result type for zonal operations.
pub type Result<T> = std::result::Result<T, ZonalError>;
