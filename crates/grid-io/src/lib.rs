//! Raster access for zonal statistics.
//!
//! This crate wraps in-memory arrays and GeoTIFF files behind one handle,
//! [`Raster`], that reads windows of a single band:
//!
//! - **Windowed reads**: world bounds are rounded outward to a pixel window
//!   and only that window is materialized
//! - **Boundless reads**: windows may extend past the raster; the excess is
//!   filled with no-data
//! - **Chunk caching**: GeoTIFF strips/tiles are decoded on demand and kept in
//!   an LRU cache
//!
//! # Architecture
//!
//! ```text
//! Raster::read(bounds | window)
//!      │
//!      ├─► bounds → pixel window (floor start, ceil stop)
//!      │
//!      ├─► clip window to raster extent
//!      │         │
//!      │         └─► RasterSource::read_block (ArraySource | GeoTiffSource)
//!      │
//!      ├─► fill the rest with no-data
//!      │
//!      └─► GridView { data, transform at window origin, nodata, mask }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_io::{Raster, RasterInput, RasterOptions, ReadOptions};
//! use zonal_common::BoundingBox;
//!
//! let mut raster = Raster::open(RasterInput::Path("dem.tif".into()), RasterOptions::default())?;
//! let view = raster.read(BoundingBox::new(10.0, 45.0, 11.0, 46.0), ReadOptions::default())?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod raster;
pub mod source;
pub mod types;

pub use cache::{ChunkCache, ChunkKey};
pub use config::GridIoConfig;
pub use error::{GridError, Result};
pub use interpolation::{bilinear, InterpolationMethod, ParseInterpolationError};
pub use raster::{Raster, RasterInput, RasterOptions};
pub use source::{ArraySource, GeoTiffSource, RasterSource};
pub use types::{CacheStats, GridView, ReadOptions, ReadRequest};
