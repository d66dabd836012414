//! Raster sources: the pixel stores a [`Raster`](crate::Raster) reads from.
//!
//! A source only answers in-range block reads. Boundless filling, no-data
//! handling and transform bookkeeping live in the `Raster` handle so every
//! source behaves the same way.

mod geotiff;
mod memory;

pub use geotiff::GeoTiffSource;
pub use memory::ArraySource;

use std::ops::Range;

use ndarray::Array2;
use zonal_common::Affine;

use crate::error::Result;
use crate::types::CacheStats;

/// A readable 2D/3D grid addressed by row/column ranges.
pub trait RasterSource {
    /// `(rows, cols)` of every band.
    fn shape(&self) -> (usize, usize);

    fn band_count(&self) -> usize;

    /// Transform stored with the source, if any.
    fn transform(&self) -> Option<Affine>;

    /// No-data value stored with the source, if any.
    fn nodata(&self) -> Option<f64>;

    /// Read an in-range block of a 1-based band.
    fn read_block(&mut self, band: usize, rows: Range<usize>, cols: Range<usize>)
        -> Result<Array2<f64>>;

    /// Whether the source carries a dataset-level validity mask.
    fn has_dataset_mask(&self) -> bool {
        false
    }

    /// Read an in-range block of the dataset mask (`true` = invalid).
    fn read_mask(&mut self, _rows: Range<usize>, _cols: Range<usize>) -> Result<Option<Array2<bool>>> {
        Ok(None)
    }

    /// Chunk cache statistics for sources that cache decoded data.
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }

    /// Short human readable description for logs and errors.
    fn describe(&self) -> String;
}
