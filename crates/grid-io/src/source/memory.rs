use std::ops::Range;

use ndarray::{s, Array2, Array3, Axis};
use zonal_common::Affine;

use super::RasterSource;
use crate::error::{GridError, Result};

/// An in-memory `(band, row, col)` array.
///
/// In-memory arrays carry no georeferencing of their own; the transform and
/// no-data value come from the open options.
#[derive(Debug, Clone)]
pub struct ArraySource {
    bands: Array3<f64>,
    mask: Option<Array2<bool>>,
}

impl ArraySource {
    /// Wrap a single-band array.
    pub fn from_2d(data: Array2<f64>) -> Self {
        Self {
            bands: data.insert_axis(Axis(0)),
            mask: None,
        }
    }

    pub fn from_3d(bands: Array3<f64>) -> Self {
        Self { bands, mask: None }
    }

    /// Attach a dataset-level mask shared by all bands (`true` = invalid).
    pub fn with_mask(mut self, mask: Array2<bool>) -> Result<Self> {
        if mask.dim() != self.shape() {
            return Err(GridError::open_failed(format!(
                "mask shape {:?} does not match raster shape {:?}",
                mask.dim(),
                self.shape()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }
}

impl RasterSource for ArraySource {
    fn shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.bands.dim();
        (rows, cols)
    }

    fn band_count(&self) -> usize {
        self.bands.dim().0
    }

    fn transform(&self) -> Option<Affine> {
        None
    }

    fn nodata(&self) -> Option<f64> {
        None
    }

    fn read_block(
        &mut self,
        band: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<Array2<f64>> {
        if band == 0 || band > self.band_count() {
            return Err(GridError::InvalidBand {
                band,
                count: self.band_count(),
            });
        }
        Ok(self
            .bands
            .slice(s![band - 1, rows.start..rows.end, cols.start..cols.end])
            .to_owned())
    }

    fn has_dataset_mask(&self) -> bool {
        self.mask.is_some()
    }

    fn read_mask(&mut self, rows: Range<usize>, cols: Range<usize>) -> Result<Option<Array2<bool>>> {
        Ok(self
            .mask
            .as_ref()
            .map(|m| m.slice(s![rows.start..rows.end, cols.start..cols.end]).to_owned()))
    }

    fn describe(&self) -> String {
        let (bands, rows, cols) = self.bands.dim();
        format!("in-memory array ({bands} x {rows} x {cols})")
    }
}
