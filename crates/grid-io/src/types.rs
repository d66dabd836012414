//! Core types for windowed raster reads.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use zonal_common::{Affine, BoundingBox, Window};

/// What part of the raster to read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadRequest {
    /// World-space bounds, converted to a pixel window by outward rounding.
    Bounds(BoundingBox),
    /// An explicit pixel window.
    Window(Window),
}

impl From<BoundingBox> for ReadRequest {
    fn from(bounds: BoundingBox) -> Self {
        Self::Bounds(bounds)
    }
}

impl From<Window> for ReadRequest {
    fn from(window: Window) -> Self {
        Self::Window(window)
    }
}

/// Options for a single windowed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Allow windows extending past the raster extent, filling with no-data.
    pub boundless: bool,
    /// Return a validity mask alongside the data.
    pub masked: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            boundless: true,
            masked: false,
        }
    }
}

impl ReadOptions {
    pub fn masked() -> Self {
        Self {
            masked: true,
            ..Self::default()
        }
    }

    pub fn with_boundless(mut self, boundless: bool) -> Self {
        self.boundless = boundless;
        self
    }
}

/// A window of one raster band.
///
/// `transform` always describes this window: its origin is the window's
/// upper-left corner, not the source raster's.
#[derive(Debug, Clone, PartialEq)]
pub struct GridView {
    pub data: Array2<f64>,
    pub transform: Affine,
    pub nodata: Option<f64>,
    /// `true` marks an invalid cell. Present for masked reads.
    pub mask: Option<Array2<bool>>,
    /// 1-based band the view was read from.
    pub band: usize,
}

impl GridView {
    /// `(rows, cols)` of the view.
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// World-space envelope of the view.
    pub fn bounds(&self) -> BoundingBox {
        let (rows, cols) = self.shape();
        Window::full(rows, cols).bounds(&self.transform)
    }

    /// Whether `v` equals the view's no-data value.
    #[inline]
    pub fn is_nodata(&self, v: f64) -> bool {
        matches!(self.nodata, Some(nd) if v == nd)
    }

    /// Cells that must not contribute to statistics: no-data, NaN, or masked.
    pub fn invalid_mask(&self) -> Array2<bool> {
        let mut invalid = self.data.mapv(|v| v.is_nan() || self.is_nodata(v));
        if let Some(mask) = &self.mask {
            invalid.zip_mut_with(mask, |inv, &m| *inv |= m);
        }
        invalid
    }

    /// The value at `(row, col)` if it is in range and valid.
    pub fn valid_value(&self, row: usize, col: usize) -> Option<f64> {
        let v = *self.data.get((row, col))?;
        if v.is_nan() || self.is_nodata(v) {
            return None;
        }
        match &self.mask {
            Some(mask) if mask.get((row, col)).copied().unwrap_or(true) => None,
            _ => Some(v),
        }
    }
}

/// Statistics about the chunk cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn view() -> GridView {
        GridView {
            data: array![[f64::NAN, 12.25], [-999.0, 12.75]],
            transform: Affine::new(1.0, 0.0, 0.0, 0.0, -1.0, 2.0),
            nodata: Some(-999.0),
            mask: None,
            band: 1,
        }
    }

    #[test]
    fn test_invalid_mask() {
        let invalid = view().invalid_mask();
        assert_eq!(invalid, array![[true, false], [true, false]]);
    }

    #[test]
    fn test_valid_value_respects_mask() {
        let mut v = view();
        assert_eq!(v.valid_value(0, 1), Some(12.25));
        assert_eq!(v.valid_value(1, 0), None);
        assert_eq!(v.valid_value(5, 5), None);

        v.mask = Some(array![[false, true], [false, false]]);
        assert_eq!(v.valid_value(0, 1), None);
        assert_eq!(v.valid_value(1, 1), Some(12.75));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(view().bounds(), BoundingBox::new(0.0, 0.0, 2.0, 2.0));
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let mut stats = CacheStats::default();
        assert!((stats.hit_rate() - 0.0).abs() < f64::EPSILON);

        stats.hits = 80;
        stats.misses = 20;
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
    }
}
