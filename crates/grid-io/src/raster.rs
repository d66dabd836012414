//! The raster handle: one open source plus the georeferencing used to read it.

use std::path::PathBuf;

use ndarray::{s, Array2, Array3};
use tracing::{debug, warn};
use zonal_common::{Affine, Window};

use crate::config::GridIoConfig;
use crate::error::{GridError, Result};
use crate::source::{ArraySource, GeoTiffSource, RasterSource};
use crate::types::{CacheStats, GridView, ReadOptions, ReadRequest};

/// Where raster cells come from.
pub enum RasterInput {
    /// A GeoTIFF file.
    Path(PathBuf),
    /// A single-band in-memory grid.
    Array(Array2<f64>),
    /// A multi-band in-memory grid, `(band, row, col)`.
    Bands(Array3<f64>),
    /// An in-memory grid with a dataset-level mask (`true` = invalid).
    Masked { data: Array2<f64>, mask: Array2<bool> },
    /// Any other pixel store.
    Source(Box<dyn RasterSource>),
}

impl RasterInput {
    fn is_in_memory(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Bands(_) | Self::Masked { .. })
    }
}

impl std::fmt::Debug for RasterInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Array(a) => f.debug_tuple("Array").field(&a.dim()).finish(),
            Self::Bands(a) => f.debug_tuple("Bands").field(&a.dim()).finish(),
            Self::Masked { data, .. } => f.debug_struct("Masked").field("shape", &data.dim()).finish(),
            Self::Source(s) => f.debug_tuple("Source").field(&s.describe()).finish(),
        }
    }
}

impl From<PathBuf> for RasterInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&std::path::Path> for RasterInput {
    fn from(path: &std::path::Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Array2<f64>> for RasterInput {
    fn from(data: Array2<f64>) -> Self {
        Self::Array(data)
    }
}

impl From<Array3<f64>> for RasterInput {
    fn from(data: Array3<f64>) -> Self {
        Self::Bands(data)
    }
}

/// Options applied when opening a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    /// Transform override; required for in-memory inputs.
    pub affine: Option<Affine>,
    /// Deprecated GDAL-ordered geotransform, used only when `affine` is unset.
    pub gdal_transform: Option<[f64; 6]>,
    /// No-data override.
    pub nodata: Option<f64>,
    /// 1-based band to read.
    pub band: usize,
    pub config: GridIoConfig,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            affine: None,
            gdal_transform: None,
            nodata: None,
            band: 1,
            config: GridIoConfig::default(),
        }
    }
}

impl RasterOptions {
    pub fn with_affine(mut self, affine: Affine) -> Self {
        self.affine = Some(affine);
        self
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_band(mut self, band: usize) -> Self {
        self.band = band;
        self
    }

    pub fn with_config(mut self, config: GridIoConfig) -> Self {
        self.config = config;
        self
    }

    fn resolve_affine(&self) -> Option<Affine> {
        if let Some(gt) = self.gdal_transform {
            warn!(
                transform = ?gt,
                "GDAL-style transforms are deprecated; pass an Affine instead"
            );
            if self.affine.is_none() {
                return Some(Affine::from_gdal(gt));
            }
        }
        self.affine
    }
}

/// An open raster band with its transform and no-data value.
///
/// The handle owns the underlying source and releases it on [`close`](Self::close)
/// or drop. A handle is meant for one pipeline at a time.
pub struct Raster {
    source: Option<Box<dyn RasterSource>>,
    shape: (usize, usize),
    transform: Affine,
    nodata: Option<f64>,
    band: usize,
    config: GridIoConfig,
    warned_missing_nodata: bool,
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("source", &self.source.as_ref().map(|s| s.describe()))
            .field("shape", &self.shape)
            .field("transform", &self.transform)
            .field("nodata", &self.nodata)
            .field("band", &self.band)
            .finish()
    }
}

impl Raster {
    /// Open a raster source.
    ///
    /// In-memory inputs need a transform in `options`; file and custom sources
    /// fall back to their own transform and no-data value unless overridden.
    pub fn open(input: RasterInput, options: RasterOptions) -> Result<Self> {
        options.config.validate().map_err(GridError::Config)?;

        let affine = options.resolve_affine();
        if input.is_in_memory() && affine.is_none() {
            return Err(GridError::MissingTransform);
        }

        let source: Box<dyn RasterSource> = match input {
            RasterInput::Path(path) => Box::new(GeoTiffSource::open(
                &path,
                options.config.chunk_cache_size_bytes(),
            )?),
            RasterInput::Array(data) => Box::new(ArraySource::from_2d(data)),
            RasterInput::Bands(data) => Box::new(ArraySource::from_3d(data)),
            RasterInput::Masked { data, mask } => Box::new(ArraySource::from_2d(data).with_mask(mask)?),
            RasterInput::Source(source) => source,
        };

        let transform = affine
            .or_else(|| source.transform())
            .ok_or_else(|| GridError::open_failed(format!("{} has no georeferencing", source.describe())))?;
        transform
            .validate()
            .map_err(|e| GridError::InvalidTransform(e.to_string()))?;

        let count = source.band_count();
        if options.band == 0 || options.band > count {
            return Err(GridError::InvalidBand {
                band: options.band,
                count,
            });
        }

        let nodata = options.nodata.or_else(|| source.nodata());
        let shape = source.shape();
        debug!(
            source = %source.describe(),
            rows = shape.0,
            cols = shape.1,
            band = options.band,
            nodata = ?nodata,
            "Opened raster"
        );

        Ok(Self {
            source: Some(source),
            shape,
            transform,
            nodata,
            band: options.band,
            config: options.config,
            warned_missing_nodata: false,
        })
    }

    /// `(rows, cols)` of the raster.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn band(&self) -> usize {
        self.band
    }

    /// `(row, col)` of the cell containing world coordinate `(x, y)`.
    pub fn index(&self, x: f64, y: f64) -> (isize, isize) {
        let (col, row) = self.transform.to_pixel(x, y);
        (row.floor() as isize, col.floor() as isize)
    }

    /// Read a window of the selected band.
    ///
    /// With `boundless` set, cells outside the raster are filled with the
    /// no-data value (or the configured sentinel when there is none). When
    /// the source has a dataset mask the read is always masked.
    pub fn read(&mut self, request: impl Into<ReadRequest>, options: ReadOptions) -> Result<GridView> {
        let window = match request.into() {
            ReadRequest::Bounds(bounds) => Window::from_bounds(&bounds, &self.transform),
            ReadRequest::Window(window) => window,
        };
        let (rows, cols) = self.shape;

        if !options.boundless && !window.is_within(rows, cols) {
            return Err(GridError::out_of_bounds(
                window.to_string(),
                Window::full(rows, cols).to_string(),
            ));
        }

        let fill = match self.nodata {
            Some(nodata) => nodata,
            None => {
                if !self.warned_missing_nodata {
                    warn!(
                        sentinel = self.config.nodata_sentinel,
                        "Raster has no nodata value; using sentinel for cells outside the raster"
                    );
                    self.warned_missing_nodata = true;
                }
                self.config.nodata_sentinel
            }
        };

        let source = self.source.as_mut().ok_or(GridError::Closed)?;
        let has_dataset_mask = source.has_dataset_mask();
        let masked = if has_dataset_mask && !options.masked {
            warn!(
                source = %source.describe(),
                "Source has a dataset mask; returning a masked read"
            );
            true
        } else {
            options.masked
        };

        let (height, width) = window.shape();
        let mut data = Array2::from_elem((height, width), fill);
        let mut outside = Array2::from_elem((height, width), true);
        let mut dataset_mask = None;

        if let Some(inner) = window.clip(rows, cols) {
            let row_range = inner.row_start as usize..inner.row_stop as usize;
            let col_range = inner.col_start as usize..inner.col_stop as usize;
            let r0 = (inner.row_start - window.row_start) as usize;
            let c0 = (inner.col_start - window.col_start) as usize;
            let (h, w) = inner.shape();

            let block = source.read_block(self.band, row_range.clone(), col_range.clone())?;
            data.slice_mut(s![r0..r0 + h, c0..c0 + w]).assign(&block);
            outside.slice_mut(s![r0..r0 + h, c0..c0 + w]).fill(false);

            if masked {
                if let Some(block_mask) = source.read_mask(row_range, col_range)? {
                    let mut full = Array2::from_elem((height, width), false);
                    full.slice_mut(s![r0..r0 + h, c0..c0 + w]).assign(&block_mask);
                    dataset_mask = Some(full);
                }
            }
        }

        let mut view = GridView {
            data,
            transform: window.transform(&self.transform),
            nodata: Some(fill),
            mask: None,
            band: self.band,
        };

        if masked {
            let mut mask = view.invalid_mask();
            mask.zip_mut_with(&outside, |m, &o| *m |= o);
            if let Some(dm) = dataset_mask {
                mask.zip_mut_with(&dm, |m, &d| *m |= d);
            }
            view.mask = Some(mask);
        }

        Ok(view)
    }

    /// Chunk cache statistics, for file-backed sources.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.source.as_ref().and_then(|s| s.cache_stats())
    }

    /// Release the underlying source. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(source) = self.source.take() {
            debug!(source = %source.describe(), "Closed raster");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

impl Drop for Raster {
    fn drop(&mut self) {
        self.close();
    }
}
