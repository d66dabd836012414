//! The zonal statistics pipeline.
//!
//! ```text
//! feature ─► boxify points ─► pixel space ─► split (optional) ─┬─► owned window ─► boundless read
//!                                                               ├─► coverage mask
//!                                                               ├─► validity mask (nodata | NaN | dataset mask | uncovered)
//!                                                               ├─► zone fn ─► reduce ─► nodata/nan ─► custom stats
//!                                                               └─► recombine pieces ─► prefix ─► output
//! ```
//!
//! Geometry is moved into the raster's pixel space once per feature, so every
//! piece is rasterized against the same grid. Splitting cuts on whole pixels
//! and each piece reads only the window it owns, which keeps cells on a seam
//! from being counted twice.

use geo::{BoundingRect, Geometry};
use grid_io::{GridIoConfig, Raster, RasterInput, RasterOptions, ReadOptions};
use ndarray::Array2;
use serde_json::Value;
use tracing::{debug, warn};
use zonal_common::{Affine, Window};

use crate::error::{Result, ZonalError};
use crate::features::{read_features, Feature, FeatureIter, Properties, VectorInput};
use crate::mask::{
    boxify_points, is_point_like, pixel_coverage, to_pixel_space, CoverageMask, DEFAULT_PERCENT_COVER_SCALE,
};
use crate::split::{check_split_compatibility, split_pieces, SplitPiece};
use crate::stats::{
    check_stats, count_nodata_nan, AddStat, CategoryMap, MaskedArray, Reducer, Stat, StatSelection,
    StatValue, ZonalStats, ZoneFn,
};

/// Options for [`gen_zonal_stats`].
pub struct ZonalOptions {
    /// 1-based band.
    pub band: usize,
    /// No-data override.
    pub nodata: Option<f64>,
    /// Transform; required for in-memory rasters.
    pub affine: Option<Affine>,
    pub stats: StatSelection,
    pub all_touched: bool,
    pub categorical: bool,
    pub category_map: Option<CategoryMap>,
    pub add_stats: Vec<(String, AddStat)>,
    pub zone_fn: Option<ZoneFn>,
    /// Attach the masked window and its transform to each result.
    pub raster_out: bool,
    pub prefix: Option<String>,
    /// Emit input features with stats merged into their properties.
    pub geojson_out: bool,
    pub boundless: bool,
    /// Pixel budget per window; larger geometries are split.
    pub limit: Option<usize>,
    pub percent_cover_scale: Option<usize>,
    /// Minimum covered fraction for a cell to count.
    pub percent_cover_selection: Option<f64>,
    /// Weight count, sum and mean by covered fraction.
    pub percent_cover_weighting: bool,
    pub config: GridIoConfig,

    /// Deprecated: GDAL-ordered geotransform, use `affine`.
    pub transform: Option<[f64; 6]>,
    /// Deprecated: use `nodata`.
    pub nodata_value: Option<f64>,
    /// Deprecated: use `geojson_out`.
    pub copy_properties: bool,
}

impl Default for ZonalOptions {
    fn default() -> Self {
        Self {
            band: 1,
            nodata: None,
            affine: None,
            stats: StatSelection::Default,
            all_touched: false,
            categorical: false,
            category_map: None,
            add_stats: Vec::new(),
            zone_fn: None,
            raster_out: false,
            prefix: None,
            geojson_out: false,
            boundless: true,
            limit: None,
            percent_cover_scale: None,
            percent_cover_selection: None,
            percent_cover_weighting: false,
            config: GridIoConfig::default(),
            transform: None,
            nodata_value: None,
            copy_properties: false,
        }
    }
}

impl std::fmt::Debug for ZonalOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZonalOptions")
            .field("band", &self.band)
            .field("nodata", &self.nodata)
            .field("affine", &self.affine)
            .field("stats", &self.stats)
            .field("all_touched", &self.all_touched)
            .field("categorical", &self.categorical)
            .field("add_stats", &self.add_stats.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("zone_fn", &self.zone_fn.is_some())
            .field("prefix", &self.prefix)
            .field("geojson_out", &self.geojson_out)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl ZonalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_band(mut self, band: usize) -> Self {
        self.band = band;
        self
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    pub fn with_affine(mut self, affine: Affine) -> Self {
        self.affine = Some(affine);
        self
    }

    pub fn with_stats(mut self, stats: impl Into<StatSelection>) -> Self {
        self.stats = stats.into();
        self
    }

    pub fn with_all_touched(mut self, all_touched: bool) -> Self {
        self.all_touched = all_touched;
        self
    }

    pub fn with_categorical(mut self, categorical: bool) -> Self {
        self.categorical = categorical;
        self
    }

    pub fn with_category_map(mut self, category_map: CategoryMap) -> Self {
        self.category_map = Some(category_map);
        self
    }

    pub fn with_add_stat(mut self, name: impl Into<String>, stat: AddStat) -> Self {
        self.add_stats.push((name.into(), stat));
        self
    }

    pub fn with_zone_fn(mut self, zone_fn: impl FnMut(&mut MaskedArray) + 'static) -> Self {
        self.zone_fn = Some(Box::new(zone_fn));
        self
    }

    pub fn with_raster_out(mut self, raster_out: bool) -> Self {
        self.raster_out = raster_out;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_geojson_out(mut self, geojson_out: bool) -> Self {
        self.geojson_out = geojson_out;
        self
    }

    pub fn with_boundless(mut self, boundless: bool) -> Self {
        self.boundless = boundless;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_percent_cover_scale(mut self, scale: usize) -> Self {
        self.percent_cover_scale = Some(scale);
        self
    }

    pub fn with_percent_cover_selection(mut self, selection: f64) -> Self {
        self.percent_cover_selection = Some(selection);
        self
    }

    pub fn with_percent_cover_weighting(mut self, weighting: bool) -> Self {
        self.percent_cover_weighting = weighting;
        self
    }

    pub fn with_config(mut self, config: GridIoConfig) -> Self {
        self.config = config;
        self
    }

    fn resolve_deprecated(&mut self) {
        if let Some(gt) = self.transform.take() {
            warn!(
                transform = ?gt,
                "GDAL-style transforms are deprecated; use `affine` instead"
            );
            if self.affine.is_none() {
                self.affine = Some(Affine::from_gdal(gt));
            }
        }
        if let Some(nodata) = self.nodata_value.take() {
            warn!(nodata, "`nodata_value` is deprecated; use `nodata` instead");
            if self.nodata.is_none() {
                self.nodata = Some(nodata);
            }
        }
        if self.copy_properties {
            warn!("`copy_properties` is deprecated; use `geojson_out` to keep feature properties");
            self.geojson_out = true;
        }
    }

    fn percent_cover(&self) -> Result<Option<PercentCover>> {
        if self.percent_cover_scale.is_none()
            && self.percent_cover_selection.is_none()
            && !self.percent_cover_weighting
        {
            return Ok(None);
        }

        let scale = self.percent_cover_scale.unwrap_or(DEFAULT_PERCENT_COVER_SCALE);
        if scale < 1 {
            return Err(ZonalError::InvalidOption(format!(
                "percent_cover_scale must be >= 1, got {scale}"
            )));
        }
        if let Some(selection) = self.percent_cover_selection {
            if !(0.0..=1.0).contains(&selection) {
                return Err(ZonalError::InvalidOption(format!(
                    "percent_cover_selection must be between 0 and 1, got {selection}"
                )));
            }
        }

        Ok(Some(PercentCover {
            scale,
            selection: self.percent_cover_selection.unwrap_or(0.0),
            weighting: self.percent_cover_weighting,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PercentCover {
    scale: usize,
    selection: f64,
    weighting: bool,
}

/// The masked window behind one zone's statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct MiniRaster {
    pub array: MaskedArray,
    pub affine: Affine,
    pub nodata: Option<f64>,
}

impl MiniRaster {
    /// Rows of values with masked cells as `null`.
    pub fn array_json(&self) -> Value {
        let rows = self
            .array
            .data
            .outer_iter()
            .zip(self.array.mask.outer_iter())
            .map(|(values, mask)| {
                let row = values
                    .iter()
                    .zip(mask.iter())
                    .map(|(&v, &m)| if m { Value::Null } else { StatValue::Float(v).to_json() })
                    .collect();
                Value::Array(row)
            })
            .collect();
        Value::Array(rows)
    }

    fn properties(&self, prefix: &str) -> Properties {
        let mut properties = Properties::new();
        properties.insert(format!("{prefix}mini_raster_array"), self.array_json());
        properties.insert(
            format!("{prefix}mini_raster_affine"),
            Value::from(self.affine.coefficients().to_vec()),
        );
        properties.insert(
            format!("{prefix}mini_raster_nodata"),
            StatValue::from(self.nodata).to_json(),
        );
        properties
    }
}

/// Statistics for one feature.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneResult {
    pub stats: ZonalStats,
    pub mini_raster: Option<MiniRaster>,
}

/// One pipeline output, matching the input feature at the same position.
#[derive(Debug, Clone, PartialEq)]
pub enum ZonalOutput {
    Stats(ZoneResult),
    /// The input feature with stats merged into its properties.
    Feature(geojson::Feature),
}

impl ZonalOutput {
    pub fn stats(&self) -> Option<&ZonalStats> {
        match self {
            Self::Stats(result) => Some(&result.stats),
            Self::Feature(_) => None,
        }
    }

    pub fn into_stats(self) -> Option<ZonalStats> {
        match self {
            Self::Stats(result) => Some(result.stats),
            Self::Feature(_) => None,
        }
    }

    pub fn into_feature(self) -> Option<geojson::Feature> {
        match self {
            Self::Feature(feature) => Some(feature),
            Self::Stats(_) => None,
        }
    }
}

/// Lazily compute zonal statistics for each feature of `vectors`.
///
/// Options, the raster and the vector source are validated before anything
/// is yielded. The returned iterator owns the raster handle and closes it when
/// dropped; it stops after the first error.
pub fn gen_zonal_stats(
    vectors: impl Into<VectorInput>,
    raster: impl Into<RasterInput>,
    mut options: ZonalOptions,
) -> Result<ZonalStatsIter> {
    options.resolve_deprecated();

    let stats = check_stats(&options.stats, options.categorical)?;
    let percent_cover = options.percent_cover()?;
    if let Some(limit) = options.limit {
        if limit == 0 {
            return Err(ZonalError::InvalidOption("limit must be > 0".to_string()));
        }
        check_split_compatibility(&stats, !options.add_stats.is_empty(), options.raster_out)?;
    }

    let mut raster_options = RasterOptions::default()
        .with_band(options.band)
        .with_nodata(options.nodata)
        .with_config(options.config.clone());
    if let Some(affine) = options.affine {
        raster_options = raster_options.with_affine(affine);
    }
    let raster = Raster::open(raster.into(), raster_options)?;
    let features = read_features(vectors.into())?;

    debug!(
        stats = ?stats.iter().map(Stat::name).collect::<Vec<_>>(),
        categorical = options.categorical,
        all_touched = options.all_touched,
        limit = ?options.limit,
        "Starting zonal stats"
    );

    let reducer = Reducer::new(stats.clone(), options.categorical)
        .with_category_map(options.category_map.take());

    Ok(ZonalStatsIter {
        features,
        raster,
        reducer,
        wants_nodata: stats.contains(&Stat::Nodata),
        wants_nan: stats.contains(&Stat::Nan),
        add_stats: options.add_stats,
        zone_fn: options.zone_fn,
        all_touched: options.all_touched,
        raster_out: options.raster_out,
        prefix: options.prefix,
        geojson_out: options.geojson_out,
        boundless: options.boundless,
        limit: options.limit,
        percent_cover,
        index: 0,
        done: false,
    })
}

/// Compute zonal statistics for every feature.
pub fn zonal_stats(
    vectors: impl Into<VectorInput>,
    raster: impl Into<RasterInput>,
    options: ZonalOptions,
) -> Result<Vec<ZonalOutput>> {
    gen_zonal_stats(vectors, raster, options)?.collect()
}

/// Single-pass iterator over per-feature results.
pub struct ZonalStatsIter {
    features: FeatureIter,
    raster: Raster,
    reducer: Reducer,
    wants_nodata: bool,
    wants_nan: bool,
    add_stats: Vec<(String, AddStat)>,
    zone_fn: Option<ZoneFn>,
    all_touched: bool,
    raster_out: bool,
    prefix: Option<String>,
    geojson_out: bool,
    boundless: bool,
    limit: Option<usize>,
    percent_cover: Option<PercentCover>,
    index: usize,
    done: bool,
}

struct PieceResult {
    stats: ZonalStats,
    mini_raster: Option<MiniRaster>,
}

impl ZonalStatsIter {
    /// The open raster.
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    fn process(&mut self, feature: Feature) -> Result<ZonalOutput> {
        let index = self.index;
        self.index += 1;

        let result = match &feature.geometry {
            Some(geometry) => self.zone(geometry, &feature.properties)?,
            None => {
                debug!(feature = index, "Feature has no geometry");
                self.empty_piece(&feature.properties, false)
            }
        };

        let prefix = self.prefix.as_deref().unwrap_or("");
        let stats = match prefix {
            "" => result.stats,
            p => result.stats.prefixed(p),
        };

        if !self.geojson_out {
            return Ok(ZonalOutput::Stats(ZoneResult {
                stats,
                mini_raster: result.mini_raster,
            }));
        }

        let mut out = feature.to_geojson();
        let properties = out.properties.get_or_insert_with(Properties::new);
        properties.extend(stats.to_properties());
        if let Some(mini) = &result.mini_raster {
            properties.extend(mini.properties(prefix));
        }
        Ok(ZonalOutput::Feature(out))
    }

    fn zone(&mut self, geometry: &Geometry<f64>, properties: &Properties) -> Result<PieceResult> {
        let transform = self.raster.transform();
        let geometry = if is_point_like(geometry) {
            Geometry::MultiPolygon(boxify_points(geometry, &transform)?)
        } else {
            geometry.clone()
        };

        let pixels = to_pixel_space(&geometry, &transform);
        let pieces = match self.limit {
            Some(limit) => split_pieces(&pixels, limit, (1.0, 1.0), Some((0.0, 0.0))),
            None => pixels
                .bounding_rect()
                .map(|bounds| vec![SplitPiece { geometry: pixels, bounds }])
                .unwrap_or_default(),
        };

        match pieces.as_slice() {
            [] => Ok(self.empty_piece(properties, false)),
            [single] => self.piece(single, properties, false),
            many => {
                let partials = many
                    .iter()
                    .map(|piece| self.piece(piece, properties, true).map(|r| r.stats))
                    .collect::<Result<Vec<_>>>()?;
                debug!(feature = self.index - 1, pieces = partials.len(), "Recombining split pieces");
                Ok(PieceResult {
                    stats: self.reducer.recombine(&partials),
                    mini_raster: None,
                })
            }
        }
    }

    fn piece(&mut self, piece: &SplitPiece, properties: &Properties, partial: bool) -> Result<PieceResult> {
        let (min, max) = (piece.bounds.min(), piece.bounds.max());
        let window = Window::from_pixel_extent(min.x, min.y, max.x, max.y);
        let view = self
            .raster
            .read(window, ReadOptions::default().with_boundless(self.boundless))?;

        let coverage = pixel_coverage(
            &piece.geometry,
            &window,
            self.all_touched,
            self.percent_cover.map(|p| p.scale),
        );
        let covered = coverage.covered_above(self.percent_cover.map_or(0.0, |p| p.selection));

        let mut mask = view.invalid_mask();
        mask.zip_mut_with(&covered, |m, &c| *m |= !c);
        let mut array = MaskedArray::new(view.data.clone(), mask);
        if let Some(zone_fn) = self.zone_fn.as_mut() {
            zone_fn(&mut array);
        }

        let weights = match self.percent_cover {
            Some(p) if p.weighting => Some(coverage.fractions()),
            _ => None,
        };
        let mut stats = if partial {
            self.reducer.reduce_piece(&array, weights.as_ref())
        } else {
            self.reducer.reduce(&array, weights.as_ref())
        };

        if self.wants_nodata || self.wants_nan {
            let (nodata, nan) = count_nodata_nan(&view, &covered);
            if self.wants_nodata {
                stats.insert_stat("nodata", nodata);
            }
            if self.wants_nan {
                stats.insert_stat("nan", nan);
            }
        }

        for (name, add_stat) in &self.add_stats {
            stats.insert_stat(name.clone(), add_stat.call(&array, properties, &coverage));
        }

        debug!(
            window = ?view.shape(),
            valid = array.count(),
            "Reduced zone"
        );

        let mini_raster = self.raster_out.then(|| MiniRaster {
            array,
            affine: view.transform,
            nodata: view.nodata,
        });

        Ok(PieceResult { stats, mini_raster })
    }

    /// Result for a zone that covers no cells.
    fn empty_piece(&self, properties: &Properties, partial: bool) -> PieceResult {
        let array = MaskedArray::new(Array2::zeros((0, 0)), Array2::from_elem((0, 0), true));
        let mut stats = if partial {
            self.reducer.reduce_piece(&array, None)
        } else {
            self.reducer.reduce(&array, None)
        };
        if self.wants_nodata {
            stats.insert_stat("nodata", 0i64);
        }
        if self.wants_nan {
            stats.insert_stat("nan", 0i64);
        }

        let coverage = CoverageMask::Binary(Array2::from_elem((0, 0), false));
        for (name, add_stat) in &self.add_stats {
            stats.insert_stat(name.clone(), add_stat.call(&array, properties, &coverage));
        }

        PieceResult {
            stats,
            mini_raster: None,
        }
    }
}

impl Iterator for ZonalStatsIter {
    type Item = Result<ZonalOutput>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.features.next()? {
            Ok(feature) => self.process(feature),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

impl std::iter::FusedIterator for ZonalStatsIter {}
