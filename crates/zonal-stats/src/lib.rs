//! Zonal statistics and point queries of rasters over vector geometries.
//!
//! Two pipelines share the same inputs: a vector source (GeoJSON, WKT, WKB,
//! files, geometries or features) and a raster (a GeoTIFF path or an
//! in-memory array plus an [`Affine`](zonal_common::Affine)).
//!
//! - [`gen_zonal_stats`] summarizes the cells each geometry covers
//! - [`gen_point_query`] samples the raster at each geometry vertex
//!
//! Both are lazy and yield one result per input feature, in input order.
//! Configuration errors surface before the first feature is read.
//!
//! # Architecture
//!
//! ```text
//! VectorInput ─► read_features ─► Feature ─┬─► zonal: bounds ─► Raster::read ─► coverage mask ─► Reducer
//!                                          │
//!                                          └─► point: vertices ─► 2x2 / 1x1 window ─► bilinear | nearest
//! ```
//!
//! # Example
//!
//! ```ignore
//! use zonal_stats::{zonal_stats, ZonalOptions};
//!
//! let results = zonal_stats("polygons.geojson", std::path::PathBuf::from("dem.tif"),
//!     ZonalOptions::new().with_stats("min max median"))?;
//! ```

pub mod error;
pub mod export;
pub mod features;
pub mod mask;
pub mod point;
pub mod split;
pub mod stats;
pub mod wkb;
pub mod zonal;

pub use error::{Result, ZonalError};
pub use export::stats_to_csv;
pub use features::{parse_geojson_text, read_features, Feature, FeatureIter, Properties, VectorInput};
pub use mask::{
    boxify_points, coverage_mask, pixel_coverage, rasterize_geom, rasterize_pct_cover, rasterize_pixels, to_pixel_space,
    CoverageMask,
};
pub use point::{
    gen_point_query, point_query, point_window_unitxy, PointOptions, PointOutput, PointQueryIter, PointValue,
};
pub use split::{split_geometry, split_pieces, SplitPiece};
pub use stats::{
    check_stats, get_percentile, AddStat, CategoryMap, MaskedArray, PixelValue, Stat, StatKey, StatSelection,
    StatValue, ZonalStats, ZoneFn, DEFAULT_STATS, VALID_STATS,
};
pub use wkb::{read_hex_wkb, read_wkb};
pub use zonal::{gen_zonal_stats, zonal_stats, MiniRaster, ZonalOptions, ZonalOutput, ZonalStatsIter, ZoneResult};

pub use grid_io::{GridIoConfig, InterpolationMethod, RasterInput};
pub use zonal_common::Affine;
