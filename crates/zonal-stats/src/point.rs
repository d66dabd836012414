//! Raster values at the vertices of vector geometries.

use geo::CoordsIter;
use grid_io::{bilinear, GridIoConfig, InterpolationMethod, Raster, RasterInput, RasterOptions, ReadOptions};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use zonal_common::{Affine, Window};

use crate::error::Result;
use crate::features::{read_features, Feature, FeatureIter, Properties, VectorInput};

/// Options for [`gen_point_query`].
#[derive(Debug, Clone)]
pub struct PointOptions {
    pub band: usize,
    pub nodata: Option<f64>,
    pub affine: Option<Affine>,
    /// `bilinear` or `nearest`.
    pub interpolate: String,
    /// Property that receives the values when `geojson_out` is set.
    pub property_name: String,
    pub geojson_out: bool,
    pub config: GridIoConfig,
}

impl Default for PointOptions {
    fn default() -> Self {
        Self {
            band: 1,
            nodata: None,
            affine: None,
            interpolate: InterpolationMethod::Bilinear.to_string(),
            property_name: "value".to_string(),
            geojson_out: false,
            config: GridIoConfig::default(),
        }
    }
}

impl PointOptions {
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

    pub fn with_interpolate(mut self, method: impl Into<String>) -> Self {
        self.interpolate = method.into();
        self
    }

    pub fn with_property_name(mut self, name: impl Into<String>) -> Self {
        self.property_name = name.into();
        self
    }

    pub fn with_geojson_out(mut self, geojson_out: bool) -> Self {
        self.geojson_out = geojson_out;
        self
    }

    pub fn with_config(mut self, config: GridIoConfig) -> Self {
        self.config = config;
        self
    }
}

/// Sampled values for one feature.
///
/// Single-vertex geometries give a scalar; everything else gives one entry
/// per vertex in traversal order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    Single(Option<f64>),
    Many(Vec<Option<f64>>),
}

impl PointValue {
    fn from_values(mut values: Vec<Option<f64>>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Many(values)
        }
    }

    /// All sampled values, scalar or not.
    pub fn values(&self) -> Vec<Option<f64>> {
        match self {
            Self::Single(v) => vec![*v],
            Self::Many(vs) => vs.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        let number = |v: &Option<f64>| {
            v.and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number)
        };
        match self {
            Self::Single(v) => number(v),
            Self::Many(vs) => Value::Array(vs.iter().map(number).collect()),
        }
    }
}

/// One point query output.
#[derive(Debug, Clone, PartialEq)]
pub enum PointOutput {
    Value(PointValue),
    Feature(geojson::Feature),
}

impl PointOutput {
    pub fn value(&self) -> Option<&PointValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Feature(_) => None,
        }
    }

    pub fn into_value(self) -> Option<PointValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Feature(_) => None,
        }
    }

    pub fn into_feature(self) -> Option<geojson::Feature> {
        match self {
            Self::Feature(f) => Some(f),
            Self::Value(_) => None,
        }
    }
}

/// The 2x2 window whose cell centers surround `(x, y)`, and the position of
/// `(x, y)` inside the unit square spanned by those centers.
///
/// In the unit square `(0, 0)` is the lower-left center and `(1, 1)` the
/// upper-right one.
pub fn point_window_unitxy(x: f64, y: f64, affine: &Affine) -> (Window, (f64, f64)) {
    let (fcol, frow) = affine.to_pixel(x, y);
    let (r, c) = (frow.round_ties_even(), fcol.round_ties_even());
    let window = Window::new(r as isize - 1, r as isize + 1, c as isize - 1, c as isize + 1);
    let unitxy = (0.5 - (c - fcol), 0.5 + (r - frow));
    (window, unitxy)
}

/// Lazily sample `raster` at every vertex of every feature.
pub fn gen_point_query(
    vectors: impl Into<VectorInput>,
    raster: impl Into<RasterInput>,
    options: PointOptions,
) -> Result<PointQueryIter> {
    let method: InterpolationMethod = options.interpolate.parse()?;

    let mut raster_options = RasterOptions::default()
        .with_band(options.band)
        .with_nodata(options.nodata)
        .with_config(options.config);
    if let Some(affine) = options.affine {
        raster_options = raster_options.with_affine(affine);
    }
    let raster = Raster::open(raster.into(), raster_options)?;
    let features = read_features(vectors.into())?;

    debug!(%method, "Starting point query");

    Ok(PointQueryIter {
        features,
        raster,
        method,
        property_name: options.property_name,
        geojson_out: options.geojson_out,
        done: false,
    })
}

/// Sample every feature.
pub fn point_query(
    vectors: impl Into<VectorInput>,
    raster: impl Into<RasterInput>,
    options: PointOptions,
) -> Result<Vec<PointOutput>> {
    gen_point_query(vectors, raster, options)?.collect()
}

/// Single-pass iterator over per-feature samples.
pub struct PointQueryIter {
    features: FeatureIter,
    raster: Raster,
    method: InterpolationMethod,
    property_name: String,
    geojson_out: bool,
    done: bool,
}

impl PointQueryIter {
    fn process(&mut self, feature: Feature) -> Result<PointOutput> {
        let value = match &feature.geometry {
            Some(geometry) => {
                let values = geometry
                    .coords_iter()
                    .map(|coord| self.sample(coord.x, coord.y))
                    .collect::<Result<Vec<_>>>()?;
                PointValue::from_values(values)
            }
            None => PointValue::Many(Vec::new()),
        };

        if !self.geojson_out {
            return Ok(PointOutput::Value(value));
        }
        let mut out = feature.to_geojson();
        out.properties
            .get_or_insert_with(Properties::new)
            .insert(self.property_name.clone(), value.to_json());
        Ok(PointOutput::Feature(out))
    }

    fn sample(&mut self, x: f64, y: f64) -> Result<Option<f64>> {
        match self.method {
            InterpolationMethod::Nearest => {
                let (row, col) = self.raster.index(x, y);
                let window = Window::new(row, row + 1, col, col + 1);
                let view = self.raster.read(window, ReadOptions::masked())?;
                Ok(view.valid_value(0, 0))
            }
            InterpolationMethod::Bilinear => {
                let (window, (ux, uy)) = point_window_unitxy(x, y, &self.raster.transform());
                let view = self.raster.read(window, ReadOptions::masked())?;
                let cells = [
                    [view.valid_value(0, 0), view.valid_value(0, 1)],
                    [view.valid_value(1, 0), view.valid_value(1, 1)],
                ];
                Ok(bilinear(cells, ux, uy))
            }
        }
    }
}

impl Iterator for PointQueryIter {
    type Item = Result<PointOutput>;

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

impl std::iter::FusedIterator for PointQueryIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZonalError;
    use ndarray::array;

    fn affine() -> Affine {
        Affine::new(1.0, 0.0, 0.0, 0.0, -1.0, 2.0)
    }

    #[test]
    fn test_window_at_cell_center() {
        // Center of cell (0, 0) is the lower-right center of its window.
        let (window, unitxy) = point_window_unitxy(0.5, 1.5, &affine());
        assert_eq!(window, Window::new(-1, 1, -1, 1));
        assert_eq!(unitxy, (1.0, 0.0));
    }

    #[test]
    fn test_window_between_centers() {
        let (window, unitxy) = point_window_unitxy(1.0, 1.0, &affine());
        assert_eq!(window, Window::new(0, 2, 0, 2));
        assert_eq!(unitxy, (0.5, 0.5));
    }

    #[test]
    fn test_bilinear_center_of_four_cells() {
        let out = point_query(
            "POINT (1 1)",
            array![[1.0, 2.0], [3.0, 4.0]],
            PointOptions::new().with_affine(affine()),
        )
        .unwrap();
        assert_eq!(out[0].value(), Some(&PointValue::Single(Some(2.5))));
    }

    #[test]
    fn test_nearest_returns_cell_value() {
        let out = point_query(
            "POINT (1.9 0.1)",
            array![[1.0, 2.0], [3.0, 4.0]],
            PointOptions::new().with_affine(affine()).with_interpolate("nearest"),
        )
        .unwrap();
        assert_eq!(out[0].value(), Some(&PointValue::Single(Some(4.0))));
    }

    #[test]
    fn test_outside_raster_is_none() {
        let out = point_query(
            "POINT (10 10)",
            array![[1.0, 2.0], [3.0, 4.0]],
            PointOptions::new().with_affine(affine()).with_interpolate("nearest"),
        )
        .unwrap();
        assert_eq!(out[0].value(), Some(&PointValue::Single(None)));
    }

    #[test]
    fn test_unknown_method_fails_before_open() {
        let err = point_query(
            "POINT (1 1)",
            std::path::PathBuf::from("/does/not/exist.tif"),
            PointOptions::new().with_interpolate("cubic"),
        )
        .unwrap_err();
        assert!(matches!(err, ZonalError::InvalidInterpolation(_)));
    }

    #[test]
    fn test_point_value_json() {
        assert_eq!(PointValue::Single(None).to_json(), Value::Null);
        assert_eq!(
            PointValue::Many(vec![Some(1.5), None]).to_json(),
            serde_json::json!([1.5, null])
        );
    }
}
