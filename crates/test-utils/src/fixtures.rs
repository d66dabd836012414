//! Common test fixtures for zonal statistics tests.

use zonal_common::Affine;

/// North-up transform with square pixels of `size` and upper-left corner at `(x, y)`.
pub fn north_up(x: f64, y: f64, size: f64) -> Affine {
    Affine::new(size, 0.0, x, 0.0, -size, y)
}

/// Unit pixels with the upper-left corner at `(0, rows)`, so the raster covers
/// `[0, cols] x [0, rows]` in world coordinates.
pub fn unit_transform(rows: usize) -> Affine {
    north_up(0.0, rows as f64, 1.0)
}

/// Well-known-text geometries used across tests.
pub mod shapes {
    /// Square covering `[0, 2] x [0, 2]`.
    pub const SQUARE_2: &str = "POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))";

    /// Square covering `[1, 3] x [1, 3]`.
    pub const SQUARE_OFFSET: &str = "POLYGON ((1 1, 3 1, 3 3, 1 3, 1 1))";

    /// Square with a hole covering `[1, 2] x [1, 2]`.
    pub const SQUARE_WITH_HOLE: &str =
        "POLYGON ((0 0, 3 0, 3 3, 0 3, 0 0), (1 1, 1 2, 2 2, 2 1, 1 1))";

    /// Square far away from any test raster.
    pub const FAR_AWAY: &str = "POLYGON ((100 100, 101 100, 101 101, 100 101, 100 100))";

    /// Polygon clipping diagonally through a 2x2 raster; covers three cell centers.
    pub const DIAGONAL: &str = "POLYGON ((0 0, 0 0.5, 1 1.5, 1.5 2, 2 2, 2 0, 0 0))";

    /// Line crossing a row of cells.
    pub const LINE: &str = "LINESTRING (0.5 1.5, 2.5 1.5)";

    pub const POINT: &str = "POINT (0.5 0.5)";

    pub const MULTIPOINT: &str = "MULTIPOINT ((0.5 0.5), (1.5 1.5), (1.6 1.6))";
}

/// GeoJSON documents used across tests.
pub mod documents {
    /// Two polygons over a `[0, 4] x [0, 4]` raster, with properties.
    pub const TWO_POLYGONS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": 1,
      "properties": {"name": "west"},
      "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [2, 0], [2, 4], [0, 4], [0, 0]]]}
    },
    {
      "type": "Feature",
      "id": 2,
      "properties": {"name": "east"},
      "geometry": {"type": "Polygon", "coordinates": [[[2, 0], [4, 0], [4, 4], [2, 4], [2, 0]]]}
    }
  ]
}"#;

    /// Two points at cell centers of a `[0, 4] x [0, 4]` raster.
    pub const TWO_POINTS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [0.5, 3.5]}},
    {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [2.5, 1.5]}}
  ]
}"#;
}
