//! Affine pixel-to-world transforms.
//!
//! Coefficient naming follows the usual raster convention:
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! `c`/`f` locate the upper-left corner of pixel (0, 0), `a`/`e` are the pixel
//! width and (usually negative) pixel height, `b`/`d` are rotation terms.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// Errors raised when a transform cannot be used for pixel lookups.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AffineError {
    #[error("affine transform is not invertible (determinant is {0})")]
    Degenerate(f64),

    #[error("affine transform has non-finite coefficients: {0}")]
    NonFinite(String),
}

/// A 2D affine transform mapping (col, row) to (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    /// Create a transform from coefficients in `(a, b, c, d, e, f)` order.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    /// Create a transform from a GDAL geotransform `(c, a, b, f, d, e)`.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    /// The GDAL geotransform ordering of this transform.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// Coefficients in `(a, b, c, d, e, f)` order.
    pub fn coefficients(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// World coordinate of the fractional pixel position `(col, row)`.
    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Check that the transform can be inverted.
    pub fn validate(&self) -> Result<(), AffineError> {
        if self.coefficients().iter().any(|v| !v.is_finite()) {
            return Err(AffineError::NonFinite(self.to_string()));
        }
        let det = self.determinant();
        if det == 0.0 {
            return Err(AffineError::Degenerate(det));
        }
        Ok(())
    }

    /// Fractional `(col, row)` of the world coordinate `(x, y)`.
    ///
    /// Callers are expected to have validated the transform; a degenerate
    /// transform yields non-finite values.
    #[inline]
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.determinant();
        let dx = x - self.c;
        let dy = y - self.f;
        let col = (self.e * dx - self.b * dy) / det;
        let row = (self.a * dy - self.d * dx) / det;
        (col, row)
    }

    /// Transform whose origin is the corner of pixel `(col_off, row_off)`.
    pub fn translate_pixels(&self, col_off: f64, row_off: f64) -> Self {
        let (c, f) = self.apply(col_off, row_off);
        Self { c, f, ..*self }
    }

    /// Absolute pixel width and height.
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.a.abs(), self.e.abs())
    }

    /// World coordinate of the upper-left corner of pixel (0, 0).
    pub fn origin(&self) -> (f64, f64) {
        (self.c, self.f)
    }

    /// Corners of pixel `(row, col)` in ring order, starting upper-left.
    pub fn cell_corners(&self, row: usize, col: usize) -> [(f64, f64); 4] {
        let (c0, r0) = (col as f64, row as f64);
        [
            self.apply(c0, r0),
            self.apply(c0 + 1.0, r0),
            self.apply(c0 + 1.0, r0 + 1.0),
            self.apply(c0, r0 + 1.0),
        ]
    }

    /// World coordinate of the center of pixel `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Envelope of pixel `(row, col)` in world coordinates.
    pub fn cell_bounds(&self, row: usize, col: usize) -> BoundingBox {
        BoundingBox::from_points(self.cell_corners(row, col).iter().copied())
            .unwrap_or_else(|| BoundingBox::new(self.c, self.f, self.c, self.f))
    }

    /// Whether the transform has no rotation terms.
    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 6]> for Affine {
    /// Coefficients in `(a, b, c, d, e, f)` order.
    fn from(v: [f64; 6]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Affine({}, {}, {}, {}, {}, {})",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn north_up() -> Affine {
        Affine::new(0.5, 0.0, 100.0, 0.0, -0.5, 50.0)
    }

    #[test]
    fn test_gdal_roundtrip() {
        let gt = [100.0, 0.5, 0.0, 50.0, 0.0, -0.5];
        let affine = Affine::from_gdal(gt);
        assert_eq!(affine, north_up());
        assert_eq!(affine.to_gdal(), gt);
    }

    #[test]
    fn test_apply_and_inverse() {
        let affine = north_up();
        let (x, y) = affine.apply(4.0, 6.0);
        assert_relative_eq!(x, 102.0);
        assert_relative_eq!(y, 47.0);

        let (col, row) = affine.to_pixel(x, y);
        assert_relative_eq!(col, 4.0);
        assert_relative_eq!(row, 6.0);
    }

    #[test]
    fn test_inverse_with_rotation() {
        let affine = Affine::new(2.0, 0.5, 10.0, 0.25, -2.0, 20.0);
        let (x, y) = affine.apply(3.25, 7.5);
        let (col, row) = affine.to_pixel(x, y);
        assert_relative_eq!(col, 3.25, epsilon = 1e-12);
        assert_relative_eq!(row, 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_translate_pixels_moves_origin_only() {
        let affine = north_up().translate_pixels(2.0, 3.0);
        assert_relative_eq!(affine.c, 101.0);
        assert_relative_eq!(affine.f, 48.5);
        assert_eq!(affine.a, 0.5);
        assert_eq!(affine.e, -0.5);
    }

    #[test]
    fn test_validate() {
        assert!(north_up().validate().is_ok());
        assert!(matches!(
            Affine::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0).validate(),
            Err(AffineError::Degenerate(_))
        ));
        assert!(matches!(
            Affine::new(f64::NAN, 0.0, 0.0, 0.0, -1.0, 0.0).validate(),
            Err(AffineError::NonFinite(_))
        ));
    }

    #[test]
    fn test_cell_geometry() {
        let affine = north_up();
        assert_eq!(affine.cell_center(0, 0), (100.25, 49.75));
        let bounds = affine.cell_bounds(1, 2);
        assert_relative_eq!(bounds.min_x, 101.0);
        assert_relative_eq!(bounds.max_x, 101.5);
        assert_relative_eq!(bounds.min_y, 49.0);
        assert_relative_eq!(bounds.max_y, 49.5);
    }
}
