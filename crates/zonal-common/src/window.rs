//! Pixel windows: half-open row/column ranges relative to a raster's origin.
//!
//! Windows use signed offsets because boundless reads may start above or to
//! the left of the raster.

use serde::{Deserialize, Serialize};

use crate::{Affine, BoundingBox};

/// Distance in pixels below which an edge is treated as lying on a pixel boundary.
pub const EDGE_TOLERANCE: f64 = 1e-9;

fn snap(v: f64) -> f64 {
    let nearest = v.round();
    if (v - nearest).abs() < EDGE_TOLERANCE {
        nearest
    } else {
        v
    }
}

/// A rectangular range of pixels, `[row_start, row_stop) x [col_start, col_stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub row_start: isize,
    pub row_stop: isize,
    pub col_start: isize,
    pub col_stop: isize,
}

impl Window {
    pub fn new(row_start: isize, row_stop: isize, col_start: isize, col_stop: isize) -> Self {
        Self {
            row_start,
            row_stop,
            col_start,
            col_stop,
        }
    }

    /// Window covering `rows x cols` pixels from the raster origin.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, rows as isize, 0, cols as isize)
    }

    /// Pixel window covering world-space `bounds`.
    ///
    /// Start edges are floored and stop edges ceiled so the window always
    /// contains the requested bounds. Degenerate bounds still produce a window
    /// at least one pixel wide and tall.
    pub fn from_bounds(bounds: &BoundingBox, affine: &Affine) -> Self {
        let row_a = (bounds.max_y - affine.f) / affine.e;
        let row_b = (bounds.min_y - affine.f) / affine.e;
        let col_a = (bounds.min_x - affine.c) / affine.a;
        let col_b = (bounds.max_x - affine.c) / affine.a;

        Self::from_pixel_extent(col_a.min(col_b), row_a.min(row_b), col_a.max(col_b), row_a.max(row_b))
    }

    /// Window covering a fractional pixel-space extent.
    ///
    /// Edges within [`EDGE_TOLERANCE`] of a whole pixel snap to it before
    /// rounding outward, so an edge computed as `4.9999999999` or
    /// `5.0000000001` both land on pixel 5.
    pub fn from_pixel_extent(col_min: f64, row_min: f64, col_max: f64, row_max: f64) -> Self {
        let row_start = snap(row_min).floor() as isize;
        let row_stop = (snap(row_max).ceil() as isize).max(row_start + 1);
        let col_start = snap(col_min).floor() as isize;
        let col_stop = (snap(col_max).ceil() as isize).max(col_start + 1);

        Self::new(row_start, row_stop, col_start, col_stop)
    }

    pub fn height(&self) -> usize {
        (self.row_stop - self.row_start).max(0) as usize
    }

    pub fn width(&self) -> usize {
        (self.col_stop - self.col_start).max(0) as usize
    }

    /// `(rows, cols)` of the window.
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    /// Whether the window lies entirely inside a `rows x cols` raster.
    pub fn is_within(&self, rows: usize, cols: usize) -> bool {
        self.row_start >= 0
            && self.col_start >= 0
            && self.row_stop <= rows as isize
            && self.col_stop <= cols as isize
    }

    /// The part of this window inside a `rows x cols` raster.
    pub fn clip(&self, rows: usize, cols: usize) -> Option<Window> {
        let clipped = Window::new(
            self.row_start.max(0),
            self.row_stop.min(rows as isize),
            self.col_start.max(0),
            self.col_stop.min(cols as isize),
        );
        if clipped.row_stop <= clipped.row_start || clipped.col_stop <= clipped.col_start {
            None
        } else {
            Some(clipped)
        }
    }

    /// Transform of the window, with its origin at the window's upper-left corner.
    pub fn transform(&self, affine: &Affine) -> Affine {
        affine.translate_pixels(self.col_start as f64, self.row_start as f64)
    }

    /// World-space envelope of the window.
    pub fn bounds(&self, affine: &Affine) -> BoundingBox {
        let (c0, r0) = (self.col_start as f64, self.row_start as f64);
        let (c1, r1) = (self.col_stop as f64, self.row_stop as f64);
        BoundingBox::from_points([
            affine.apply(c0, r0),
            affine.apply(c1, r0),
            affine.apply(c1, r1),
            affine.apply(c0, r1),
        ])
        .unwrap_or_else(|| BoundingBox::new(affine.c, affine.f, affine.c, affine.f))
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows {}..{}, cols {}..{}",
            self.row_start, self.row_stop, self.col_start, self.col_stop
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bounds_rounds_outward() {
        let affine = Affine::new(1.0, 0.0, 0.0, 0.0, -1.0, 10.0);
        let bounds = BoundingBox::new(1.5, 2.5, 3.5, 8.2);
        let window = Window::from_bounds(&bounds, &affine);
        assert_eq!(window, Window::new(1, 8, 1, 4));
    }

    #[test]
    fn test_from_bounds_degenerate_is_one_pixel() {
        let affine = Affine::new(1.0, 0.0, 0.0, 0.0, -1.0, 10.0);
        let bounds = BoundingBox::new(2.0, 5.0, 2.0, 5.0);
        let window = Window::from_bounds(&bounds, &affine);
        assert_eq!(window.shape(), (1, 1));
    }

    #[test]
    fn test_from_bounds_snaps_near_edges() {
        // 0.1 pixels: 0.5 / 0.1 is not exactly 5 in floating point
        let affine = Affine::new(0.1, 0.0, 0.0, 0.0, -0.1, 10.0);
        let bounds = BoundingBox::new(0.3, 9.5, 0.5, 10.0);
        let window = Window::from_bounds(&bounds, &affine);
        assert_eq!(window, Window::new(0, 5, 3, 5));
    }

    #[test]
    fn test_from_pixel_extent() {
        assert_eq!(
            Window::from_pixel_extent(49.9999999999, 0.2, 100.0000000001, 3.5),
            Window::new(0, 4, 50, 100)
        );
        assert_eq!(Window::from_pixel_extent(1.2, 1.2, 1.7, 1.7), Window::new(1, 2, 1, 2));
    }

    #[test]
    fn test_clip() {
        let window = Window::new(-2, 3, 4, 12);
        assert_eq!(window.clip(5, 10), Some(Window::new(0, 3, 4, 10)));
        assert!(!window.is_within(5, 10));
        assert!(Window::new(6, 8, 0, 2).clip(5, 10).is_none());
    }

    #[test]
    fn test_window_transform() {
        let affine = Affine::new(2.0, 0.0, 100.0, 0.0, -2.0, 50.0);
        let t = Window::new(-1, 2, 3, 5).transform(&affine);
        assert_eq!(t.origin(), (106.0, 52.0));
    }
}
