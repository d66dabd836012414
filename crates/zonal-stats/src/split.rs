//! Recursive bisection of geometries whose windows would be too large.

use geo::{
    BooleanOps, BoundingRect, Coord, Geometry, GeometryCollection, MultiLineString, MultiPoint,
    MultiPolygon, Point, Rect,
};
use tracing::debug;

use crate::error::{Result, ZonalError};
use crate::mask::flatten_parts;
use crate::stats::Stat;

const MAX_DEPTH: usize = 64;

/// One piece of a split geometry and the box it owns.
///
/// Boxes of sibling pieces share their cut edge exactly, so together they
/// tile the original geometry's bounding box without overlap.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPiece {
    pub geometry: Geometry<f64>,
    pub bounds: Rect<f64>,
}

/// Split `geometry` until each piece's bounding box spans fewer than
/// `pixel_limit` pixels.
///
/// The larger axis is bisected at its midpoint, snapped to a pixel edge when
/// `origin` is given. Pieces that end up empty are dropped.
pub fn split_geometry(
    geometry: &Geometry<f64>,
    pixel_limit: usize,
    pixel_size: (f64, f64),
    origin: Option<(f64, f64)>,
) -> Vec<Geometry<f64>> {
    if geometry.bounding_rect().is_none() {
        return vec![geometry.clone()];
    }
    split_pieces(geometry, pixel_limit, pixel_size, origin)
        .into_iter()
        .map(|piece| piece.geometry)
        .collect()
}

/// [`split_geometry`], keeping the box each piece owns.
///
/// A geometry without a bounding box yields no pieces.
pub fn split_pieces(
    geometry: &Geometry<f64>,
    pixel_limit: usize,
    pixel_size: (f64, f64),
    origin: Option<(f64, f64)>,
) -> Vec<SplitPiece> {
    let mut pieces = Vec::new();
    let Some(outer) = geometry.bounding_rect() else {
        return pieces;
    };
    let splitter = Splitter {
        limit: pixel_limit as f64,
        pixel_size: (pixel_size.0.abs(), pixel_size.1.abs()),
        origin,
        outer,
    };
    splitter.split(geometry.clone(), outer, 0, &mut pieces);

    if pieces.len() > 1 {
        debug!(pieces = pieces.len(), limit = pixel_limit, "Split geometry");
    }
    pieces
}

/// Reject statistics and options that cannot be recombined across pieces.
pub fn check_split_compatibility(stats: &[Stat], has_add_stats: bool, raster_out: bool) -> Result<()> {
    if let Some(stat) = stats.iter().find(|s| !s.is_composable()) {
        return Err(ZonalError::incompatible(format!(
            "stat `{stat}` cannot be computed with a pixel limit"
        )));
    }
    if has_add_stats {
        return Err(ZonalError::incompatible(
            "custom stats cannot be computed with a pixel limit",
        ));
    }
    if raster_out {
        return Err(ZonalError::incompatible(
            "raster_out cannot be combined with a pixel limit",
        ));
    }
    Ok(())
}

struct Splitter {
    limit: f64,
    pixel_size: (f64, f64),
    origin: Option<(f64, f64)>,
    outer: Rect<f64>,
}

impl Splitter {
    fn split(&self, geometry: Geometry<f64>, owned: Rect<f64>, depth: usize, out: &mut Vec<SplitPiece>) {
        let Some(rect) = geometry.bounding_rect() else {
            return;
        };
        let (px, py) = self.pixel_size;
        let cols = rect.width() / px;
        let rows = rect.height() / py;

        if cols * rows < self.limit || cols.max(rows) <= 1.0 || depth >= MAX_DEPTH {
            out.push(SplitPiece {
                geometry,
                bounds: owned,
            });
            return;
        }

        let (min, max) = (owned.min(), owned.max());
        let halves = if cols >= rows {
            let cut = self.cut(rect.min().x, rect.max().x, px, self.origin.map(|o| o.0));
            [
                Rect::new(min, Coord { x: cut, y: max.y }),
                Rect::new(Coord { x: cut, y: min.y }, max),
            ]
        } else {
            let cut = self.cut(rect.min().y, rect.max().y, py, self.origin.map(|o| o.1));
            [
                Rect::new(min, Coord { x: max.x, y: cut }),
                Rect::new(Coord { x: min.x, y: cut }, max),
            ]
        };

        for half in halves {
            if let Some(piece) = self.clip(&geometry, &half) {
                self.split(piece, half, depth + 1, out);
            }
        }
    }

    fn cut(&self, lo: f64, hi: f64, size: f64, origin: Option<f64>) -> f64 {
        let mid = (lo + hi) / 2.0;
        match origin {
            Some(o) => {
                let snapped = o + ((mid - o) / size).round() * size;
                if snapped > lo && snapped < hi {
                    snapped
                } else {
                    mid
                }
            }
            None => mid,
        }
    }

    fn clip(&self, geometry: &Geometry<f64>, half: &Rect<f64>) -> Option<Geometry<f64>> {
        let mut parts = Vec::new();
        flatten_parts(geometry, &mut parts);

        let mut polygons = Vec::new();
        let mut lines = Vec::new();
        let mut points = Vec::new();
        for part in parts {
            match part {
                Geometry::Polygon(p) => polygons.push(p),
                Geometry::LineString(l) => lines.push(l),
                Geometry::Point(p) => points.push(p),
                _ => {}
            }
        }

        let window = MultiPolygon::new(vec![half.to_polygon()]);
        let mut pieces: Vec<Geometry<f64>> = Vec::new();

        if !polygons.is_empty() {
            let clipped = MultiPolygon::new(polygons).intersection(&window);
            if !clipped.0.is_empty() {
                pieces.push(Geometry::MultiPolygon(clipped));
            }
        }
        if !lines.is_empty() {
            let clipped = window.clip(&MultiLineString::new(lines), false);
            if !clipped.0.is_empty() {
                pieces.push(Geometry::MultiLineString(clipped));
            }
        }
        let kept: Vec<Point<f64>> = points.into_iter().filter(|p| self.owns(half, p)).collect();
        if !kept.is_empty() {
            pieces.push(Geometry::MultiPoint(MultiPoint::new(kept)));
        }

        match pieces.len() {
            0 => None,
            1 => pieces.pop(),
            _ => Some(Geometry::GeometryCollection(GeometryCollection::new_from(pieces))),
        }
    }

    /// Half-open containment so a point on a cut lands in exactly one half.
    fn owns(&self, half: &Rect<f64>, point: &Point<f64>) -> bool {
        let (min, max) = (half.min(), half.max());
        let (x, y) = (point.x(), point.y());
        let below_max_x = x < max.x || (x == max.x && max.x >= self.outer.max().x);
        let below_max_y = y < max.y || (y == max.y && max.y >= self.outer.max().y);
        x >= min.x && y >= min.y && below_max_x && below_max_y
    }
}
