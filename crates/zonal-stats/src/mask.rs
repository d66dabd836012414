//! Coverage masks: which cells of a window a geometry covers.

use std::collections::BTreeSet;
use std::ops::Range;

use geo::{BoundingRect, Coord, Geometry, Intersects, LineString, MapCoords, MultiPolygon, Point, Polygon, Rect};
use ndarray::Array2;
use zonal_common::window::EDGE_TOLERANCE;
use zonal_common::{Affine, BoundingBox, Window};

use crate::error::{Result, ZonalError};
use crate::wkb::geometry_type;

/// Sub-cells per axis used for fractional coverage unless configured.
pub const DEFAULT_PERCENT_COVER_SCALE: usize = 10;

/// Per-cell coverage of one zone.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageMask {
    Binary(Array2<bool>),
    /// Covered fraction of each cell, `0.0..=1.0`.
    Fractional(Array2<f64>),
}

impl CoverageMask {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Binary(m) => m.dim(),
            Self::Fractional(m) => m.dim(),
        }
    }

    /// Cells covered at all.
    pub fn covered(&self) -> Array2<bool> {
        self.covered_above(0.0)
    }

    /// Cells whose covered fraction exceeds `threshold`.
    pub fn covered_above(&self, threshold: f64) -> Array2<bool> {
        match self {
            Self::Binary(m) => m.clone(),
            Self::Fractional(m) => m.mapv(|f| f > threshold),
        }
    }

    /// Coverage as fractions (`1.0`/`0.0` for binary masks).
    pub fn fractions(&self) -> Array2<f64> {
        match self {
            Self::Binary(m) => m.mapv(|c| if c { 1.0 } else { 0.0 }),
            Self::Fractional(m) => m.clone(),
        }
    }
}

/// Mark the cells of a `shape` grid covered by `geometry`.
///
/// See [`rasterize_pixels`] for the coverage rules.
pub fn rasterize_geom(
    geometry: &Geometry<f64>,
    shape: (usize, usize),
    transform: &Affine,
    all_touched: bool,
) -> Array2<bool> {
    rasterize_pixels(&to_pixel_space(geometry, transform), &Window::full(shape.0, shape.1), all_touched)
}

/// Fractional coverage: rasterize at `scale`x resolution and average back down.
pub fn rasterize_pct_cover(
    geometry: &Geometry<f64>,
    shape: (usize, usize),
    transform: &Affine,
    scale: usize,
    all_touched: bool,
) -> Array2<f64> {
    pct_cover_pixels(
        &to_pixel_space(geometry, transform),
        &Window::full(shape.0, shape.1),
        scale,
        all_touched,
    )
}

/// Build a binary or, with `percent_cover_scale`, fractional mask.
pub fn coverage_mask(
    geometry: &Geometry<f64>,
    shape: (usize, usize),
    transform: &Affine,
    all_touched: bool,
    percent_cover_scale: Option<usize>,
) -> CoverageMask {
    pixel_coverage(
        &to_pixel_space(geometry, transform),
        &Window::full(shape.0, shape.1),
        all_touched,
        percent_cover_scale,
    )
}

/// Coverage of the cells in `window` by a geometry already in pixel space.
pub fn pixel_coverage(
    pixels: &Geometry<f64>,
    window: &Window,
    all_touched: bool,
    percent_cover_scale: Option<usize>,
) -> CoverageMask {
    match percent_cover_scale {
        Some(scale) => CoverageMask::Fractional(pct_cover_pixels(pixels, window, scale, all_touched)),
        None => CoverageMask::Binary(rasterize_pixels(pixels, window, all_touched)),
    }
}

/// Map world coordinates to pixel coordinates of `transform`: `x` is the
/// column, `y` the row, both fractional.
pub fn to_pixel_space(geometry: &Geometry<f64>, transform: &Affine) -> Geometry<f64> {
    geometry.map_coords(|Coord { x, y }| {
        let (col, row) = transform.to_pixel(x, y);
        Coord { x: col, y: row }
    })
}

/// Mark the cells of `window` covered by a pixel-space geometry.
///
/// Polygons cover a cell when its center falls inside them. Centers on an
/// edge follow a half-open rule: the left and top edges include, the right
/// and bottom edges exclude, so polygons sharing an edge never both claim a
/// cell. With `all_touched`, polygons also cover every cell whose interior
/// they overlap; touching only a cell's border does not count. Lines and
/// points cover every cell they touch, border included.
pub fn rasterize_pixels(pixels: &Geometry<f64>, window: &Window, all_touched: bool) -> Array2<bool> {
    let mut covered = Array2::from_elem(window.shape(), false);
    let mut parts = Vec::new();
    flatten_parts(pixels, &mut parts);

    for part in &parts {
        let Some(rect) = part.bounding_rect() else {
            continue;
        };
        let Some((rows, cols)) = search_window(&rect, window) else {
            continue;
        };

        if let Geometry::Polygon(polygon) = part {
            fill_centers(polygon, rows.clone(), window, &mut covered);
            if !all_touched {
                continue;
            }
        }

        for row in rows {
            for col in cols.clone() {
                if covered[[row, col]] {
                    continue;
                }
                let (r, c) = (window.row_start + row as isize, window.col_start + col as isize);
                let hit = match part {
                    Geometry::Polygon(polygon) => polygon.intersects(&cell_polygon(r, c, EDGE_TOLERANCE)),
                    Geometry::LineString(line) => line.intersects(&cell_polygon(r, c, 0.0)),
                    Geometry::Point(point) => point.intersects(&cell_polygon(r, c, 0.0)),
                    _ => false,
                };
                if hit {
                    covered[[row, col]] = true;
                }
            }
        }
    }

    covered
}

fn pct_cover_pixels(pixels: &Geometry<f64>, window: &Window, scale: usize, all_touched: bool) -> Array2<f64> {
    let scale = scale.max(1);
    let factor = scale as f64;
    let fine_pixels = pixels.map_coords(|Coord { x, y }| Coord {
        x: x * factor,
        y: y * factor,
    });
    let step = scale as isize;
    let fine_window = Window::new(
        window.row_start * step,
        window.row_stop * step,
        window.col_start * step,
        window.col_stop * step,
    );
    let fine = rasterize_pixels(&fine_pixels, &fine_window, all_touched);

    let mut fractions = Array2::<f64>::zeros(window.shape());
    for ((row, col), &hit) in fine.indexed_iter() {
        if hit {
            fractions[[row / scale, col / scale]] += 1.0;
        }
    }
    let cells = (scale * scale) as f64;
    fractions.mapv_inplace(|n| n / cells);
    fractions
}

/// Scanline fill of the cells whose centers lie inside `polygon`.
///
/// An edge crosses the scanline when exactly one endpoint lies at or above
/// it, which keeps vertices on the line from being counted twice.
fn fill_centers(polygon: &Polygon<f64>, rows: Range<usize>, window: &Window, covered: &mut Array2<bool>) {
    let cols = window.width() as f64;
    let col_start = window.col_start as f64;
    let mut crossings = Vec::new();

    for row in rows {
        let y = (window.row_start + row as isize) as f64 + 0.5;
        crossings.clear();
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            for segment in ring.lines() {
                let (p, q) = (segment.start, segment.end);
                if (p.y <= y) != (q.y <= y) {
                    crossings.push(p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y));
                }
            }
        }
        crossings.sort_by(f64::total_cmp);

        // even-odd spans [enter, exit): a center at x is inside when enter <= x < exit
        for span in crossings.chunks_exact(2) {
            let first = ((span[0] - 0.5).ceil() - col_start).clamp(0.0, cols) as usize;
            let stop = ((span[1] - 0.5).ceil() - col_start).clamp(0.0, cols) as usize;
            for col in first..stop {
                covered[[row, col]] = true;
            }
        }
    }
}

/// Replace each point with the box of the cell containing it.
///
/// Boxes are shrunk by 1% of the smaller cell dimension on every side so they
/// never touch neighbouring cells. Points falling in the same cell produce one
/// box.
pub fn boxify_points(geometry: &Geometry<f64>, transform: &Affine) -> Result<MultiPolygon<f64>> {
    let points: Vec<Point<f64>> = match geometry {
        Geometry::Point(point) => vec![*point],
        Geometry::MultiPoint(points) => points.0.clone(),
        other => {
            return Err(ZonalError::invalid_geometry(format!(
                "expected a Point or MultiPoint, got {}",
                geometry_type(other)
            )))
        }
    };

    let (width, height) = transform.pixel_size();
    let inset = 0.01 * width.min(height);
    let mut seen = BTreeSet::new();
    let mut boxes = Vec::new();

    for point in points {
        let (col, row) = transform.to_pixel(point.x(), point.y());
        let (col, row) = (col.floor(), row.floor());
        if !col.is_finite() || !row.is_finite() || !seen.insert((row as i64, col as i64)) {
            continue;
        }

        let corners = [
            transform.apply(col, row),
            transform.apply(col + 1.0, row),
            transform.apply(col + 1.0, row + 1.0),
            transform.apply(col, row + 1.0),
        ];
        if let Some(cell) = BoundingBox::from_points(corners) {
            let rect = Rect::new(
                Coord { x: cell.min_x + inset, y: cell.min_y + inset },
                Coord { x: cell.max_x - inset, y: cell.max_y - inset },
            );
            boxes.push(rect.to_polygon());
        }
    }

    Ok(MultiPolygon::new(boxes))
}

/// Whether the geometry is a Point or MultiPoint.
pub fn is_point_like(geometry: &Geometry<f64>) -> bool {
    matches!(geometry, Geometry::Point(_) | Geometry::MultiPoint(_))
}

pub(crate) fn flatten_parts(geometry: &Geometry<f64>, out: &mut Vec<Geometry<f64>>) {
    match geometry {
        Geometry::Point(_) | Geometry::LineString(_) | Geometry::Polygon(_) => out.push(geometry.clone()),
        Geometry::Line(line) => out.push(Geometry::LineString(LineString::from(*line))),
        Geometry::Rect(rect) => out.push(Geometry::Polygon(rect.to_polygon())),
        Geometry::Triangle(triangle) => out.push(Geometry::Polygon(triangle.to_polygon())),
        Geometry::MultiPoint(points) => out.extend(points.iter().map(|p| Geometry::Point(*p))),
        Geometry::MultiLineString(lines) => out.extend(lines.iter().cloned().map(Geometry::LineString)),
        Geometry::MultiPolygon(polygons) => out.extend(polygons.iter().cloned().map(Geometry::Polygon)),
        Geometry::GeometryCollection(collection) => {
            for member in collection.iter() {
                flatten_parts(member, out);
            }
        }
    }
}

/// Cells of `window` worth testing for a part: its envelope plus one cell of slack.
fn search_window(rect: &Rect<f64>, window: &Window) -> Option<(Range<usize>, Range<usize>)> {
    let (min, max) = (rect.min(), rect.max());
    if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
        return None;
    }

    let (rows, cols) = window.shape();
    let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
    let row_start = window.row_start as f64;
    let col_start = window.col_start as f64;
    let row_range = clamp(min.y.floor() - row_start - 1.0, rows)..clamp(max.y.ceil() - row_start + 1.0, rows);
    let col_range = clamp(min.x.floor() - col_start - 1.0, cols)..clamp(max.x.ceil() - col_start + 1.0, cols);
    if row_range.is_empty() || col_range.is_empty() {
        return None;
    }
    Some((row_range, col_range))
}

/// Pixel-space square of cell `(row, col)`, shrunk by `inset` on every side.
fn cell_polygon(row: isize, col: isize, inset: f64) -> Polygon<f64> {
    let (x, y) = (col as f64, row as f64);
    Rect::new(
        Coord { x: x + inset, y: y + inset },
        Coord { x: x + 1.0 - inset, y: y + 1.0 - inset },
    )
    .to_polygon()
}
