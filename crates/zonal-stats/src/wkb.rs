//! Well-known binary geometry decoding.
//!
//! Handles both byte orders, ISO Z/M/ZM type codes and PostGIS EWKB flags
//! (including an embedded SRID, which is skipped). Z and M ordinates are read
//! and dropped.

use bytes::Buf;
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

use crate::error::{Result, ZonalError};

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;
const MAX_DEPTH: usize = 32;

/// Decode a WKB blob into a geometry.
pub fn read_wkb(data: &[u8]) -> Result<Geometry<f64>> {
    let mut buf = data;
    let geometry = read_geometry(&mut buf, 0)?;
    if buf.has_remaining() {
        return Err(ZonalError::Wkb(format!("{} trailing bytes", buf.remaining())));
    }
    Ok(geometry)
}

/// Decode hex-encoded WKB, as commonly stored in text columns.
pub fn read_hex_wkb(text: &str) -> Result<Geometry<f64>> {
    let bytes = decode_hex(text.trim()).ok_or_else(|| ZonalError::Wkb("not a hex string".into()))?;
    read_wkb(&bytes)
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.is_empty() || text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| text.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Header {
    little_endian: bool,
    kind: u32,
    dims: usize,
}

fn ensure(buf: &&[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(ZonalError::Wkb(format!(
            "unexpected end of input: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_u32(buf: &mut &[u8], little_endian: bool) -> Result<u32> {
    ensure(buf, 4)?;
    Ok(if little_endian { buf.get_u32_le() } else { buf.get_u32() })
}

fn read_f64(buf: &mut &[u8], little_endian: bool) -> f64 {
    if little_endian {
        buf.get_f64_le()
    } else {
        buf.get_f64()
    }
}

fn read_header(buf: &mut &[u8]) -> Result<Header> {
    ensure(buf, 1)?;
    let little_endian = match buf.get_u8() {
        0 => false,
        1 => true,
        other => return Err(ZonalError::Wkb(format!("invalid byte order marker {other}"))),
    };

    let raw = read_u32(buf, little_endian)?;
    if raw & EWKB_SRID != 0 {
        read_u32(buf, little_endian)?;
    }

    let base = raw & 0x0FFF_FFFF;
    let (kind, iso_dims) = (base % 1000, base / 1000);
    let has_z = raw & EWKB_Z != 0 || iso_dims == 1 || iso_dims == 3;
    let has_m = raw & EWKB_M != 0 || iso_dims == 2 || iso_dims == 3;

    Ok(Header {
        little_endian,
        kind,
        dims: 2 + usize::from(has_z) + usize::from(has_m),
    })
}

fn read_count(buf: &mut &[u8], header: Header, min_item_bytes: usize) -> Result<usize> {
    let count = read_u32(buf, header.little_endian)? as usize;
    if count.saturating_mul(min_item_bytes) > buf.remaining() {
        return Err(ZonalError::Wkb(format!(
            "count {count} exceeds remaining input"
        )));
    }
    Ok(count)
}

fn read_coord(buf: &mut &[u8], header: Header) -> Result<Coord<f64>> {
    ensure(buf, header.dims * 8)?;
    let x = read_f64(buf, header.little_endian);
    let y = read_f64(buf, header.little_endian);
    for _ in 2..header.dims {
        read_f64(buf, header.little_endian);
    }
    Ok(Coord { x, y })
}

fn read_line(buf: &mut &[u8], header: Header) -> Result<LineString<f64>> {
    let n = read_count(buf, header, header.dims * 8)?;
    let coords = (0..n)
        .map(|_| read_coord(buf, header))
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn read_polygon(buf: &mut &[u8], header: Header) -> Result<Polygon<f64>> {
    let n = read_count(buf, header, 4)?;
    let mut rings = (0..n)
        .map(|_| read_line(buf, header))
        .collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        return Ok(Polygon::new(LineString::new(vec![]), vec![]));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn read_members(buf: &mut &[u8], header: Header, depth: usize) -> Result<Vec<Geometry<f64>>> {
    let n = read_count(buf, header, 5)?;
    (0..n).map(|_| read_geometry(buf, depth + 1)).collect()
}

fn read_geometry(buf: &mut &[u8], depth: usize) -> Result<Geometry<f64>> {
    if depth > MAX_DEPTH {
        return Err(ZonalError::Wkb("geometry nesting too deep".into()));
    }
    let header = read_header(buf)?;

    let geometry = match header.kind {
        1 => {
            let c = read_coord(buf, header)?;
            if c.x.is_nan() && c.y.is_nan() {
                Geometry::MultiPoint(MultiPoint::new(vec![]))
            } else {
                Geometry::Point(Point::from(c))
            }
        }
        2 => Geometry::LineString(read_line(buf, header)?),
        3 => Geometry::Polygon(read_polygon(buf, header)?),
        4 => {
            let points = read_members(buf, header, depth)?
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::Point(p) => Some(Ok(p)),
                    Geometry::MultiPoint(mp) if mp.0.is_empty() => None,
                    other => Some(Err(unexpected_member("MultiPoint", &other))),
                })
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPoint(MultiPoint::new(points))
        }
        5 => {
            let lines = read_members(buf, header, depth)?
                .into_iter()
                .map(|g| match g {
                    Geometry::LineString(l) => Ok(l),
                    other => Err(unexpected_member("MultiLineString", &other)),
                })
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiLineString(MultiLineString::new(lines))
        }
        6 => {
            let polygons = read_members(buf, header, depth)?
                .into_iter()
                .map(|g| match g {
                    Geometry::Polygon(p) => Ok(p),
                    other => Err(unexpected_member("MultiPolygon", &other)),
                })
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiPolygon(MultiPolygon::new(polygons))
        }
        7 => Geometry::GeometryCollection(GeometryCollection::new_from(read_members(
            buf, header, depth,
        )?)),
        other => return Err(ZonalError::Wkb(format!("unsupported geometry type {other}"))),
    };

    Ok(geometry)
}

fn unexpected_member(container: &str, member: &Geometry<f64>) -> ZonalError {
    ZonalError::Wkb(format!("{container} contains a {}", geometry_type(member)))
}

/// GeoJSON-style name of a geometry's type.
pub(crate) fn geometry_type(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
