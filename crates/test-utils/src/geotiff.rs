//! Minimal GeoTIFF writer for tests.
//!
//! Writes a single-band `f64` image with ModelPixelScale, ModelTiepoint and
//! GDAL_NODATA tags, which is enough for the reader to recover the transform
//! and no-data value.

use std::fs::File;
use std::io;
use std::path::Path;

use ndarray::Array2;
use tiff::encoder::{colortype::Gray64Float, TiffEncoder};
use tiff::tags::Tag;
use zonal_common::Affine;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_NODATA: u16 = 42113;

/// Write `data` as a north-up GeoTIFF.
pub fn write_geotiff(path: &Path, data: &Array2<f64>, affine: &Affine, nodata: Option<f64>) -> io::Result<()> {
    write_geotiff_strips(path, data, affine, nodata, None)
}

/// Write `data` as a north-up GeoTIFF with an explicit strip height.
pub fn write_geotiff_strips(
    path: &Path,
    data: &Array2<f64>,
    affine: &Affine,
    nodata: Option<f64>,
    rows_per_strip: Option<u32>,
) -> io::Result<()> {
    let (rows, cols) = data.dim();
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(file).map_err(io::Error::other)?;
    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(io::Error::other)?;

    if let Some(n) = rows_per_strip {
        image.rows_per_strip(n).map_err(io::Error::other)?;
    }

    let scale = [affine.a, -affine.e, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(io::Error::other)?;

    let tiepoint = [0.0, 0.0, 0.0, affine.c, affine.f, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(io::Error::other)?;

    if let Some(nd) = nodata {
        let text = nd.to_string();
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), text.as_str())
            .map_err(io::Error::other)?;
    }

    let samples: Vec<f64> = data.iter().copied().collect();
    image.write_data(&samples).map_err(io::Error::other)?;
    Ok(())
}

/// Write `data` to `name` inside a fresh temporary directory.
///
/// The directory is removed when the returned guard is dropped.
pub fn temp_geotiff(
    name: &str,
    data: &Array2<f64>,
    affine: &Affine,
    nodata: Option<f64>,
) -> io::Result<(tempfile::TempDir, std::path::PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(name);
    write_geotiff(&path, data, affine, nodata)?;
    Ok((dir, path))
}
