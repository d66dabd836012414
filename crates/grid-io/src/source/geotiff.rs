use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::{debug, warn};
use zonal_common::Affine;

use super::RasterSource;
use crate::cache::{hash_path, Chunk, ChunkCache};
use crate::error::{GridError, Result};
use crate::types::CacheStats;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GDAL_NODATA: u16 = 42113;

/// A GeoTIFF file read strip by strip (or tile by tile).
///
/// Only the chunks intersecting a requested block are decoded; decoded
/// chunks are kept in a memory-bounded LRU cache.
pub struct GeoTiffSource {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    width: usize,
    height: usize,
    samples: usize,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    transform: Option<Affine>,
    nodata: Option<f64>,
    path_hash: u64,
    cache: ChunkCache,
}

impl GeoTiffSource {
    /// Open a GeoTIFF, reading its layout, transform and no-data tags.
    pub fn open(path: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| GridError::open_failed(format!("{}: {e}", path.display())))?;

        let (width, height) = decoder.dimensions()?;
        let samples = decoder
            .find_tag(Tag::SamplesPerPixel)?
            .map(|v| v.into_u16())
            .transpose()?
            .unwrap_or(1) as usize;
        let planar = decoder
            .find_tag(Tag::PlanarConfiguration)?
            .map(|v| v.into_u16())
            .transpose()?
            .unwrap_or(1);
        if samples > 1 && planar != 1 {
            return Err(GridError::unsupported(format!(
                "{}: band-separate (planar) layout is not supported",
                path.display()
            )));
        }

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let (chunk_width, chunk_height) = (chunk_width as usize, chunk_height as usize);
        if chunk_width == 0 || chunk_height == 0 {
            return Err(GridError::open_failed(format!(
                "{}: invalid chunk layout {chunk_width}x{chunk_height}",
                path.display()
            )));
        }

        let transform = read_transform(&mut decoder)?;
        let nodata = read_nodata(&mut decoder)?;
        let path_str = path.to_string_lossy();

        debug!(
            path = %path_str,
            width,
            height,
            samples,
            chunk_width,
            chunk_height,
            has_transform = transform.is_some(),
            nodata = ?nodata,
            "Opened GeoTIFF"
        );

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            width: width as usize,
            height: height as usize,
            samples,
            chunk_width,
            chunk_height,
            chunks_across: (width as usize).div_ceil(chunk_width),
            transform,
            nodata,
            path_hash: hash_path(&path_str),
            cache: ChunkCache::new(cache_bytes),
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn chunk(&mut self, index: u32) -> Result<Chunk> {
        let key = (self.path_hash, index);
        if let Some(chunk) = self.cache.get(&key) {
            return Ok(chunk);
        }

        let decoded = decoding_to_f64(self.decoder.read_chunk(index)?)?;
        let chunk: Chunk = Arc::from(decoded);
        self.cache.insert(key, Arc::clone(&chunk));
        Ok(chunk)
    }
}

impl RasterSource for GeoTiffSource {
    fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    fn band_count(&self) -> usize {
        self.samples
    }

    fn transform(&self) -> Option<Affine> {
        self.transform
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn read_block(
        &mut self,
        band: usize,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<Array2<f64>> {
        if band == 0 || band > self.samples {
            return Err(GridError::InvalidBand {
                band,
                count: self.samples,
            });
        }

        let mut out = Array2::zeros((rows.len(), cols.len()));
        if rows.is_empty() || cols.is_empty() {
            return Ok(out);
        }

        let (cw, ch) = (self.chunk_width, self.chunk_height);
        for chunk_row in rows.start / ch..=(rows.end - 1) / ch {
            for chunk_col in cols.start / cw..=(cols.end - 1) / cw {
                let index = (chunk_row * self.chunks_across + chunk_col) as u32;
                let chunk = self.chunk(index)?;
                let (data_w, data_h) = self.decoder.chunk_data_dimensions(index);
                let (data_w, data_h) = (data_w as usize, data_h as usize);

                let row0 = chunk_row * ch;
                let col0 = chunk_col * cw;
                for r in rows.start.max(row0)..rows.end.min(row0 + data_h) {
                    for c in cols.start.max(col0)..cols.end.min(col0 + data_w) {
                        let idx = ((r - row0) * data_w + (c - col0)) * self.samples + (band - 1);
                        out[[r - rows.start, c - cols.start]] =
                            chunk.get(idx).copied().ok_or_else(|| {
                                GridError::read_failed(format!(
                                    "{}: chunk {index} is shorter than its declared size",
                                    self.path.display()
                                ))
                            })?;
                    }
                }
            }
        }

        Ok(out)
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn find_f64_vec<R: Read + Seek>(decoder: &mut Decoder<R>, code: u16) -> Result<Option<Vec<f64>>> {
    Ok(decoder
        .find_tag(Tag::from_u16_exhaustive(code))?
        .map(|v| v.into_f64_vec())
        .transpose()?)
}

/// Affine transform from ModelTransformation, or ModelPixelScale + ModelTiepoint.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<Affine>> {
    if let Some(m) = find_f64_vec(decoder, MODEL_TRANSFORMATION)? {
        if m.len() >= 8 {
            return Ok(Some(Affine::new(m[0], m[1], m[3], m[4], m[5], m[7])));
        }
    }

    let scale = find_f64_vec(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64_vec(decoder, MODEL_TIEPOINT)?;
    match (scale, tiepoint) {
        // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => Ok(Some(Affine::new(
            s[0],
            0.0,
            t[3] - t[0] * s[0],
            0.0,
            -s[1],
            t[4] + t[1] * s[1],
        ))),
        _ => Ok(None),
    }
}

/// No-data value from the GDAL_NODATA ASCII tag.
fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>> {
    let raw = decoder
        .find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))?
        .map(|v| v.into_string())
        .transpose()?;

    Ok(raw.and_then(|s| {
        let trimmed = s.trim_matches(char::from(0)).trim();
        match trimmed.parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(value = %trimmed, "Ignoring unparseable GDAL_NODATA tag");
                None
            }
        }
    }))
}

fn decoding_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    Ok(match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return Err(GridError::unsupported("unsupported TIFF sample type")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_is_io_error() {
        let result = GeoTiffSource::open("/nonexistent/raster.tif", 1024);
        assert!(matches!(result, Err(GridError::Io(_))));
    }

    #[test]
    fn test_open_non_tiff_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-tiff.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();
        assert!(GeoTiffSource::open(&path, 1024).is_err());
    }

    #[test]
    fn test_decoding_to_f64() {
        let values = decoding_to_f64(DecodingResult::I16(vec![-3, 7])).unwrap();
        assert_eq!(values, vec![-3.0, 7.0]);
    }
}
