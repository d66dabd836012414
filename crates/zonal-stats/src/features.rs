//! Normalization of heterogeneous vector inputs into a stream of features.
//!
//! Every accepted input shape is a [`VectorInput`] variant. Ambiguous text is
//! resolved in a fixed order: an existing file path, then GeoJSON, then WKT,
//! then hex-encoded WKB.

use std::fs;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use geo::Geometry;
use geojson::feature::Id;
use geojson::GeoJson;
use serde_json::Value;
use tracing::debug;
use wkt::TryFromWkt;

use crate::error::{Result, ZonalError};
use crate::wkb::{read_hex_wkb, read_wkb};

/// Ordered feature properties.
pub type Properties = serde_json::Map<String, Value>;

/// A boxed, single-pass stream of features.
pub type FeatureIter = Box<dyn Iterator<Item = Result<Feature>>>;

const RECORD_SEPARATOR: char = '\u{1e}';
const RECORD_SEPARATOR_BYTE: u8 = 0x1e;

/// A geometry with its properties and optional identifier.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    /// `None` for features with a null geometry.
    pub geometry: Option<Geometry<f64>>,
    pub properties: Properties,
    pub id: Option<Id>,
}

impl Feature {
    /// Wrap a bare geometry with empty properties.
    pub fn from_geometry(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            ..Self::default()
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Convert a GeoJSON feature, failing on unsupported geometry.
    pub fn from_geojson(feature: geojson::Feature) -> Result<Self> {
        let geometry = feature.geometry.map(Geometry::<f64>::try_from).transpose()?;
        Ok(Self {
            geometry,
            properties: feature.properties.unwrap_or_default(),
            id: feature.id,
        })
    }

    pub fn to_geojson(&self) -> geojson::Feature {
        geojson::Feature {
            bbox: None,
            geometry: self
                .geometry
                .as_ref()
                .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
            id: self.id.clone(),
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

impl From<Geometry<f64>> for Feature {
    fn from(geometry: Geometry<f64>) -> Self {
        Self::from_geometry(geometry)
    }
}

/// Anything that can be turned into features.
pub enum VectorInput {
    /// A GeoJSON (or GeoJSON text sequence) file.
    Path(PathBuf),
    /// Ambiguous text: a path, GeoJSON, WKT or hex WKB.
    Text(String),
    Wkt(String),
    Wkb(Vec<u8>),
    /// A GeoJSON-like mapping.
    Json(Value),
    GeoJson(GeoJson),
    Geometry(Geometry<f64>),
    Feature(Feature),
    /// A list of inputs, each normalized in turn.
    Features(Vec<VectorInput>),
    /// A lazy sequence of inputs, consumed once.
    Iter(Box<dyn Iterator<Item = VectorInput>>),
}

impl std::fmt::Debug for VectorInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            Self::Wkt(t) => f.debug_tuple("Wkt").field(t).finish(),
            Self::Wkb(b) => f.debug_tuple("Wkb").field(&b.len()).finish(),
            Self::Json(_) => f.write_str("Json"),
            Self::GeoJson(_) => f.write_str("GeoJson"),
            Self::Geometry(g) => f.debug_tuple("Geometry").field(g).finish(),
            Self::Feature(feat) => f.debug_tuple("Feature").field(&feat.id).finish(),
            Self::Features(v) => f.debug_tuple("Features").field(&v.len()).finish(),
            Self::Iter(_) => f.write_str("Iter"),
        }
    }
}

impl From<&str> for VectorInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for VectorInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<PathBuf> for VectorInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for VectorInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for VectorInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Wkb(bytes)
    }
}

impl From<Value> for VectorInput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<GeoJson> for VectorInput {
    fn from(geojson: GeoJson) -> Self {
        Self::GeoJson(geojson)
    }
}

impl From<Geometry<f64>> for VectorInput {
    fn from(geometry: Geometry<f64>) -> Self {
        Self::Geometry(geometry)
    }
}

impl From<Feature> for VectorInput {
    fn from(feature: Feature) -> Self {
        Self::Feature(feature)
    }
}

impl From<geojson::Feature> for VectorInput {
    fn from(feature: geojson::Feature) -> Self {
        Self::GeoJson(GeoJson::Feature(feature))
    }
}

impl From<Vec<Feature>> for VectorInput {
    fn from(features: Vec<Feature>) -> Self {
        Self::Features(features.into_iter().map(Self::Feature).collect())
    }
}

impl From<Vec<Geometry<f64>>> for VectorInput {
    fn from(geometries: Vec<Geometry<f64>>) -> Self {
        Self::Features(geometries.into_iter().map(Self::Geometry).collect())
    }
}

/// Normalize `input` into a feature stream.
///
/// Unrecognized or empty sources fail here; per-item failures inside a list
/// or iterator surface lazily as `Err` items.
pub fn read_features(input: VectorInput) -> Result<FeatureIter> {
    match input {
        VectorInput::Path(path) => features_from_path(&path),
        VectorInput::Text(text) => {
            let path = Path::new(text.trim());
            if !text.contains('\n') && path.is_file() {
                features_from_path(path)
            } else {
                features_from_reader(Cursor::new(text.into_bytes()))
            }
        }
        VectorInput::Wkt(text) => {
            let geometry = Geometry::<f64>::try_from_wkt_str(text.trim())
                .map_err(|e| ZonalError::invalid_features(format!("invalid WKT: {e}")))?;
            eager(vec![Feature::from_geometry(geometry)])
        }
        VectorInput::Wkb(bytes) => eager(vec![Feature::from_geometry(read_wkb(&bytes)?)]),
        VectorInput::Json(value) => eager(features_from_geojson(GeoJson::from_json_value(value)?)?),
        VectorInput::GeoJson(geojson) => eager(features_from_geojson(geojson)?),
        VectorInput::Geometry(geometry) => eager(vec![Feature::from_geometry(geometry)]),
        VectorInput::Feature(feature) => eager(vec![feature]),
        VectorInput::Features(inputs) => {
            if inputs.is_empty() {
                return Err(ZonalError::invalid_features("empty feature list"));
            }
            Ok(flatten(inputs.into_iter()))
        }
        VectorInput::Iter(inputs) => {
            let mut inputs = inputs.peekable();
            if inputs.peek().is_none() {
                return Err(ZonalError::invalid_features("empty feature iterator"));
            }
            Ok(flatten(inputs))
        }
    }
}

fn eager(features: Vec<Feature>) -> Result<FeatureIter> {
    Ok(Box::new(features.into_iter().map(Ok)))
}

fn flatten(inputs: impl Iterator<Item = VectorInput> + 'static) -> FeatureIter {
    Box::new(inputs.flat_map(|input| match read_features(input) {
        Ok(features) => features,
        Err(e) => Box::new(std::iter::once(Err(e))) as FeatureIter,
    }))
}

fn features_from_path(path: &Path) -> Result<FeatureIter> {
    let file = fs::File::open(path)?;
    debug!(path = %path.display(), "Opened vector file");
    features_from_reader(BufReader::new(file))
}

/// Stream features from GeoJSON text.
///
/// Text sequences (RS-framed, or one document per line) are parsed one record
/// at a time. A document spread over several lines, WKT and hex WKB are read
/// whole. The first record is parsed before returning so empty or malformed
/// input fails here.
fn features_from_reader<R: BufRead + 'static>(mut reader: R) -> Result<FeatureIter> {
    match first_byte(&mut reader)? {
        None => Err(ZonalError::invalid_features("empty input")),
        Some(RECORD_SEPARATOR_BYTE) => start(GeoJsonRecords::new(reader, RECORD_SEPARATOR_BYTE)),
        Some(b'{') => {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            match line.trim().parse::<GeoJson>() {
                Ok(document) => {
                    let mut records = GeoJsonRecords::new(reader, b'\n');
                    records.pending = features_from_geojson(document)?.into_iter();
                    start(records)
                }
                Err(_) => {
                    reader.read_to_string(&mut line)?;
                    eager(features_from_text(&line)?)
                }
            }
        }
        Some(_) => {
            let mut text = String::new();
            reader.read_to_string(&mut text)?;
            eager(features_from_text(&text)?)
        }
    }
}

/// Skip leading whitespace and peek at the first byte after it.
fn first_byte(reader: &mut impl BufRead) -> Result<Option<u8>> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => {
                let byte = buf[i];
                reader.consume(i);
                return Ok(Some(byte));
            }
            None => {
                let n = buf.len();
                reader.consume(n);
            }
        }
    }
}

fn start<R: BufRead + 'static>(mut records: GeoJsonRecords<R>) -> Result<FeatureIter> {
    match records.next() {
        None => Err(ZonalError::invalid_features("empty input")),
        Some(Err(e)) => Err(e),
        Some(Ok(first)) => Ok(Box::new(std::iter::once(Ok(first)).chain(records))),
    }
}

/// GeoJSON text sequence records split on `separator`, parsed on demand.
struct GeoJsonRecords<R> {
    reader: R,
    separator: u8,
    pending: std::vec::IntoIter<Feature>,
    done: bool,
}

impl<R: BufRead> GeoJsonRecords<R> {
    fn new(reader: R, separator: u8) -> Self {
        Self {
            reader,
            separator,
            pending: Vec::new().into_iter(),
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Option<Vec<Feature>>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.reader.read_until(self.separator, &mut buf)? == 0 {
                return Ok(None);
            }
            let text = std::str::from_utf8(&buf)
                .map_err(|e| ZonalError::invalid_features(format!("record is not UTF-8: {e}")))?;
            let record = text.trim_matches(|c: char| c == RECORD_SEPARATOR || c.is_whitespace());
            if record.is_empty() {
                continue;
            }
            let document = record.parse::<GeoJson>()?;
            return features_from_geojson(document).map(Some);
        }
    }
}

impl<R: BufRead> Iterator for GeoJsonRecords<R> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(feature) = self.pending.next() {
                return Some(Ok(feature));
            }
            if self.done {
                return None;
            }
            match self.next_record() {
                Ok(Some(features)) => self.pending = features.into_iter(),
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn features_from_text(text: &str) -> Result<Vec<Feature>> {
    let trimmed = text.trim_matches(|c: char| c == RECORD_SEPARATOR || c.is_whitespace());
    if trimmed.is_empty() {
        return Err(ZonalError::invalid_features("empty input"));
    }

    if trimmed.starts_with('{') {
        let mut features = Vec::new();
        for document in parse_geojson_text(text)? {
            features.extend(features_from_geojson(document)?);
        }
        return Ok(features);
    }

    if let Ok(geometry) = Geometry::<f64>::try_from_wkt_str(trimmed) {
        return Ok(vec![Feature::from_geometry(geometry)]);
    }

    if let Ok(geometry) = read_hex_wkb(trimmed) {
        return Ok(vec![Feature::from_geometry(geometry)]);
    }

    Err(ZonalError::invalid_features(
        "input is not a file, GeoJSON, WKT or hex WKB",
    ))
}

/// Parse a GeoJSON document or a GeoJSON text sequence.
///
/// Sequences may be newline-delimited or framed with the ASCII record
/// separator (RFC 8142).
pub fn parse_geojson_text(text: &str) -> Result<Vec<GeoJson>> {
    let whole = text.trim_matches(|c: char| c == RECORD_SEPARATOR || c.is_whitespace());
    match whole.parse::<GeoJson>() {
        Ok(document) => Ok(vec![document]),
        Err(whole_err) => {
            let records: Vec<&str> = text
                .split(|c| c == RECORD_SEPARATOR || c == '\n')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .collect();
            if records.len() < 2 {
                return Err(whole_err.into());
            }
            records
                .into_iter()
                .map(|r| r.parse::<GeoJson>().map_err(ZonalError::from))
                .collect()
        }
    }
}

fn features_from_geojson(geojson: GeoJson) -> Result<Vec<Feature>> {
    match geojson {
        GeoJson::FeatureCollection(collection) => {
            if collection.features.is_empty() {
                return Err(ZonalError::invalid_features("empty FeatureCollection"));
            }
            collection.features.into_iter().map(Feature::from_geojson).collect()
        }
        GeoJson::Feature(feature) => Ok(vec![Feature::from_geojson(feature)?]),
        GeoJson::Geometry(geometry) => Ok(vec![Feature::from_geometry(Geometry::try_from(geometry)?)]),
    }
}
