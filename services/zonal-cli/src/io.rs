//! GeoJSON input and output for the command line.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use zonal_stats::parse_geojson_text;

const RECORD_SEPARATOR: &str = "\u{1e}";

/// Features read from the input plus the collection's foreign members.
#[derive(Debug, Default)]
pub struct InputFeatures {
    pub features: Vec<Feature>,
    pub foreign_members: Option<JsonObject>,
}

/// How results are written.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormat {
    pub indent: Option<usize>,
    /// One feature per line instead of a collection.
    pub sequence: bool,
    /// Prefix each sequence record with the ASCII record separator.
    pub rs: bool,
}

/// Read `path`, or stdin when it is `-`.
pub fn read_text(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("reading stdin")?;
        return Ok(text);
    }
    fs::read_to_string(Path::new(path)).with_context(|| format!("reading {path}"))
}

/// Parse a FeatureCollection, a Feature, a bare geometry or a GeoJSON text
/// sequence of those.
pub fn parse_features(text: &str) -> Result<InputFeatures> {
    let mut input = InputFeatures::default();
    for document in parse_geojson_text(text)? {
        match document {
            GeoJson::FeatureCollection(collection) => {
                if input.foreign_members.is_none() {
                    input.foreign_members = collection.foreign_members;
                }
                input.features.extend(collection.features);
            }
            GeoJson::Feature(feature) => input.features.push(feature),
            GeoJson::Geometry(geometry) => input.features.push(Feature::from(geometry)),
        }
    }
    if input.features.is_empty() {
        bail!("input contains no features");
    }
    Ok(input)
}

/// Serialize `value`, pretty-printed with `indent` spaces when given.
pub fn render<T: Serialize>(value: &T, indent: Option<usize>) -> Result<String> {
    match indent {
        None => Ok(serde_json::to_string(value)?),
        Some(n) => {
            let pad = " ".repeat(n);
            let mut buf = Vec::new();
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(pad.as_bytes()));
            value.serialize(&mut serializer)?;
            Ok(String::from_utf8(buf)?)
        }
    }
}

/// Write features as they arrive.
///
/// Sequences are written record by record, so only one feature is held at a
/// time. A collection has to be complete before it is serialized. Returns
/// the number of features written.
pub fn write_features<I>(
    out: &mut dyn Write,
    features: I,
    foreign_members: Option<JsonObject>,
    format: OutputFormat,
) -> Result<usize>
where
    I: IntoIterator<Item = Result<Feature>>,
{
    let written = if format.sequence {
        let mut written = 0;
        for feature in features {
            write_record(out, &feature?, format)?;
            written += 1;
        }
        written
    } else {
        let collection = FeatureCollection {
            bbox: None,
            features: features.into_iter().collect::<Result<Vec<_>>>()?,
            foreign_members,
        };
        writeln!(out, "{}", render(&collection, format.indent)?)?;
        collection.features.len()
    };
    out.flush()?;
    Ok(written)
}

/// Write one text-sequence record.
pub fn write_record(out: &mut dyn Write, feature: &Feature, format: OutputFormat) -> Result<()> {
    if format.rs {
        out.write_all(RECORD_SEPARATOR.as_bytes())?;
    }
    writeln!(out, "{}", render(feature, format.indent)?)?;
    Ok(())
}

/// Open `path` for writing, or stdout when it is `-`.
pub fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        return Ok(Box::new(io::BufWriter::new(io::stdout().lock())));
    }
    let file = fs::File::create(path).with_context(|| format!("creating {path}"))?;
    Ok(Box::new(io::BufWriter::new(file)))
}
