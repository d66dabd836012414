//! The `rasterstats` command line.
//!
//! `zonalstats` and `pointquery` read GeoJSON features, run the matching
//! pipeline with `geojson_out` enabled and write the annotated features back
//! out as a FeatureCollection or a GeoJSON text sequence.

pub mod cli;
pub mod io;

pub use cli::{run, Cli};
