//! Command definitions and dispatch.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use grid_io::GridIoConfig;
use tracing::info;
use zonal_stats::{gen_point_query, gen_zonal_stats, PointOptions, StatSelection, VectorInput, ZonalOptions};

use crate::io::{open_output, parse_features, read_text, write_features, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "rasterstats")]
#[command(about = "Summarize raster values over vector features")]
#[command(version)]
pub struct Cli {
    /// Log progress at info level (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    pub info: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add zonal statistics of a raster to each input feature
    Zonalstats(ZonalArgs),
    /// Add raster values at the vertices of each input feature
    Pointquery(PointArgs),
}

/// Options shared by both commands.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Input GeoJSON (FeatureCollection, Feature or text sequence); `-` for stdin
    #[arg(default_value = "-")]
    pub input: String,

    /// Output file; `-` for stdout
    #[arg(default_value = "-")]
    pub output: String,

    /// Raster dataset
    #[arg(short, long)]
    pub raster: PathBuf,

    /// 1-based band
    #[arg(long, default_value_t = 1)]
    pub band: usize,

    /// Override the raster's no-data value
    #[arg(long)]
    pub nodata: Option<f64>,

    /// Pretty-print JSON with this many spaces
    #[arg(long)]
    pub indent: Option<usize>,

    /// Write one feature per line instead of a FeatureCollection
    #[arg(long)]
    pub sequence: bool,

    /// Prefix each sequence record with the ASCII record separator
    #[arg(long)]
    pub rs: bool,
}

impl CommonArgs {
    fn format(&self) -> OutputFormat {
        OutputFormat {
            indent: self.indent,
            sequence: self.sequence,
            rs: self.rs,
        }
    }
}

#[derive(Args, Debug)]
pub struct ZonalArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Include every cell touched by a geometry
    #[arg(long)]
    pub all_touched: bool,

    /// Count occurrences of each distinct cell value
    #[arg(long)]
    pub categorical: bool,

    /// Prefix for statistic properties
    #[arg(long, default_value = "_")]
    pub prefix: String,

    /// Space-delimited statistics, or `*`/`ALL` for every statistic
    #[arg(long)]
    pub stats: Option<String>,
}

#[derive(Args, Debug)]
pub struct PointArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// `bilinear` or `nearest`
    #[arg(long, default_value = "bilinear")]
    pub interpolate: String,

    /// Property that receives the sampled values
    #[arg(long, default_value = "value")]
    pub property_name: String,
}

/// Run a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let config = GridIoConfig::from_env();
    config.validate().map_err(|e| anyhow!("invalid configuration: {e}"))?;

    match cli.command {
        Command::Zonalstats(args) => zonalstats(args, config),
        Command::Pointquery(args) => pointquery(args, config),
    }
}

fn zonalstats(args: ZonalArgs, config: GridIoConfig) -> Result<()> {
    let input = parse_features(&read_text(&args.common.input)?)?;
    info!(features = input.features.len(), raster = %args.common.raster.display(), "Computing zonal stats");

    let mut options = ZonalOptions::new()
        .with_band(args.common.band)
        .with_all_touched(args.all_touched)
        .with_categorical(args.categorical)
        .with_prefix(args.prefix)
        .with_geojson_out(true)
        .with_config(config);
    if let Some(nodata) = args.common.nodata {
        options = options.with_nodata(nodata);
    }
    if let Some(stats) = &args.stats {
        options = options.with_stats(StatSelection::parse(stats));
    }

    let vectors = VectorInput::Features(input.features.into_iter().map(VectorInput::from).collect());
    let features = gen_zonal_stats(vectors, args.common.raster.clone(), options)?.map(|output| {
        output?
            .into_feature()
            .ok_or_else(|| anyhow!("expected a feature from a geojson_out pipeline"))
    });

    let mut out = open_output(&args.common.output)?;
    let written = write_features(&mut out, features, input.foreign_members, args.common.format())?;
    info!(features = written, output = %args.common.output, "Wrote results");
    Ok(())
}

fn pointquery(args: PointArgs, config: GridIoConfig) -> Result<()> {
    let input = parse_features(&read_text(&args.common.input)?)?;
    info!(features = input.features.len(), raster = %args.common.raster.display(), "Running point query");

    let mut options = PointOptions::new()
        .with_band(args.common.band)
        .with_interpolate(args.interpolate)
        .with_property_name(args.property_name)
        .with_geojson_out(true)
        .with_config(config);
    if let Some(nodata) = args.common.nodata {
        options = options.with_nodata(nodata);
    }

    let vectors = VectorInput::Features(input.features.into_iter().map(VectorInput::from).collect());
    let features = gen_point_query(vectors, args.common.raster.clone(), options)?.map(|output| {
        output?
            .into_feature()
            .ok_or_else(|| anyhow!("expected a feature from a geojson_out pipeline"))
    });

    let mut out = open_output(&args.common.output)?;
    let written = write_features(&mut out, features, input.foreign_members, args.common.format())?;
    info!(features = written, output = %args.common.output, "Wrote results");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_zonalstats_defaults() {
        let cli = Cli::parse_from(["rasterstats", "zonalstats", "-r", "dem.tif"]);
        let Command::Zonalstats(args) = cli.command else {
            panic!("expected zonalstats");
        };
        assert_eq!(args.common.input, "-");
        assert_eq!(args.common.output, "-");
        assert_eq!(args.common.band, 1);
        assert_eq!(args.prefix, "_");
        assert!(args.stats.is_none());
    }

    #[test]
    fn test_pointquery_options() {
        let cli = Cli::parse_from([
            "rasterstats",
            "--info",
            "pointquery",
            "in.geojson",
            "-r",
            "dem.tif",
            "--interpolate",
            "nearest",
            "--property-name",
            "elev",
            "--sequence",
            "--rs",
        ]);
        assert!(cli.info);
        let Command::Pointquery(args) = cli.command else {
            panic!("expected pointquery");
        };
        assert_eq!(args.common.input, "in.geojson");
        assert_eq!(args.interpolate, "nearest");
        assert_eq!(args.property_name, "elev");
        assert!(args.common.sequence && args.common.rs);
    }
}
