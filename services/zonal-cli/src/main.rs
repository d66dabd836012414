//! rasterstats: zonal statistics and point queries from the command line.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use zonal_cli::{run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries GeoJSON, so logs go to stderr
    let default_level = if cli.info { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    run(cli)
}
