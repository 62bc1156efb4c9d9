use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use crate::transform::DEFAULT_KG_PER_CAPITA_DAY;

/// Waste estimation CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "wasteshed", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate generated and uncollected waste per jurisdiction
    Estimate(EstimateArgs),
}

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Gridded population raster (single-band GeoTIFF)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub raster: PathBuf,

    /// Administrative boundary shapefile (tier-2 jurisdictions)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub admin: PathBuf,

    /// Service-area shapefile with reported collection volumes
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub service: PathBuf,

    /// Tier-1 region to keep from the admin layer (e.g. a state name)
    #[arg(long)]
    pub state: String,

    /// Admin field holding the tier-1 region name
    #[arg(long, default_value = "ADM1_EN")]
    pub region_field: String,

    /// Admin field holding the tier-2 jurisdiction name
    #[arg(long, default_value = "ADM2_EN")]
    pub name_field: String,

    /// Service field holding the provider name
    #[arg(long, default_value = "PROVIDER")]
    pub provider_field: String,

    /// Service field holding reported collected volume (tonnes/week)
    #[arg(long, default_value = "COLLECTED")]
    pub collected_field: String,

    /// EPSG code the shapefile coordinates are in
    #[arg(long, default_value_t = 4326)]
    pub vector_epsg: u32,

    /// Modeled waste generation, kg per person per day
    #[arg(long, default_value_t = DEFAULT_KG_PER_CAPITA_DAY)]
    pub per_capita: f64,

    /// Directory the choropleth maps are written into
    #[arg(long, default_value = "maps", value_hint = ValueHint::DirPath)]
    pub out_dir: PathBuf,
}
